//! IMU fusion - a sensor-fusion engine for inertial measurement units
//!
//! Reads raw accelerometer, gyroscope and magnetometer samples (plus optional
//! pressure and humidity readings) from a [`SensorSource`], corrects them with
//! a [`CalibrationProfile`], fuses them into an orientation estimate with a
//! SLERP complementary filter and publishes each result as a [`Measurement`]
//! to a snapshot any thread can read without waiting on the filter.
//!
//! # Features
//!
//! - Per-axis bias, scale and misalignment correction loaded from TOML
//! - SLERP complementary filter with a tunable gain
//! - Degraded operation with individual inputs disabled at runtime
//! - Optional runtime gyroscope bias learning
//! - On-demand or continuous cycles on a background worker
//! - JSON wire format for measurements
//! - Simulated and replayed sources for testing without hardware
//!
//! # Quick Start
//!
//! ```rust
//! use nalgebra::Vector3;
//! use imu_fusion::{CalibrationProfile, Imu, SimulatedSource, SimulationSettings};
//!
//! let source = SimulatedSource::new(SimulationSettings {
//!     angular_rate: Vector3::new(0.0, 0.0, 0.2), // rad/s
//!     ..Default::default()
//! });
//! let mut imu = Imu::new(source, CalibrationProfile::default()).unwrap();
//!
//! for _ in 0..10 {
//!     imu.read_once().unwrap();
//! }
//!
//! let measurement = imu.latest().unwrap();
//! let json = imu_fusion::wire::to_json(&measurement).unwrap();
//! assert!(json.contains("fusionPose"));
//! ```

pub mod calibration;
pub mod compass;
mod error;
pub mod fusion;
mod imu;
mod math;
mod offset;
pub mod replay;
pub mod scheduler;
pub mod simulated;
pub mod snapshot;
pub mod source;
mod types;
pub mod wire;

pub use calibration::{CalibrationProfile, CalibrationStore, ProfileWatch};
pub use error::{ConfigError, ImuError};
pub use fusion::{Fusion, FusionOutput, FusionState, step};
pub use imu::{ContinuousHandle, CycleEvent, Imu};
pub use math::{DEG_TO_RAD, QuaternionExt, RAD_TO_DEG, Vector3Ext};
pub use offset::GyroBiasEstimator;
pub use replay::ReplaySource;
pub use scheduler::{CycleState, CycleStats, SchedulerSettings};
pub use simulated::{SimulatedSource, SimulationSettings};
pub use snapshot::{SnapshotReader, SnapshotStore};
pub use source::{SensorInventory, SensorSource, SourceError};
pub use types::*;
