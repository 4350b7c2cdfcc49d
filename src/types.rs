//! Core value types shared by the sources, the filter and the snapshot store

use nalgebra::{UnitQuaternion, Vector3};

use crate::math::{QuaternionExt, Vector3Ext};

/// Barometric pressure reading
///
/// Produced by an optional pressure sensor alongside an IMU sample. The
/// validity flags mirror what the sensor reported for that sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PressureReading {
    /// Pressure in millibar
    pub pressure: f32,
    /// Whether `pressure` holds a fresh value
    pub pressure_valid: bool,
    /// Die temperature of the pressure sensor in °C
    pub temperature: f32,
    /// Whether `temperature` holds a fresh value
    pub temperature_valid: bool,
}

impl PressureReading {
    /// Copy with any non-finite value zeroed and marked invalid
    pub fn sanitized(self) -> Self {
        let (pressure, pressure_valid) = sanitize(self.pressure, self.pressure_valid);
        let (temperature, temperature_valid) = sanitize(self.temperature, self.temperature_valid);
        Self {
            pressure,
            pressure_valid,
            temperature,
            temperature_valid,
        }
    }
}

/// Relative humidity reading
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HumidityReading {
    /// Relative humidity in %RH
    pub humidity: f32,
    /// Whether `humidity` holds a fresh value
    pub humidity_valid: bool,
    /// Die temperature of the humidity sensor in °C
    pub temperature: f32,
    /// Whether `temperature` holds a fresh value
    pub temperature_valid: bool,
}

impl HumidityReading {
    /// Copy with any non-finite value zeroed and marked invalid
    pub fn sanitized(self) -> Self {
        let (humidity, humidity_valid) = sanitize(self.humidity, self.humidity_valid);
        let (temperature, temperature_valid) = sanitize(self.temperature, self.temperature_valid);
        Self {
            humidity,
            humidity_valid,
            temperature,
            temperature_valid,
        }
    }
}

fn sanitize(value: f32, valid: bool) -> (f32, bool) {
    if value.is_finite() {
        (value, valid)
    } else {
        (0.0, false)
    }
}

/// Timestamped sample from a raw sensor source
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use imu_fusion::RawSample;
///
/// let sample = RawSample::new(
///     1_000,
///     Vector3::new(0.0, 0.0, 9.81),
///     Vector3::zeros(),
///     Vector3::new(1.0, 0.0, 0.0),
/// );
/// assert!(sample.pressure.is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    /// Monotonic timestamp in microseconds
    pub timestamp: u64,
    /// Acceleration in m/s²
    pub accel: Vector3<f32>,
    /// Angular rate in rad/s
    pub gyro: Vector3<f32>,
    /// Magnetic field in gauss
    pub compass: Vector3<f32>,
    /// Present only when a pressure sensor is fitted
    pub pressure: Option<PressureReading>,
    /// Present only when a humidity sensor is fitted
    pub humidity: Option<HumidityReading>,
}

impl RawSample {
    /// Create an IMU-only sample
    pub fn new(
        timestamp: u64,
        accel: Vector3<f32>,
        gyro: Vector3<f32>,
        compass: Vector3<f32>,
    ) -> Self {
        Self {
            timestamp,
            accel,
            gyro,
            compass,
            pressure: None,
            humidity: None,
        }
    }

    /// Attach a pressure reading
    pub fn with_pressure(mut self, pressure: PressureReading) -> Self {
        self.pressure = Some(pressure);
        self
    }

    /// Attach a humidity reading
    pub fn with_humidity(mut self, humidity: HumidityReading) -> Self {
        self.humidity = Some(humidity);
        self
    }

    /// Name of the first non-finite inertial field, if any
    pub fn first_non_finite(&self) -> Option<&'static str> {
        [
            ("accel", self.accel),
            ("gyro", self.gyro),
            ("compass", self.compass),
        ]
        .into_iter()
        .find(|(_, v)| !v.all_finite())
        .map(|(name, _)| name)
    }

    /// Zero and invalidate non-finite pressure and humidity values
    pub fn sanitize_environment(&mut self) {
        self.pressure = self.pressure.map(PressureReading::sanitized);
        self.humidity = self.humidity.map(HumidityReading::sanitized);
    }
}

/// Which inputs take part in fusion
///
/// Positional order everywhere in this crate is gyro, accel, compass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SensorEnables {
    pub gyro: bool,
    pub accel: bool,
    pub compass: bool,
}

impl SensorEnables {
    pub const ALL: SensorEnables = SensorEnables {
        gyro: true,
        accel: true,
        compass: true,
    };

    pub fn new(gyro: bool, accel: bool, compass: bool) -> Self {
        Self {
            gyro,
            accel,
            compass,
        }
    }

    /// True when every input is enabled
    pub fn all(&self) -> bool {
        self.gyro && self.accel && self.compass
    }
}

impl Default for SensorEnables {
    fn default() -> Self {
        Self::ALL
    }
}

/// Quality of the estimate produced by a fusion step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FusionStatus {
    /// All inputs enabled
    #[default]
    Nominal,
    /// One or more inputs disabled
    ///
    /// `holding` is set when both gyro and accelerometer are disabled: no
    /// correction is possible and the last orientation is held unchanged.
    Degraded { holding: bool },
}

impl FusionStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, FusionStatus::Degraded { .. })
    }

    pub fn is_holding(&self) -> bool {
        matches!(self, FusionStatus::Degraded { holding: true })
    }
}

/// One fused measurement, produced once per fusion cycle
///
/// This is the value consumers read from the snapshot store and the value
/// the wire codec serialises.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Timestamp of the underlying sample in microseconds
    pub timestamp: u64,
    /// Corrected acceleration in m/s²
    pub accel: Vector3<f32>,
    /// Corrected angular rate in rad/s
    pub gyro: Vector3<f32>,
    /// Corrected magnetic field in gauss
    pub compass: Vector3<f32>,
    /// Fused orientation as Euler angles (roll, pitch, yaw) in radians
    pub fusion_pose: Vector3<f32>,
    /// Yaw about gravity from accelerometer and compass alone, in radians
    pub tilt_heading: f32,
    pub pressure: Option<PressureReading>,
    pub humidity: Option<HumidityReading>,
}

impl Measurement {
    /// Fused orientation as a unit quaternion
    pub fn orientation(&self) -> UnitQuaternion<f32> {
        UnitQuaternion::from_euler_vector(&self.fusion_pose)
    }
}

/// Runtime gyroscope bias learning settings
///
/// When enabled, the gyroscope bias is re-estimated while the device is
/// stationary, compensating for temperature drift not captured by the
/// static calibration.
///
/// # Example
/// ```
/// use imu_fusion::GyroBiasSettings;
///
/// let settings = GyroBiasSettings {
///     enabled: true,
///     timeout: 10.0, // 10 seconds stationary before learning starts
///     ..Default::default()
/// };
/// assert!(settings.threshold > 0.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GyroBiasSettings {
    /// Whether bias learning runs at all
    pub enabled: bool,
    /// Per-axis rate in rad/s below which the device counts as stationary
    pub threshold: f32,
    /// Seconds the device must stay stationary before learning begins
    pub timeout: f32,
    /// Low-pass cutoff of the bias estimate in Hz
    pub cutoff_frequency: f32,
}

impl Default for GyroBiasSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 0.05,
            timeout: 5.0,
            cutoff_frequency: 0.02,
        }
    }
}
