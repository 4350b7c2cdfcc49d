//! Raw sensor source abstraction
//!
//! Hardware drivers, simulators and recordings all sit behind
//! [`SensorSource`]. The engine only ever sees [`RawSample`]s.

use std::time::Duration;

use crate::types::RawSample;

/// Default delay between attempts after a failed read
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Errors reported by a sensor source
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    #[error("Sensor not detected: {0}")]
    NotDetected(String),

    #[error("No sample within {0:?}")]
    Timeout(Duration),

    #[error("Malformed sample: {0}")]
    Malformed(String),

    #[error("Source exhausted")]
    Exhausted,
}

/// Sensors found when a source was initialised
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SensorInventory {
    /// Name of the primary IMU
    pub imu: String,
    /// Name of the pressure sensor, if one was found
    pub pressure: Option<String>,
    /// Name of the humidity sensor, if one was found
    pub humidity: Option<String>,
}

impl SensorInventory {
    pub fn imu_only(imu: impl Into<String>) -> Self {
        Self {
            imu: imu.into(),
            pressure: None,
            humidity: None,
        }
    }

    pub fn with_pressure(mut self, name: impl Into<String>) -> Self {
        self.pressure = Some(name.into());
        self
    }

    pub fn with_humidity(mut self, name: impl Into<String>) -> Self {
        self.humidity = Some(name.into());
        self
    }

    /// Drop readings from sensors not listed in the inventory
    pub fn restrict(&self, mut sample: RawSample) -> RawSample {
        if self.pressure.is_none() {
            sample.pressure = None;
        }
        if self.humidity.is_none() {
            sample.humidity = None;
        }
        sample
    }
}

/// Producer of timestamped raw samples
///
/// `read` may block on hardware I/O but must give up after `timeout`.
pub trait SensorSource {
    /// Detect and initialise the sensors
    ///
    /// An error means the primary IMU is missing. Missing optional sensors
    /// are reported through the inventory instead.
    fn init(&mut self) -> Result<SensorInventory, SourceError>;

    /// Read the next sample
    fn read(&mut self, timeout: Duration) -> Result<RawSample, SourceError>;

    /// How long to wait before trying again after a failed read
    fn poll_interval(&self) -> Duration {
        DEFAULT_POLL_INTERVAL
    }
}

impl<S: SensorSource + ?Sized> SensorSource for Box<S> {
    fn init(&mut self) -> Result<SensorInventory, SourceError> {
        (**self).init()
    }

    fn read(&mut self, timeout: Duration) -> Result<RawSample, SourceError> {
        (**self).read(timeout)
    }

    fn poll_interval(&self) -> Duration {
        (**self).poll_interval()
    }
}
