//! Replay of recorded samples
//!
//! Recordings are CSV files with one sample per row:
//!
//! ```text
//! timestamp_us,accel_x,accel_y,accel_z,gyro_x,gyro_y,gyro_z,compass_x,compass_y,compass_z,pressure,humidity
//! 0,0.0,0.0,9.81,0.0,0.0,0.0,0.4,0.0,0.3,1013.2,
//! 10000,0.0,0.0,9.81,0.0,0.0,0.01,0.4,0.0,0.3,1013.2,
//! ```
//!
//! The environmental columns are optional and may be left empty. Validity
//! columns (`pressure_valid`, `pressure_temperature`,
//! `pressure_temperature_valid` and the `humidity_` equivalents) may also be
//! given; a reading without them is marked valid with no temperature.

use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::time::Duration;

use nalgebra::Vector3;
use serde::Deserialize;

use crate::source::{DEFAULT_POLL_INTERVAL, SensorInventory, SensorSource, SourceError};
use crate::types::{HumidityReading, PressureReading, RawSample};

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp_us: u64,
    accel_x: f32,
    accel_y: f32,
    accel_z: f32,
    gyro_x: f32,
    gyro_y: f32,
    gyro_z: f32,
    compass_x: f32,
    compass_y: f32,
    compass_z: f32,
    pressure: Option<f32>,
    pressure_valid: Option<bool>,
    pressure_temperature: Option<f32>,
    pressure_temperature_valid: Option<bool>,
    humidity: Option<f32>,
    humidity_valid: Option<bool>,
    humidity_temperature: Option<f32>,
    humidity_temperature_valid: Option<bool>,
}

impl CsvRow {
    fn into_sample(self) -> RawSample {
        let mut sample = RawSample::new(
            self.timestamp_us,
            Vector3::new(self.accel_x, self.accel_y, self.accel_z),
            Vector3::new(self.gyro_x, self.gyro_y, self.gyro_z),
            Vector3::new(self.compass_x, self.compass_y, self.compass_z),
        );

        if let Some(pressure) = self.pressure {
            sample = sample.with_pressure(PressureReading {
                pressure,
                pressure_valid: self.pressure_valid.unwrap_or(true),
                temperature: self.pressure_temperature.unwrap_or_default(),
                temperature_valid: self
                    .pressure_temperature_valid
                    .unwrap_or(self.pressure_temperature.is_some()),
            });
        }
        if let Some(humidity) = self.humidity {
            sample = sample.with_humidity(HumidityReading {
                humidity,
                humidity_valid: self.humidity_valid.unwrap_or(true),
                temperature: self.humidity_temperature.unwrap_or_default(),
                temperature_valid: self
                    .humidity_temperature_valid
                    .unwrap_or(self.humidity_temperature.is_some()),
            });
        }
        sample
    }
}

/// Source that plays back a fixed sequence of samples
///
/// Each `read` returns the next entry immediately. Once the sequence is
/// used up every read fails with [`SourceError::Exhausted`].
#[derive(Debug, Clone)]
pub struct ReplaySource {
    entries: VecDeque<Result<RawSample, SourceError>>,
    inventory: SensorInventory,
    poll_interval: Duration,
}

impl ReplaySource {
    /// Replay samples held in memory
    pub fn from_samples(samples: impl IntoIterator<Item = RawSample>) -> Self {
        Self::from_results(samples.into_iter().map(Ok))
    }

    /// Replay a scripted mix of samples and read failures
    pub fn from_results(entries: impl IntoIterator<Item = Result<RawSample, SourceError>>) -> Self {
        let entries: VecDeque<_> = entries.into_iter().collect();
        let samples = || entries.iter().filter_map(|entry| entry.as_ref().ok());

        let mut inventory = SensorInventory::imu_only("replay");
        if samples().any(|sample| sample.pressure.is_some()) {
            inventory = inventory.with_pressure("replay-pressure");
        }
        if samples().any(|sample| sample.humidity.is_some()) {
            inventory = inventory.with_humidity("replay-humidity");
        }

        Self {
            entries,
            inventory,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Replay a CSV recording
    ///
    /// Rows that fail to parse are kept in place and replayed as
    /// [`SourceError::Malformed`].
    pub fn from_csv_reader<R: io::Read>(reader: R) -> Result<Self, SourceError> {
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut entries = Vec::new();

        for (row, result) in reader.deserialize::<CsvRow>().enumerate() {
            match result {
                Ok(record) => entries.push(Ok(record.into_sample())),
                Err(err) if err.is_io_error() => {
                    return Err(SourceError::NotDetected(format!("recording unreadable: {err}")));
                }
                Err(err) => {
                    tracing::warn!(row, %err, "Malformed row in recording");
                    entries.push(Err(SourceError::Malformed(format!("row {row}: {err}"))));
                }
            }
        }

        Ok(Self::from_results(entries))
    }

    /// Replay a CSV recording from disk
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|err| SourceError::NotDetected(format!("{}: {err}", path.display())))?;
        tracing::info!(path = %path.display(), "Replaying recording");
        Self::from_csv_reader(io::BufReader::new(file))
    }

    /// Override the delay reported to the scheduler after a failed read
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Entries not yet replayed
    pub fn remaining(&self) -> usize {
        self.entries.len()
    }
}

impl SensorSource for ReplaySource {
    fn init(&mut self) -> Result<SensorInventory, SourceError> {
        Ok(self.inventory.clone())
    }

    fn read(&mut self, _timeout: Duration) -> Result<RawSample, SourceError> {
        self.entries.pop_front().unwrap_or(Err(SourceError::Exhausted))
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}
