//! Error types for the fusion engine

use std::path::PathBuf;
use std::time::Duration;

/// Errors raised while loading or changing a calibration profile.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read calibration profile {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed calibration profile: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{field} must be finite")]
    NonFinite { field: &'static str },

    #[error("{field} out of range: {value} (expected {expected})")]
    OutOfRange {
        field: &'static str,
        value: f32,
        expected: &'static str,
    },
}

/// Errors surfaced by the read/fuse/publish cycle and the wire codec.
#[derive(Debug, thiserror::Error)]
pub enum ImuError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sensor unavailable: {0}")]
    SensorUnavailable(String),

    #[error("Read timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed sample: {0}")]
    MalformedSample(String),

    #[error("No measurement has been published yet")]
    NoDataYet,

    #[error("Worker thread panicked")]
    WorkerPanicked,

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Wire format error: {0}")]
    Wire(#[from] serde_json::Error),

    #[error("Invalid wire value for {field}: {reason}")]
    InvalidWire {
        field: &'static str,
        reason: &'static str,
    },
}

impl ImuError {
    /// True for failures confined to a single cycle.
    ///
    /// Continuous mode keeps running after these.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ImuError::SensorUnavailable(_) | ImuError::Timeout(_) | ImuError::MalformedSample(_)
        )
    }
}
