//! Sensor calibration: correction functions, the calibration profile and the
//! store that hands profile changes to the fusion worker
//!
//! A profile is loaded once at startup, either from defaults or from a TOML
//! document. Every field is optional in the document:
//!
//! ```toml
//! slerp_power = 0.02
//! compass_declination = 0.0
//!
//! [enables]
//! gyro = true
//! accel = true
//! compass = true
//!
//! [gyro]
//! bias = [0.01, -0.02, 0.0]
//!
//! [compass]
//! hard_iron = [0.1, 0.0, -0.05]
//! soft_iron = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
//! ```

use std::path::Path;
use std::sync::Arc;

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::types::{GyroBiasSettings, RawSample, SensorEnables};

/// Default fusion gain
pub const DEFAULT_SLERP_POWER: f32 = 0.02;

const IDENTITY: [[f32; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// Applies inertial sensor calibration (gyroscope and accelerometer)
///
/// Order: `misalignment * ((uncalibrated - offset) * sensitivity)`
///
/// # Example
/// ```
/// use nalgebra::{Matrix3, Vector3};
/// use imu_fusion::calibration::calibrate_inertial;
///
/// let raw = Vector3::new(1.0, 2.0, 3.0);
/// let misalignment = Matrix3::identity();
/// let sensitivity = Vector3::new(1.0, 1.0, 1.0);
/// let offset = Vector3::new(0.1, 0.2, 0.3);
///
/// let calibrated = calibrate_inertial(raw, misalignment, sensitivity, offset);
/// assert!((calibrated - Vector3::new(0.9, 1.8, 2.7)).magnitude() < 1e-6);
/// ```
pub fn calibrate_inertial(
    uncalibrated: Vector3<f32>,
    misalignment: Matrix3<f32>,
    sensitivity: Vector3<f32>,
    offset: Vector3<f32>,
) -> Vector3<f32> {
    misalignment * (uncalibrated - offset).component_mul(&sensitivity)
}

/// Applies magnetometer calibration (hard and soft iron correction)
///
/// # Example
/// ```
/// use nalgebra::{Matrix3, Vector3};
/// use imu_fusion::calibration::calibrate_magnetic;
///
/// let raw = Vector3::new(0.5, 0.25, 0.75);
/// let hard_iron = Vector3::new(0.25, 0.25, 0.25);
///
/// let calibrated = calibrate_magnetic(raw, Matrix3::identity(), hard_iron);
/// assert!((calibrated - Vector3::new(0.25, 0.0, 0.5)).magnitude() < 1e-6);
/// ```
pub fn calibrate_magnetic(
    uncalibrated: Vector3<f32>,
    soft_iron_matrix: Matrix3<f32>,
    hard_iron_offset: Vector3<f32>,
) -> Vector3<f32> {
    soft_iron_matrix * (uncalibrated - hard_iron_offset)
}

/// Bias, scale and misalignment correction for an accelerometer or gyroscope
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InertialCalibration {
    /// Offset subtracted from every reading, in sensor units
    pub bias: [f32; 3],
    /// Per-axis sensitivity applied after bias removal
    pub scale: [f32; 3],
    /// Row-major axis misalignment matrix
    pub misalignment: [[f32; 3]; 3],
}

impl Default for InertialCalibration {
    fn default() -> Self {
        Self {
            bias: [0.0; 3],
            scale: [1.0; 3],
            misalignment: IDENTITY,
        }
    }
}

impl InertialCalibration {
    pub fn apply(&self, raw: Vector3<f32>) -> Vector3<f32> {
        calibrate_inertial(
            raw,
            matrix(&self.misalignment),
            Vector3::from(self.scale),
            Vector3::from(self.bias),
        )
    }

    fn validate(&self, fields: InertialFields) -> Result<(), ConfigError> {
        check_vector(fields.bias, &self.bias)?;
        check_scale(fields.scale, &self.scale)?;
        check_matrix(fields.misalignment, &self.misalignment)
    }
}

/// Hard and soft iron correction for the magnetometer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompassCalibration {
    /// Hard iron offset in gauss
    pub hard_iron: [f32; 3],
    /// Per-axis scale applied after hard iron removal
    pub scale: [f32; 3],
    /// Row-major soft iron matrix
    pub soft_iron: [[f32; 3]; 3],
}

impl Default for CompassCalibration {
    fn default() -> Self {
        Self {
            hard_iron: [0.0; 3],
            scale: [1.0; 3],
            soft_iron: IDENTITY,
        }
    }
}

impl CompassCalibration {
    pub fn apply(&self, raw: Vector3<f32>) -> Vector3<f32> {
        let scale = Matrix3::from_diagonal(&Vector3::from(self.scale));
        let soft_iron = matrix(&self.soft_iron) * scale;
        calibrate_magnetic(raw, soft_iron, Vector3::from(self.hard_iron))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check_vector("compass.hard_iron", &self.hard_iron)?;
        check_scale("compass.scale", &self.scale)?;
        check_matrix("compass.soft_iron", &self.soft_iron)
    }
}

/// Complete calibration and fusion configuration
///
/// Read-only once loaded. Changes go through [`CalibrationStore`] and reach
/// the filter at the next cycle boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationProfile {
    /// Fusion gain in [0, 1]
    ///
    /// 0 ignores the accelerometer/compass reference entirely (pure gyro
    /// integration), 1 snaps to the reference every step.
    pub slerp_power: f32,
    /// Magnetic declination in radians, subtracted from the compass yaw
    pub compass_declination: f32,
    pub enables: SensorEnables,
    pub accel: InertialCalibration,
    pub gyro: InertialCalibration,
    pub compass: CompassCalibration,
    pub gyro_bias_learning: GyroBiasSettings,
}

impl Default for CalibrationProfile {
    fn default() -> Self {
        Self {
            slerp_power: DEFAULT_SLERP_POWER,
            compass_declination: 0.0,
            enables: SensorEnables::default(),
            accel: InertialCalibration::default(),
            gyro: InertialCalibration::default(),
            compass: CompassCalibration::default(),
            gyro_bias_learning: GyroBiasSettings::default(),
        }
    }
}

impl CalibrationProfile {
    /// Load a profile from `path`, or the defaults when `path` is `None`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            info!("No calibration profile given, using defaults");
            return Ok(Self::default());
        };

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let profile = Self::from_toml_str(&contents)?;
        info!(?path, slerp_power = profile.slerp_power, "Loaded calibration profile");
        Ok(profile)
    }

    /// Parse and validate a profile from a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let profile: CalibrationProfile = toml::from_str(contents)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Check every field against its allowed range
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slerp_power(self.slerp_power)?;
        check_finite("compass_declination", self.compass_declination)?;
        self.accel.validate(InertialFields::ACCEL)?;
        self.gyro.validate(InertialFields::GYRO)?;
        self.compass.validate()?;

        let learning = &self.gyro_bias_learning;
        check_positive("gyro_bias_learning.threshold", learning.threshold)?;
        check_positive("gyro_bias_learning.cutoff_frequency", learning.cutoff_frequency)?;
        check_finite("gyro_bias_learning.timeout", learning.timeout)?;
        if learning.timeout < 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "gyro_bias_learning.timeout",
                value: learning.timeout,
                expected: ">= 0",
            });
        }
        Ok(())
    }

    /// Apply the static calibration to a raw sample
    ///
    /// Pressure and humidity readings pass through untouched.
    pub fn correct(&self, raw: &RawSample) -> RawSample {
        RawSample {
            accel: self.accel.apply(raw.accel),
            gyro: self.gyro.apply(raw.gyro),
            compass: self.compass.apply(raw.compass),
            ..*raw
        }
    }
}

/// Validate a fusion gain
pub fn validate_slerp_power(slerp_power: f32) -> Result<(), ConfigError> {
    check_finite("slerp_power", slerp_power)?;
    if !(0.0..=1.0).contains(&slerp_power) {
        return Err(ConfigError::OutOfRange {
            field: "slerp_power",
            value: slerp_power,
            expected: "[0, 1]",
        });
    }
    Ok(())
}

/// Writer side of the calibration profile
///
/// Cheap to clone; every clone updates the same profile. Updates are staged
/// and picked up by the worker through [`ProfileWatch`] between cycles, never
/// during one.
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    sender: Arc<watch::Sender<CalibrationProfile>>,
}

impl CalibrationStore {
    pub fn new(profile: CalibrationProfile) -> Self {
        let (sender, _) = watch::channel(profile);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Most recently staged profile
    pub fn profile(&self) -> CalibrationProfile {
        *self.sender.borrow()
    }

    /// Enable or disable fusion inputs
    ///
    /// Arguments map positionally to the same-named sensor.
    pub fn reconfigure(&self, enable_gyro: bool, enable_accel: bool, enable_compass: bool) {
        let enables = SensorEnables::new(enable_gyro, enable_accel, enable_compass);
        self.sender.send_modify(|profile| profile.enables = enables);
        info!(
            gyro = enable_gyro,
            accel = enable_accel,
            compass = enable_compass,
            "Sensor enables staged"
        );
    }

    /// Change the fusion gain
    pub fn set_slerp_power(&self, slerp_power: f32) -> Result<(), ConfigError> {
        validate_slerp_power(slerp_power)?;
        self.sender
            .send_modify(|profile| profile.slerp_power = slerp_power);
        debug!(slerp_power, "Fusion gain staged");
        Ok(())
    }

    /// Replace the whole profile
    pub fn replace(&self, profile: CalibrationProfile) -> Result<(), ConfigError> {
        profile.validate()?;
        self.sender.send_replace(profile);
        debug!("Calibration profile replaced");
        Ok(())
    }

    /// Subscribe a worker to profile changes
    pub fn watch(&self) -> ProfileWatch {
        ProfileWatch {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Reader side of the calibration profile, owned by the fusion worker
#[derive(Debug)]
pub struct ProfileWatch {
    receiver: watch::Receiver<CalibrationProfile>,
}

impl ProfileWatch {
    /// Profile staged since the last call, if any
    pub fn at_cycle_boundary(&mut self) -> Option<CalibrationProfile> {
        match self.receiver.has_changed() {
            Ok(true) => Some(*self.receiver.borrow_and_update()),
            _ => None,
        }
    }

    /// Currently staged profile, marking it as seen
    pub fn current(&mut self) -> CalibrationProfile {
        *self.receiver.borrow_and_update()
    }
}

/// Profile paths reported for an inertial sensor's calibration fields
#[derive(Debug, Clone, Copy)]
struct InertialFields {
    bias: &'static str,
    scale: &'static str,
    misalignment: &'static str,
}

impl InertialFields {
    const ACCEL: Self = Self {
        bias: "accel.bias",
        scale: "accel.scale",
        misalignment: "accel.misalignment",
    };

    const GYRO: Self = Self {
        bias: "gyro.bias",
        scale: "gyro.scale",
        misalignment: "gyro.misalignment",
    };
}

fn matrix(rows: &[[f32; 3]; 3]) -> Matrix3<f32> {
    Matrix3::new(
        rows[0][0], rows[0][1], rows[0][2], //
        rows[1][0], rows[1][1], rows[1][2], //
        rows[2][0], rows[2][1], rows[2][2],
    )
}

fn check_finite(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonFinite { field })
    }
}

fn check_positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    check_finite(field, value)?;
    if value <= 0.0 {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            expected: "> 0",
        });
    }
    Ok(())
}

fn check_vector(field: &'static str, values: &[f32; 3]) -> Result<(), ConfigError> {
    values.iter().try_for_each(|&value| check_finite(field, value))
}

fn check_scale(field: &'static str, values: &[f32; 3]) -> Result<(), ConfigError> {
    check_vector(field, values)?;
    match values.iter().find(|value| **value == 0.0) {
        Some(&value) => Err(ConfigError::OutOfRange {
            field,
            value,
            expected: "non-zero",
        }),
        None => Ok(()),
    }
}

fn check_matrix(field: &'static str, rows: &[[f32; 3]; 3]) -> Result<(), ConfigError> {
    rows.iter().try_for_each(|row| check_vector(field, row))
}
