//! SLERP complementary filter
//!
//! Gyro integration provides the high-frequency orientation update; the
//! accelerometer/compass reference pulls the estimate back towards the true
//! attitude by spherical linear interpolation, weighted by the profile's
//! `slerp_power`.

use nalgebra::{UnitQuaternion, Vector3};

use crate::calibration::CalibrationProfile;
use crate::compass::{accel_to_euler, compass_yaw, tilt_heading};
use crate::math::{MICROS_PER_SECOND, QuaternionExt};
use crate::types::{FusionStatus, RawSample, SensorEnables};

/// Filter state carried from one fusion cycle to the next
///
/// Opaque to consumers: the pose is read from [`FusionOutput`] instead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionState {
    /// Current orientation estimate
    orientation: UnitQuaternion<f32>,
    /// Timestamp of the last fused sample, `None` before the first one
    last_timestamp: Option<u64>,
    /// Number of samples fused so far
    sample_count: u64,
}

impl FusionState {
    pub fn new() -> Self {
        Self {
            orientation: UnitQuaternion::identity(),
            last_timestamp: None,
            sample_count: 0,
        }
    }

    /// True once the first sample has seeded the orientation
    pub fn is_initialised(&self) -> bool {
        self.last_timestamp.is_some()
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }
}

impl Default for FusionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one fusion step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionOutput {
    /// State to feed into the next step
    pub state: FusionState,
    /// Fused orientation
    pub orientation: UnitQuaternion<f32>,
    /// Fused orientation as (roll, pitch, yaw) in radians
    pub pose: Vector3<f32>,
    /// Yaw about gravity from the sample's accelerometer and compass alone
    pub tilt_heading: f32,
    pub status: FusionStatus,
}

/// Advance the filter by one corrected sample
///
/// Pure function: identical inputs always give identical outputs.
///
/// - The first sample seeds the orientation from the reference.
/// - A disabled gyroscope contributes no rotation.
/// - Roll and pitch of the reference come from the accelerometer when it is
///   enabled, otherwise from the current estimate. Yaw comes from the compass
///   when it is enabled and non-zero, otherwise from the current estimate.
/// - With gyro and accelerometer both disabled the orientation is held and
///   the status reports [`FusionStatus::Degraded`] with `holding` set.
/// - A non-increasing timestamp skips integration but still corrects.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use imu_fusion::{CalibrationProfile, FusionState, RawSample, fusion::step};
///
/// let sample = RawSample::new(
///     0,
///     Vector3::new(0.0, 0.0, 9.81),
///     Vector3::zeros(),
///     Vector3::new(1.0, 0.0, 0.0),
/// );
/// let output = step(&sample, &FusionState::new(), &CalibrationProfile::default());
///
/// assert!(output.pose.magnitude() < 1e-6);
/// assert!(output.tilt_heading.abs() < 1e-6);
/// ```
pub fn step(sample: &RawSample, state: &FusionState, profile: &CalibrationProfile) -> FusionOutput {
    let enables = profile.enables;
    let status = status_for(enables);
    let heading = tilt_heading(&sample.accel, &sample.compass);

    let orientation = if status.is_holding() {
        state.orientation
    } else {
        match state.last_timestamp {
            None => reference(sample, &state.orientation, profile),
            Some(last) => {
                let predicted = predict(sample, state.orientation, last, enables);
                correct(predicted, reference(sample, &state.orientation, profile), profile)
            }
        }
    };

    // A non-finite result would poison every later step
    let orientation = if orientation.coords.iter().all(|c| c.is_finite()) {
        orientation
    } else {
        state.orientation
    };

    let next = FusionState {
        orientation,
        last_timestamp: Some(sample.timestamp),
        sample_count: state.sample_count + 1,
    };

    FusionOutput {
        state: next,
        orientation,
        pose: orientation.to_euler(),
        tilt_heading: heading,
        status,
    }
}

fn status_for(enables: SensorEnables) -> FusionStatus {
    if enables.all() {
        FusionStatus::Nominal
    } else {
        FusionStatus::Degraded {
            holding: !enables.gyro && !enables.accel,
        }
    }
}

/// Gyro integration from the previous orientation
fn predict(
    sample: &RawSample,
    orientation: UnitQuaternion<f32>,
    last_timestamp: u64,
    enables: SensorEnables,
) -> UnitQuaternion<f32> {
    if !enables.gyro || sample.timestamp <= last_timestamp {
        return orientation;
    }

    let delta_time = (sample.timestamp - last_timestamp) as f32 / MICROS_PER_SECOND;
    orientation.integrate(&sample.gyro, delta_time)
}

/// Reference orientation built from the enabled reference sensors
///
/// Axes whose sensor is disabled keep the value of `current`.
fn reference(
    sample: &RawSample,
    current: &UnitQuaternion<f32>,
    profile: &CalibrationProfile,
) -> UnitQuaternion<f32> {
    let current_pose = current.to_euler();

    let mut pose = if profile.enables.accel {
        accel_to_euler(&sample.accel)
    } else {
        Vector3::new(current_pose.x, current_pose.y, 0.0)
    };

    pose.z = if profile.enables.compass && sample.compass.magnitude_squared() > 0.0 {
        compass_yaw(&pose, &sample.compass) - profile.compass_declination
    } else {
        current_pose.z
    };

    UnitQuaternion::from_euler_vector(&pose)
}

/// Rotate `predicted` towards `reference` by the fusion gain
///
/// The rotation between the two is raised to the power `slerp_power`, which
/// is SLERP along the shortest arc.
fn correct(
    predicted: UnitQuaternion<f32>,
    reference: UnitQuaternion<f32>,
    profile: &CalibrationProfile,
) -> UnitQuaternion<f32> {
    if !profile.enables.accel && !profile.enables.compass {
        return predicted;
    }

    let delta = predicted.inverse() * reference;
    let corrected = predicted * delta.powf(profile.slerp_power);
    UnitQuaternion::new_normalize(corrected.into_inner())
}

/// Stateful wrapper owning the [`FusionState`]
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use imu_fusion::{CalibrationProfile, Fusion, RawSample};
///
/// let profile = CalibrationProfile::default();
/// let mut fusion = Fusion::new();
///
/// for i in 0..10u64 {
///     let sample = RawSample::new(
///         i * 10_000, // 100 Hz
///         Vector3::new(0.0, 0.0, 9.81),
///         Vector3::zeros(),
///         Vector3::new(1.0, 0.0, 0.0),
///     );
///     fusion.update(&sample, &profile);
/// }
///
/// assert!(fusion.orientation().angle() < 1e-3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Fusion {
    state: FusionState,
}

impl Fusion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fuse one corrected sample
    pub fn update(&mut self, sample: &RawSample, profile: &CalibrationProfile) -> FusionOutput {
        let output = step(sample, &self.state, profile);
        self.state = output.state;
        output
    }

    /// Current orientation estimate
    pub fn orientation(&self) -> UnitQuaternion<f32> {
        self.state.orientation
    }

    pub fn state(&self) -> &FusionState {
        &self.state
    }

    /// Forget the estimate; the next sample re-seeds it from the reference
    pub fn reset(&mut self) {
        self.state = FusionState::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vector3Ext;

    const PERIOD_US: u64 = 10_000;

    fn level_sample(timestamp: u64, gyro: Vector3<f32>) -> RawSample {
        RawSample::new(
            timestamp,
            Vector3::new(0.0, 0.0, 9.81),
            gyro,
            Vector3::new(0.4, 0.0, 0.3),
        )
    }

    fn profile_with(gain: f32, enables: SensorEnables) -> CalibrationProfile {
        CalibrationProfile {
            slerp_power: gain,
            enables,
            ..Default::default()
        }
    }

    #[test]
    fn test_new_state() {
        let state = FusionState::new();
        assert!(!state.is_initialised());
        assert_eq!(state.sample_count(), 0);
    }

    #[test]
    fn test_first_sample_seeds_from_reference() {
        let profile = CalibrationProfile::default();
        let tilted = RawSample::new(
            0,
            Vector3::new(0.0, 9.81 * 0.5f32.sin(), 9.81 * 0.5f32.cos()),
            Vector3::new(1.0, 1.0, 1.0),
            Vector3::new(1.0, 0.0, 0.0),
        );

        let output = step(&tilted, &FusionState::new(), &profile);

        assert!((output.pose.x - 0.5).abs() < 1e-5);
        assert!(output.state.is_initialised());
        assert_eq!(output.status, FusionStatus::Nominal);
    }

    #[test]
    fn test_gyro_disabled_contributes_no_rotation() {
        let profile = profile_with(0.0, SensorEnables::new(false, true, true));
        let mut fusion = Fusion::new();

        fusion.update(&level_sample(0, Vector3::zeros()), &profile);
        let output = fusion.update(&level_sample(PERIOD_US, Vector3::new(0.0, 0.0, 5.0)), &profile);

        assert!(output.orientation.angle() < 1e-6);
        assert_eq!(output.status, FusionStatus::Degraded { holding: false });
    }

    #[test]
    fn test_holding_when_gyro_and_accel_disabled() {
        let mut fusion = Fusion::new();
        let profile = CalibrationProfile::default();
        for i in 0..5 {
            fusion.update(
                &level_sample(i * PERIOD_US, Vector3::new(0.0, 0.0, 0.3)),
                &profile,
            );
        }
        let before = fusion.orientation();

        let holding = profile_with(0.02, SensorEnables::new(false, false, true));
        let output = fusion.update(
            &level_sample(5 * PERIOD_US, Vector3::new(0.0, 0.0, 0.3)),
            &holding,
        );

        assert_eq!(output.orientation, before);
        assert!(output.status.is_holding());
        assert_eq!(output.state.sample_count(), 6);
    }

    #[test]
    fn test_repeated_timestamp_skips_integration() {
        let profile = profile_with(0.0, SensorEnables::ALL);
        let mut fusion = Fusion::new();

        fusion.update(&level_sample(PERIOD_US, Vector3::zeros()), &profile);
        let spinning = level_sample(PERIOD_US, Vector3::new(0.0, 0.0, 10.0));
        let output = fusion.update(&spinning, &profile);

        assert!(output.orientation.angle() < 1e-6);
    }

    #[test]
    fn test_non_finite_rate_keeps_prior_orientation() {
        let profile = profile_with(0.0, SensorEnables::ALL);
        let mut fusion = Fusion::new();
        let before = fusion.update(&level_sample(0, Vector3::zeros()), &profile).orientation;

        let runaway = level_sample(PERIOD_US, Vector3::new(f32::INFINITY, 0.0, 0.0));
        let output = fusion.update(&runaway, &profile);
        assert_eq!(output.orientation, before);
        assert!(output.pose.all_finite());

        let output = fusion.update(&level_sample(2 * PERIOD_US, Vector3::zeros()), &profile);
        assert!(output.pose.all_finite());
        assert!(output.pose.magnitude() < 1e-5);
    }

    #[test]
    fn test_declination_shifts_reference_yaw() {
        let profile = CalibrationProfile {
            slerp_power: 1.0,
            compass_declination: 0.1,
            ..Default::default()
        };
        let output = step(&level_sample(0, Vector3::zeros()), &FusionState::new(), &profile);

        assert!((output.pose.z + 0.1).abs() < 1e-5);
        // Tilt heading is uncorrected
        assert!(output.tilt_heading.abs() < 1e-6);
    }

    #[test]
    fn test_intermediate_gain_converges() {
        let profile = profile_with(0.05, SensorEnables::ALL);
        let mut fusion = Fusion::new();

        // Seed with a wrong heading, then feed the true one
        let east = RawSample::new(
            0,
            Vector3::new(0.0, 0.0, 9.81),
            Vector3::zeros(),
            Vector3::new(0.0, 1.0, 0.0),
        );
        fusion.update(&east, &profile);
        let mut last_error = f32::MAX;
        for i in 1..200 {
            let output = fusion.update(&level_sample(i * PERIOD_US, Vector3::zeros()), &profile);
            let error = output.pose.z.abs();
            assert!(error <= last_error + 1e-6);
            last_error = error;
        }

        assert!(last_error < 1e-3);
    }
}
