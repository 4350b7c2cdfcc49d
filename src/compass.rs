//! Reference orientation from accelerometer and magnetometer
//!
//! Roll and pitch come from the gravity direction; yaw comes from the
//! magnetometer after rotating it into the horizontal plane with that roll
//! and pitch. Euler vectors are (roll, pitch, yaw) in radians.

use nalgebra::{UnitQuaternion, Vector3};

use crate::math::{QuaternionExt, Vector3Ext};

/// Roll and pitch from an accelerometer reading, yaw left at zero
///
/// The reading is normalised first, so any unit works. A zero vector yields
/// a level pose.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use imu_fusion::compass::accel_to_euler;
///
/// let level = accel_to_euler(&Vector3::new(0.0, 0.0, 9.81));
/// assert!(level.magnitude() < 1e-6);
/// ```
pub fn accel_to_euler(accelerometer: &Vector3<f32>) -> Vector3<f32> {
    let a = accelerometer.safe_normalize();
    let roll = a.y.atan2(a.z);
    let pitch = -a.x.atan2((a.y * a.y + a.z * a.z).sqrt());
    Vector3::new(roll, pitch, 0.0)
}

/// Yaw of a magnetometer reading once tilted back to level by `roll_pitch`
pub fn compass_yaw(roll_pitch: &Vector3<f32>, magnetometer: &Vector3<f32>) -> f32 {
    let tilt = UnitQuaternion::from_euler_angles(roll_pitch.x, roll_pitch.y, 0.0);
    let level = tilt.transform_vector(magnetometer);
    -level.y.atan2(level.x)
}

/// Full pose from an accelerometer and magnetometer pair
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use imu_fusion::compass::pose_from_accel_mag;
///
/// let accel = Vector3::new(0.0, 0.0, 9.81); // Level device
/// let mag = Vector3::new(1.0, 0.0, 0.0);    // Pointing North
/// let pose = pose_from_accel_mag(&accel, &mag);
/// assert!(pose.magnitude() < 1e-6);
/// ```
pub fn pose_from_accel_mag(
    accelerometer: &Vector3<f32>,
    magnetometer: &Vector3<f32>,
) -> Vector3<f32> {
    let mut pose = accel_to_euler(accelerometer);
    pose.z = compass_yaw(&pose, magnetometer);
    pose
}

/// Tilt-compensated heading in radians (yaw about gravity)
pub fn tilt_heading(accelerometer: &Vector3<f32>, magnetometer: &Vector3<f32>) -> f32 {
    pose_from_accel_mag(accelerometer, magnetometer).z
}

/// Reference orientation as a quaternion
pub fn reference_orientation(
    accelerometer: &Vector3<f32>,
    magnetometer: &Vector3<f32>,
) -> UnitQuaternion<f32> {
    UnitQuaternion::from_euler_vector(&pose_from_accel_mag(accelerometer, magnetometer))
}
