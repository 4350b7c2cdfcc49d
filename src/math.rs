//! Mathematical utilities and nalgebra extensions for the fusion engine

use nalgebra::{UnitQuaternion, Vector3};

/// Mathematical constants
pub const DEG_TO_RAD: f32 = core::f32::consts::PI / 180.0;
pub const RAD_TO_DEG: f32 = 180.0 / core::f32::consts::PI;

/// Microseconds per second, used to turn sample timestamps into time deltas
pub const MICROS_PER_SECOND: f32 = 1_000_000.0;

/// Extension trait for Vector3 operations
pub trait Vector3Ext {
    /// Normalize the vector, returning zero vector if magnitude is zero
    fn safe_normalize(&self) -> Vector3<f32>;

    /// True when every component is a finite number
    fn all_finite(&self) -> bool;

    /// Convert degrees to radians
    fn deg_to_rad(&self) -> Vector3<f32>;

    /// Convert radians to degrees
    fn rad_to_deg(&self) -> Vector3<f32>;
}

impl Vector3Ext for Vector3<f32> {
    fn safe_normalize(&self) -> Vector3<f32> {
        let magnitude_squared = self.magnitude_squared();
        if magnitude_squared > 0.0 {
            *self / magnitude_squared.sqrt()
        } else {
            Vector3::zeros()
        }
    }

    fn all_finite(&self) -> bool {
        self.iter().all(|component| component.is_finite())
    }

    fn deg_to_rad(&self) -> Vector3<f32> {
        *self * DEG_TO_RAD
    }

    fn rad_to_deg(&self) -> Vector3<f32> {
        *self * RAD_TO_DEG
    }
}

/// Extension trait for UnitQuaternion operations
///
/// Euler angles follow the aerospace ZYX sequence: `x` is roll, `y` is pitch
/// and `z` is yaw, all in radians.
pub trait QuaternionExt {
    /// Convert quaternion to Euler angles (roll, pitch, yaw) in radians
    fn to_euler(&self) -> Vector3<f32>;

    /// Create quaternion from an Euler vector (roll, pitch, yaw) in radians
    fn from_euler_vector(euler: &Vector3<f32>) -> UnitQuaternion<f32>;

    /// Integrate a body-frame angular rate over `delta_time` seconds
    ///
    /// First-order integration of `dq/dt = 0.5 * q * ω`, renormalised.
    fn integrate(&self, angular_rate: &Vector3<f32>, delta_time: f32) -> UnitQuaternion<f32>;
}

impl QuaternionExt for UnitQuaternion<f32> {
    fn to_euler(&self) -> Vector3<f32> {
        let (roll, pitch, yaw) = self.euler_angles();
        Vector3::new(roll, pitch, yaw)
    }

    fn from_euler_vector(euler: &Vector3<f32>) -> UnitQuaternion<f32> {
        UnitQuaternion::from_euler_angles(euler.x, euler.y, euler.z)
    }

    fn integrate(&self, angular_rate: &Vector3<f32>, delta_time: f32) -> UnitQuaternion<f32> {
        let half_rate = nalgebra::Quaternion::from_parts(0.0, *angular_rate * 0.5);
        let derivative = self.as_ref() * half_rate;
        UnitQuaternion::from_quaternion(self.as_ref() + derivative * delta_time)
    }
}
