//! Runtime gyroscope bias learning

use nalgebra::Vector3;

use crate::types::GyroBiasSettings;

/// Gyroscope bias estimator
///
/// Residual bias left after static calibration drifts with temperature. The
/// estimator watches the corrected rate: once every axis has stayed below
/// the stationary threshold for `timeout` seconds, the residual is low-pass
/// filtered into the bias estimate. Any motion restarts the timer.
#[derive(Debug, Clone, Copy)]
pub struct GyroBiasEstimator {
    settings: GyroBiasSettings,
    /// Seconds spent stationary so far
    stationary_time: f32,
    /// Current bias estimate in rad/s
    bias: Vector3<f32>,
}

impl GyroBiasEstimator {
    /// Create an estimator with a zero bias estimate
    ///
    /// # Example
    /// ```
    /// use imu_fusion::{GyroBiasEstimator, GyroBiasSettings};
    ///
    /// let estimator = GyroBiasEstimator::new(GyroBiasSettings::default());
    /// assert!(!estimator.is_active());
    /// ```
    pub fn new(settings: GyroBiasSettings) -> Self {
        Self {
            settings,
            stationary_time: 0.0,
            bias: Vector3::zeros(),
        }
    }

    /// Update the estimate and return the bias-corrected rate
    ///
    /// # Arguments
    /// * `gyroscope` - Calibrated angular rate in rad/s
    /// * `delta_time` - Seconds since the previous sample
    pub fn update(&mut self, gyroscope: Vector3<f32>, delta_time: f32) -> Vector3<f32> {
        let corrected = gyroscope - self.bias;

        if corrected.iter().any(|rate| rate.abs() > self.settings.threshold) {
            self.stationary_time = 0.0;
            return corrected;
        }

        if self.stationary_time < self.settings.timeout {
            self.stationary_time += delta_time.max(0.0);
            return corrected;
        }

        // offset += 2π·fc·dt × residual
        let coefficient =
            2.0 * core::f32::consts::PI * self.settings.cutoff_frequency * delta_time.max(0.0);
        self.bias += corrected * coefficient.min(1.0);

        corrected
    }

    /// Current bias estimate in rad/s
    pub fn bias(&self) -> Vector3<f32> {
        self.bias
    }

    /// True once the device has been stationary long enough to learn
    pub fn is_active(&self) -> bool {
        self.stationary_time >= self.settings.timeout
    }

    /// Forget the estimate and the stationary timer
    pub fn reset(&mut self) {
        self.stationary_time = 0.0;
        self.bias = Vector3::zeros();
    }

    /// Swap in new settings, keeping the estimate
    pub fn set_settings(&mut self, settings: GyroBiasSettings) {
        self.settings = settings;
    }
}

impl Default for GyroBiasEstimator {
    fn default() -> Self {
        Self::new(GyroBiasSettings::default())
    }
}
