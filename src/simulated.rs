//! Simulated sensor source
//!
//! Models a rigid body spinning at a constant body rate in a uniform gravity
//! and magnetic field. Noise is uniform and seeded, so two simulators with
//! the same settings produce identical sample streams.

use std::ops::RangeInclusive;
use std::time::{Duration, Instant};

use nalgebra::{UnitQuaternion, Vector3};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use crate::source::{SensorInventory, SensorSource, SourceError};
use crate::types::{HumidityReading, PressureReading, RawSample};

/// Standard gravity in m/s²
pub const STANDARD_GRAVITY: f32 = 9.80665;

/// Sample rates accepted by [`SimulatedSource`], in Hz
pub const SAMPLE_RATE_RANGE: RangeInclusive<f32> = 0.001..=100_000.0;

/// Simulation parameters
#[derive(Debug, Clone)]
pub struct SimulationSettings {
    /// Samples per second, within [`SAMPLE_RATE_RANGE`]
    pub sample_rate: f32,
    /// Constant body-frame angular rate in rad/s
    pub angular_rate: Vector3<f32>,
    /// Initial orientation as (roll, pitch, yaw) in radians
    pub initial_pose: Vector3<f32>,
    /// Earth-frame magnetic field in gauss
    pub magnetic_field: Vector3<f32>,
    /// Uniform noise amplitude on each accelerometer axis, m/s²
    pub accel_noise: f32,
    /// Uniform noise amplitude on each gyroscope axis, rad/s
    pub gyro_noise: f32,
    /// Uniform noise amplitude on each compass axis, gauss
    pub compass_noise: f32,
    /// Static pressure in millibar, `None` for no barometer
    pub pressure: Option<f32>,
    /// Relative humidity in %RH, `None` for no hygrometer
    pub humidity: Option<f32>,
    /// Ambient temperature reported by the environmental sensors, °C
    pub temperature: f32,
    /// Timestamp of the first sample in microseconds
    pub start_timestamp: u64,
    /// Sleep between samples to match `sample_rate` in real time
    pub paced: bool,
    pub seed: u64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            sample_rate: 100.0,
            angular_rate: Vector3::zeros(),
            initial_pose: Vector3::zeros(),
            magnetic_field: Vector3::new(0.2, 0.0, 0.45),
            accel_noise: 0.0,
            gyro_noise: 0.0,
            compass_noise: 0.0,
            pressure: None,
            humidity: None,
            temperature: 21.5,
            start_timestamp: 0,
            paced: false,
            seed: 0,
        }
    }
}

/// Rotating rigid body simulator
#[derive(Debug, Clone)]
pub struct SimulatedSource {
    settings: SimulationSettings,
    rng: Pcg64,
    orientation: UnitQuaternion<f32>,
    sample_index: u64,
    next_due: Option<Instant>,
}

impl SimulatedSource {
    pub fn new(settings: SimulationSettings) -> Self {
        let initial = settings.initial_pose;
        Self {
            rng: Pcg64::seed_from_u64(settings.seed),
            orientation: UnitQuaternion::from_euler_angles(initial.x, initial.y, initial.z),
            sample_index: 0,
            next_due: None,
            settings,
        }
    }

    /// True orientation of the simulated body at the next sample
    pub fn truth(&self) -> UnitQuaternion<f32> {
        self.orientation
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    // Zero until `init` has accepted the rate
    fn period(&self) -> Duration {
        Duration::try_from_secs_f32(1.0 / self.settings.sample_rate).unwrap_or_default()
    }

    fn noise(&mut self, amplitude: f32) -> Vector3<f32> {
        if amplitude <= 0.0 {
            return Vector3::zeros();
        }
        Vector3::from_fn(|_, _| self.rng.random_range(-amplitude..=amplitude))
    }

    fn wait_for_next(&mut self, timeout: Duration) -> Result<(), SourceError> {
        let now = Instant::now();
        let due = *self.next_due.get_or_insert(now);
        let wait = due.saturating_duration_since(now);

        if wait > timeout {
            std::thread::sleep(timeout);
            return Err(SourceError::Timeout(timeout));
        }
        std::thread::sleep(wait);
        self.next_due = Some(due + self.period());
        Ok(())
    }

    fn generate(&mut self) -> RawSample {
        let settings = &self.settings;
        let period_us = (1_000_000.0 / settings.sample_rate) as u64;
        let timestamp = settings.start_timestamp + self.sample_index * period_us;
        let angular_rate = settings.angular_rate;
        let (accel_noise, gyro_noise, compass_noise) =
            (settings.accel_noise, settings.gyro_noise, settings.compass_noise);

        let gravity = Vector3::new(0.0, 0.0, STANDARD_GRAVITY);
        let accel = self.orientation.inverse_transform_vector(&gravity) + self.noise(accel_noise);
        let compass = self
            .orientation
            .inverse_transform_vector(&self.settings.magnetic_field)
            + self.noise(compass_noise);
        let gyro = angular_rate + self.noise(gyro_noise);

        let mut sample = RawSample::new(timestamp, accel, gyro, compass);
        if let Some(pressure) = self.settings.pressure {
            sample = sample.with_pressure(PressureReading {
                pressure,
                pressure_valid: true,
                temperature: self.settings.temperature,
                temperature_valid: true,
            });
        }
        if let Some(humidity) = self.settings.humidity {
            sample = sample.with_humidity(HumidityReading {
                humidity,
                humidity_valid: true,
                temperature: self.settings.temperature,
                temperature_valid: true,
            });
        }

        let delta_time = 1.0 / self.settings.sample_rate;
        self.orientation *= UnitQuaternion::from_scaled_axis(angular_rate * delta_time);
        self.sample_index += 1;
        sample
    }
}

impl SensorSource for SimulatedSource {
    fn init(&mut self) -> Result<SensorInventory, SourceError> {
        if !SAMPLE_RATE_RANGE.contains(&self.settings.sample_rate) {
            return Err(SourceError::NotDetected(format!(
                "invalid simulated sample rate {}",
                self.settings.sample_rate
            )));
        }

        let mut inventory = SensorInventory::imu_only("simulated-imu");
        if self.settings.pressure.is_some() {
            inventory = inventory.with_pressure("simulated-barometer");
        }
        if self.settings.humidity.is_some() {
            inventory = inventory.with_humidity("simulated-hygrometer");
        }
        Ok(inventory)
    }

    fn read(&mut self, timeout: Duration) -> Result<RawSample, SourceError> {
        if self.settings.paced {
            self.wait_for_next(timeout)?;
        }
        Ok(self.generate())
    }

    fn poll_interval(&self) -> Duration {
        self.period() / 2
    }
}
