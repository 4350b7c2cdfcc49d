//! Read, correct, fuse, publish
//!
//! [`Engine`] runs one fusion cycle at a time. It owns the source, the
//! fusion state and the worker's view of the calibration profile, and it is
//! the only writer of the snapshot store. Profile changes staged through the
//! [`CalibrationStore`] are picked up at the start of a cycle, never during
//! one.

use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::calibration::{CalibrationProfile, CalibrationStore, ProfileWatch};
use crate::error::ImuError;
use crate::fusion::{Fusion, FusionState};
use crate::math::MICROS_PER_SECOND;
use crate::offset::GyroBiasEstimator;
use crate::snapshot::SnapshotStore;
use crate::source::{SensorInventory, SensorSource, SourceError};
use crate::types::{FusionStatus, Measurement, RawSample};

/// Position of the engine within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CycleState {
    #[default]
    Idle,
    Reading,
    Correcting,
    Fusing,
    Published,
}

/// Scheduler tunables
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerSettings {
    /// Upper bound on a single source read
    pub read_timeout: Duration,
    /// Events buffered between the worker and the dispatcher in continuous
    /// mode. Events beyond this are dropped.
    pub event_capacity: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(100),
            event_capacity: 32,
        }
    }
}

/// Counters kept across cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleStats {
    /// Cycles that published a measurement
    pub completed: u64,
    /// Cycles that ended in a read failure
    pub failed: u64,
    /// Continuous-mode events dropped because the consumer fell behind
    pub dropped_events: u64,
}

/// Single-threaded fusion cycle driver
#[derive(Debug)]
pub struct Engine<S> {
    source: S,
    inventory: SensorInventory,
    profile: CalibrationProfile,
    profile_watch: ProfileWatch,
    fusion: Fusion,
    gyro_bias: Option<GyroBiasEstimator>,
    /// Timestamp of the last sample seen by the bias estimator
    last_timestamp: Option<u64>,
    snapshot: SnapshotStore,
    settings: SchedulerSettings,
    state: CycleState,
    status: FusionStatus,
    stats: CycleStats,
}

impl<S: SensorSource> Engine<S> {
    /// Initialise `source` and bind it to a profile and a snapshot store
    ///
    /// Fails with [`ImuError::SensorUnavailable`] when the primary IMU cannot
    /// be found. Missing pressure or humidity sensors are only logged.
    pub fn new(
        mut source: S,
        calibration: &CalibrationStore,
        snapshot: SnapshotStore,
        settings: SchedulerSettings,
    ) -> Result<Self, ImuError> {
        let inventory = source
            .init()
            .map_err(|err| ImuError::SensorUnavailable(err.to_string()))?;

        info!(imu = %inventory.imu, "IMU initialised");
        match &inventory.pressure {
            Some(name) => info!(pressure = %name, "Pressure sensor initialised"),
            None => warn!("No pressure sensor found, pressure fields omitted"),
        }
        match &inventory.humidity {
            Some(name) => info!(humidity = %name, "Humidity sensor initialised"),
            None => warn!("No humidity sensor found, humidity fields omitted"),
        }

        let mut profile_watch = calibration.watch();
        let profile = profile_watch.current();

        let mut engine = Self {
            source,
            inventory,
            profile,
            profile_watch,
            fusion: Fusion::new(),
            gyro_bias: None,
            last_timestamp: None,
            snapshot,
            settings,
            state: CycleState::Idle,
            status: FusionStatus::Nominal,
            stats: CycleStats::default(),
        };
        engine.sync_gyro_bias();
        Ok(engine)
    }

    /// Run exactly one cycle
    ///
    /// On success the measurement has been published. On failure the engine
    /// is back in [`CycleState::Idle`] and the previous snapshot is intact.
    pub fn run_cycle(&mut self) -> Result<Measurement, ImuError> {
        self.apply_staged_profile();

        self.transition(CycleState::Reading);
        let sample = match self.read_sample() {
            Ok(sample) => sample,
            Err(err) => {
                self.stats.failed += 1;
                debug!(%err, "Fusion cycle failed");
                self.transition(CycleState::Idle);
                return Err(err);
            }
        };

        self.transition(CycleState::Correcting);
        let corrected = match self.correct(&sample) {
            Ok(corrected) => corrected,
            Err(err) => {
                self.stats.failed += 1;
                debug!(%err, "Fusion cycle failed");
                self.transition(CycleState::Idle);
                return Err(err);
            }
        };

        self.transition(CycleState::Fusing);
        let output = self.fusion.update(&corrected, &self.profile);
        self.track_status(output.status);

        let measurement = Measurement {
            timestamp: corrected.timestamp,
            accel: corrected.accel,
            gyro: corrected.gyro,
            compass: corrected.compass,
            fusion_pose: output.pose,
            tilt_heading: output.tilt_heading,
            pressure: corrected.pressure,
            humidity: corrected.humidity,
        };
        self.snapshot.publish(measurement);
        self.transition(CycleState::Published);
        self.stats.completed += 1;

        self.transition(CycleState::Idle);
        Ok(measurement)
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Status reported by the most recent fusion step
    pub fn status(&self) -> FusionStatus {
        self.status
    }

    pub fn stats(&self) -> CycleStats {
        self.stats
    }

    pub fn inventory(&self) -> &SensorInventory {
        &self.inventory
    }

    /// Profile in effect for the current or next cycle
    pub fn profile(&self) -> &CalibrationProfile {
        &self.profile
    }

    pub fn fusion_state(&self) -> &FusionState {
        self.fusion.state()
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Back-off before the next attempt after a failed cycle
    pub fn poll_interval(&self) -> Duration {
        self.source.poll_interval()
    }

    pub(crate) fn record_dropped_event(&mut self) {
        self.stats.dropped_events += 1;
    }

    fn transition(&mut self, next: CycleState) {
        trace!(from = ?self.state, to = ?next, "Cycle state");
        self.state = next;
    }

    fn apply_staged_profile(&mut self) {
        if let Some(profile) = self.profile_watch.at_cycle_boundary() {
            debug!(
                enables = ?profile.enables,
                slerp_power = profile.slerp_power,
                "Applying staged calibration profile"
            );
            self.profile = profile;
            self.sync_gyro_bias();
        }
    }

    fn sync_gyro_bias(&mut self) {
        let settings = self.profile.gyro_bias_learning;
        if settings.enabled {
            self.gyro_bias
                .get_or_insert_with(|| GyroBiasEstimator::new(settings))
                .set_settings(settings);
        } else {
            self.gyro_bias = None;
        }
    }

    fn read_sample(&mut self) -> Result<RawSample, ImuError> {
        let timeout = self.settings.read_timeout;
        let started = Instant::now();

        let sample = self.source.read(timeout).map_err(|err| match err {
            SourceError::NotDetected(reason) => ImuError::SensorUnavailable(reason),
            SourceError::Exhausted => ImuError::SensorUnavailable("source exhausted".into()),
            SourceError::Timeout(waited) => ImuError::Timeout(waited),
            SourceError::Malformed(reason) => ImuError::MalformedSample(reason),
        })?;

        // A late sample is discarded rather than fused out of time
        let elapsed = started.elapsed();
        if elapsed > timeout {
            return Err(ImuError::Timeout(elapsed));
        }

        if let Some(field) = sample.first_non_finite() {
            return Err(ImuError::MalformedSample(format!(
                "non-finite {field} at {}us",
                sample.timestamp
            )));
        }

        let mut sample = self.inventory.restrict(sample);
        sample.sanitize_environment();
        Ok(sample)
    }

    fn correct(&mut self, sample: &RawSample) -> Result<RawSample, ImuError> {
        let mut corrected = self.profile.correct(sample);

        // Large but finite calibration terms can still overflow
        if let Some(field) = corrected.first_non_finite() {
            return Err(ImuError::MalformedSample(format!(
                "non-finite corrected {field} at {}us",
                sample.timestamp
            )));
        }

        if let Some(estimator) = &mut self.gyro_bias {
            let delta_time = match self.last_timestamp {
                Some(last) if sample.timestamp > last => {
                    (sample.timestamp - last) as f32 / MICROS_PER_SECOND
                }
                _ => 0.0,
            };
            corrected.gyro = estimator.update(corrected.gyro, delta_time);
        }
        self.last_timestamp = Some(sample.timestamp);

        Ok(corrected)
    }

    fn track_status(&mut self, status: FusionStatus) {
        if status == self.status {
            return;
        }
        match status {
            FusionStatus::Degraded { holding: true } => {
                warn!("Gyro and accelerometer disabled, holding last orientation")
            }
            FusionStatus::Degraded { holding: false } => {
                warn!(enables = ?self.profile.enables, "Fusion degraded")
            }
            FusionStatus::Nominal => info!("Fusion back to nominal"),
        }
        self.status = status;
    }
}
