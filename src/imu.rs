//! The IMU context
//!
//! [`Imu`] owns a sensor source, its calibration profile, the fusion state
//! and the snapshot store. It runs cycles inline with [`Imu::read_once`], or
//! hands itself to a worker thread with [`Imu::start_continuous`] and gets
//! handed back by [`ContinuousHandle::stop`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::calibration::{CalibrationProfile, CalibrationStore};
use crate::error::ImuError;
use crate::scheduler::{CycleStats, Engine, SchedulerSettings};
use crate::snapshot::{SnapshotReader, SnapshotStore};
use crate::source::{SensorInventory, SensorSource};
use crate::types::{FusionStatus, Measurement};

/// Outcome of one continuous-mode cycle
#[derive(Debug)]
pub enum CycleEvent {
    Published(Measurement),
    Failed(ImuError),
}

/// Sensor-fusion context
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use imu_fusion::{CalibrationProfile, Imu, RawSample, ReplaySource};
///
/// let source = ReplaySource::from_samples([RawSample::new(
///     0,
///     Vector3::new(0.0, 0.0, 9.81),
///     Vector3::zeros(),
///     Vector3::new(1.0, 0.0, 0.0),
/// )]);
/// let mut imu = Imu::new(source, CalibrationProfile::default()).unwrap();
///
/// let measurement = imu.read_once().unwrap();
/// assert_eq!(imu.latest().unwrap(), measurement);
/// ```
#[derive(Debug)]
pub struct Imu<S> {
    engine: Engine<S>,
    calibration: CalibrationStore,
    snapshot: SnapshotStore,
}

impl<S: SensorSource> Imu<S> {
    /// Initialise `source` with default scheduler settings
    pub fn new(source: S, profile: CalibrationProfile) -> Result<Self, ImuError> {
        Self::with_settings(source, profile, SchedulerSettings::default())
    }

    /// Initialise `source`
    ///
    /// Fails with [`ImuError::Config`] for an invalid profile and
    /// [`ImuError::SensorUnavailable`] when the primary IMU is missing.
    pub fn with_settings(
        source: S,
        profile: CalibrationProfile,
        settings: SchedulerSettings,
    ) -> Result<Self, ImuError> {
        profile.validate()?;

        let calibration = CalibrationStore::new(profile);
        let snapshot = SnapshotStore::new();
        let engine = Engine::new(source, &calibration, snapshot.clone(), settings)?;

        Ok(Self {
            engine,
            calibration,
            snapshot,
        })
    }

    /// Run one read, correct, fuse, publish cycle on the calling thread
    pub fn read_once(&mut self) -> Result<Measurement, ImuError> {
        self.engine.run_cycle()
    }

    /// Most recently published measurement
    pub fn latest(&self) -> Result<Measurement, ImuError> {
        self.snapshot.read()
    }

    /// Enable or disable fusion inputs from the next cycle on
    pub fn reconfigure(&self, enable_gyro: bool, enable_accel: bool, enable_compass: bool) {
        self.calibration
            .reconfigure(enable_gyro, enable_accel, enable_compass);
    }

    /// Change the fusion gain from the next cycle on
    pub fn set_slerp_power(&self, slerp_power: f32) -> Result<(), ImuError> {
        Ok(self.calibration.set_slerp_power(slerp_power)?)
    }

    pub fn calibration(&self) -> &CalibrationStore {
        &self.calibration
    }

    pub fn snapshot_reader(&self) -> SnapshotReader {
        self.snapshot.reader()
    }

    /// Status of the most recent fusion step
    pub fn fusion_status(&self) -> FusionStatus {
        self.engine.status()
    }

    pub fn inventory(&self) -> &SensorInventory {
        self.engine.inventory()
    }

    pub fn stats(&self) -> CycleStats {
        self.engine.stats()
    }
}

impl<S: SensorSource + Send + 'static> Imu<S> {
    /// Run cycles back to back on a worker thread
    ///
    /// `on_publish` is called from a dispatcher thread for every published
    /// measurement. Failed cycles are skipped; use
    /// [`Imu::start_continuous_with_events`] to observe them.
    pub fn start_continuous<F>(self, mut on_publish: F) -> Result<ContinuousHandle<S>, ImuError>
    where
        F: FnMut(Measurement) + Send + 'static,
    {
        self.start_continuous_with_events(move |event| {
            if let CycleEvent::Published(measurement) = event {
                on_publish(measurement);
            }
        })
    }

    /// Run cycles back to back, reporting every cycle outcome
    pub fn start_continuous_with_events<F>(
        self,
        mut on_event: F,
    ) -> Result<ContinuousHandle<S>, ImuError>
    where
        F: FnMut(CycleEvent) + Send + 'static,
    {
        let Imu {
            engine,
            calibration,
            snapshot,
        } = self;

        let capacity = engine.settings().event_capacity.max(1);
        let (events, mut receiver) = mpsc::channel(capacity);
        let stop = Arc::new(AtomicBool::new(false));

        let dispatcher = thread::Builder::new()
            .name("imu-dispatch".into())
            .spawn(move || {
                while let Some(event) = receiver.blocking_recv() {
                    on_event(event);
                }
            })?;

        let worker_stop = Arc::clone(&stop);
        let worker = thread::Builder::new()
            .name("imu-worker".into())
            .spawn(move || run_worker(engine, events, worker_stop))?;

        info!(capacity, "Continuous mode started");
        Ok(ContinuousHandle {
            stop,
            worker: Some(worker),
            dispatcher: Some(dispatcher),
            calibration,
            snapshot,
        })
    }
}

fn run_worker<S: SensorSource>(
    mut engine: Engine<S>,
    events: mpsc::Sender<CycleEvent>,
    stop: Arc<AtomicBool>,
) -> Engine<S> {
    while !stop.load(Ordering::Acquire) {
        let (event, failed) = match engine.run_cycle() {
            Ok(measurement) => (CycleEvent::Published(measurement), false),
            Err(err) => {
                if err.is_transient() {
                    debug!(%err, "Cycle failed, retrying after poll interval");
                } else {
                    warn!(%err, "Cycle failed");
                }
                (CycleEvent::Failed(err), true)
            }
        };

        match events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                engine.record_dropped_event();
                warn!("Consumer behind, dropping cycle event");
            }
            Err(TrySendError::Closed(_)) => debug!("Dispatcher gone, event discarded"),
        }

        if failed {
            thread::sleep(engine.poll_interval());
        }
    }

    let stats = engine.stats();
    info!(
        completed = stats.completed,
        failed = stats.failed,
        dropped = stats.dropped_events,
        "Continuous mode stopped"
    );
    engine
}

/// Handle onto a running continuous-mode worker
///
/// Dropping the handle asks the worker to stop without waiting for it.
#[derive(Debug)]
pub struct ContinuousHandle<S> {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<Engine<S>>>,
    dispatcher: Option<JoinHandle<()>>,
    calibration: CalibrationStore,
    snapshot: SnapshotStore,
}

impl<S> ContinuousHandle<S> {
    /// Most recently published measurement
    pub fn latest(&self) -> Result<Measurement, ImuError> {
        self.snapshot.read()
    }

    /// Enable or disable fusion inputs from the next cycle on
    pub fn reconfigure(&self, enable_gyro: bool, enable_accel: bool, enable_compass: bool) {
        self.calibration
            .reconfigure(enable_gyro, enable_accel, enable_compass);
    }

    /// Change the fusion gain from the next cycle on
    pub fn set_slerp_power(&self, slerp_power: f32) -> Result<(), ImuError> {
        Ok(self.calibration.set_slerp_power(slerp_power)?)
    }

    pub fn calibration(&self) -> &CalibrationStore {
        &self.calibration
    }

    pub fn snapshot_reader(&self) -> SnapshotReader {
        self.snapshot.reader()
    }

    /// False once the worker thread has exited
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }

    /// Stop after the current cycle and take the context back
    ///
    /// Every event produced before the stop has been delivered when this
    /// returns.
    pub fn stop(mut self) -> Result<Imu<S>, ImuError> {
        self.stop.store(true, Ordering::Release);

        let engine = self
            .worker
            .take()
            .ok_or(ImuError::WorkerPanicked)?
            .join()
            .map_err(|_| ImuError::WorkerPanicked)?;

        // The worker owned the only sender, so the dispatcher drains and exits
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.join().map_err(|_| ImuError::WorkerPanicked)?;
        }

        Ok(Imu {
            engine,
            calibration: self.calibration.clone(),
            snapshot: self.snapshot.clone(),
        })
    }
}

impl<S> Drop for ContinuousHandle<S> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::ReplaySource;
    use crate::source::SourceError;
    use crate::types::RawSample;
    use nalgebra::Vector3;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    fn level(timestamp: u64) -> RawSample {
        RawSample::new(
            timestamp,
            Vector3::new(0.0, 0.0, 9.81),
            Vector3::zeros(),
            Vector3::new(1.0, 0.0, 0.0),
        )
    }

    #[test]
    fn test_invalid_profile_rejected() {
        let profile = CalibrationProfile {
            slerp_power: 2.0,
            ..Default::default()
        };
        let result = Imu::new(ReplaySource::from_samples([]), profile);
        assert!(matches!(result, Err(ImuError::Config(_))));
    }

    #[test]
    fn test_latest_before_first_cycle() {
        let source = ReplaySource::from_samples([level(0)]);
        let imu = Imu::new(source, CalibrationProfile::default()).unwrap();
        assert!(matches!(imu.latest(), Err(ImuError::NoDataYet)));
    }

    #[test]
    fn test_set_slerp_power_validates() {
        let imu = Imu::new(ReplaySource::from_samples([]), CalibrationProfile::default()).unwrap();
        assert!(matches!(imu.set_slerp_power(-0.1), Err(ImuError::Config(_))));
        assert!(imu.set_slerp_power(0.5).is_ok());
        assert_eq!(imu.calibration().profile().slerp_power, 0.5);
    }

    #[test]
    fn test_events_report_failures() {
        let source = ReplaySource::from_results([
            Ok(level(0)),
            Err(SourceError::Malformed("checksum".into())),
        ])
        .with_poll_interval(Duration::from_millis(1));
        let imu = Imu::new(source, CalibrationProfile::default()).unwrap();

        let (sender, receiver) = std_mpsc::channel();
        let handle = imu
            .start_continuous_with_events(move |event| {
                let _ = sender.send(event);
            })
            .unwrap();

        let first = receiver.recv_timeout(Duration::from_secs(1)).unwrap();
        let second = receiver.recv_timeout(Duration::from_secs(1)).unwrap();
        let imu = handle.stop().unwrap();

        assert!(matches!(first, CycleEvent::Published(_)));
        assert!(matches!(second, CycleEvent::Failed(ImuError::MalformedSample(_))));
        assert_eq!(imu.stats().completed, 1);
        assert!(imu.stats().failed >= 1);
    }

    #[test]
    fn test_stop_returns_reusable_context() {
        let imu = Imu::new(
            ReplaySource::from_samples([level(0), level(10_000), level(20_000)]),
            CalibrationProfile::default(),
        )
        .unwrap();

        let (sender, receiver) = std_mpsc::channel();
        let handle = imu
            .start_continuous(move |measurement| {
                let _ = sender.send(measurement.timestamp);
            })
            .unwrap();

        assert_eq!(receiver.recv_timeout(Duration::from_secs(1)).unwrap(), 0);
        let mut imu = handle.stop().unwrap();

        // The worker may have consumed the remaining samples before stopping
        match imu.read_once() {
            Ok(measurement) => assert!(measurement.timestamp > 0),
            Err(err) => assert!(matches!(err, ImuError::SensorUnavailable(_))),
        }
        assert!(imu.latest().is_ok());
    }
}
