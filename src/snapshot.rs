//! Latest-measurement snapshot store
//!
//! Publishing swaps a whole [`Measurement`] into a watch channel; readers
//! copy it out. The channel lock is held only for the swap or the copy, so a
//! reader never waits on a fusion cycle and never sees a half-written value.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

use crate::error::ImuError;
use crate::types::Measurement;

/// Writer side of the snapshot, owned by the fusion worker
///
/// Clones share the same snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    sender: Arc<watch::Sender<Option<Measurement>>>,
    published: Arc<AtomicU64>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Replace the current snapshot
    pub fn publish(&self, measurement: Measurement) {
        self.sender.send_replace(Some(measurement));
        self.published.fetch_add(1, Ordering::Release);
    }

    /// Latest published measurement
    pub fn read(&self) -> Result<Measurement, ImuError> {
        (*self.sender.borrow()).ok_or(ImuError::NoDataYet)
    }

    /// Number of measurements published so far
    pub fn publish_count(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }

    /// New reader handle for a consumer
    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer handle onto the snapshot
///
/// Each clone tracks independently which snapshot it has already seen.
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    receiver: watch::Receiver<Option<Measurement>>,
}

impl SnapshotReader {
    /// Latest published measurement
    pub fn read(&self) -> Result<Measurement, ImuError> {
        (*self.receiver.borrow()).ok_or(ImuError::NoDataYet)
    }

    /// Wait for a measurement this reader has not seen yet
    ///
    /// Returns [`ImuError::SensorUnavailable`] once the store has been
    /// dropped.
    pub async fn changed(&mut self) -> Result<Measurement, ImuError> {
        loop {
            self.receiver
                .changed()
                .await
                .map_err(|_| ImuError::SensorUnavailable("snapshot store closed".into()))?;

            if let Some(measurement) = *self.receiver.borrow_and_update() {
                return Ok(measurement);
            }
        }
    }
}
