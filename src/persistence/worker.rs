//! Persistence Worker
//!
//! Bounded queue in front of an [`EventStore`]. `submit` never waits: when
//! the queue is full the record is dropped and counted. Saves run as detached
//! tasks, at most `max_in_flight` at a time, and their errors are only logged.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use super::EventStore;
use crate::events::EventRecord;

/// Configuration for the persistence worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Records waiting for a save slot
    pub queue_capacity: usize,
    /// Concurrent saves
    pub max_in_flight: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_in_flight: 8,
        }
    }
}

/// Counters exposed on the health endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PersistenceStats {
    /// Records accepted into the queue
    pub accepted: u64,
    /// Records dropped because the queue was full or closed
    pub dropped: u64,
    /// Records the store saved
    pub saved: u64,
    /// Records the store rejected
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    accepted: AtomicU64,
    dropped: AtomicU64,
    saved: AtomicU64,
    failed: AtomicU64,
}

/// Handle for submitting records
#[derive(Clone)]
pub struct PersistenceWorker {
    tx: mpsc::Sender<EventRecord>,
    counters: Arc<Counters>,
}

impl PersistenceWorker {
    /// Start the worker task
    pub fn spawn(store: Arc<dyn EventStore>, config: WorkerConfig) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let counters = Arc::new(Counters::default());
        let limit = Arc::new(Semaphore::new(config.max_in_flight.max(1)));

        let handle = tokio::spawn(run(store, rx, limit, Arc::clone(&counters)));

        (Self { tx, counters }, handle)
    }

    /// Queue a record for saving
    ///
    /// Returns false if the record was dropped.
    pub fn submit(&self, record: EventRecord) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => {
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(record)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(record = record.label(), "Persistence queue full, record dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(record)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::error!(record = record.label(), "Persistence worker stopped, record dropped");
                false
            }
        }
    }

    pub fn stats(&self) -> PersistenceStats {
        PersistenceStats {
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            saved: self.counters.saved.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

async fn run(
    store: Arc<dyn EventStore>,
    mut rx: mpsc::Receiver<EventRecord>,
    limit: Arc<Semaphore>,
    counters: Arc<Counters>,
) {
    while let Some(record) = rx.recv().await {
        let permit = match Arc::clone(&limit).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let store = Arc::clone(&store);
        let counters = Arc::clone(&counters);
        tokio::spawn(async move {
            let _permit = permit;
            match store.save(&record).await {
                Ok(()) => {
                    counters.saved.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(record = record.label(), error = %e, "Failed to persist event");
                }
            }
        });
    }

    tracing::debug!("Persistence worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{SensorKind, TelemetrySample};
    use crate::persistence::{PersistenceError, SqliteStore};
    use async_trait::async_trait;
    use std::time::Duration;

    fn sample_record(value: f64) -> EventRecord {
        EventRecord::Telemetry {
            sample: TelemetrySample::new(SensorKind::Temperature, value),
            severity: None,
        }
    }

    /// Store whose saves never complete
    struct StalledStore;

    #[async_trait]
    impl EventStore for StalledStore {
        async fn save(&self, _record: &EventRecord) -> Result<(), PersistenceError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    /// Store that always fails
    struct FailingStore;

    #[async_trait]
    impl EventStore for FailingStore {
        async fn save(&self, _record: &EventRecord) -> Result<(), PersistenceError> {
            Err(PersistenceError::Unavailable("database down".to_string()))
        }
    }

    async fn wait_for<F: Fn() -> bool>(check: F) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_records_are_saved() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (worker, _handle) =
            PersistenceWorker::spawn(Arc::new(store.clone()), WorkerConfig::default());

        assert!(worker.submit(sample_record(21.5)));
        assert!(worker.submit(sample_record(22.0)));

        wait_for(|| worker.stats().saved == 2).await;
        assert_eq!(store.count_sensor_readings(None).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_submit_does_not_wait_on_stalled_store() {
        let config = WorkerConfig {
            queue_capacity: 4,
            max_in_flight: 1,
        };
        let (worker, _handle) = PersistenceWorker::spawn(Arc::new(StalledStore), config);

        // One save in flight, four queued, the rest must be dropped immediately
        let accepted = (0..20)
            .filter(|i| worker.submit(sample_record(*i as f64)))
            .count();

        assert!(accepted <= 6);
        let stats = worker.stats();
        assert_eq!(stats.accepted + stats.dropped, 20);
        assert!(stats.dropped >= 14);
        assert_eq!(stats.saved, 0);
    }

    #[tokio::test]
    async fn test_store_errors_are_counted_not_propagated() {
        let (worker, _handle) =
            PersistenceWorker::spawn(Arc::new(FailingStore), WorkerConfig::default());

        assert!(worker.submit(sample_record(19.0)));
        wait_for(|| worker.stats().failed == 1).await;
        assert_eq!(worker.stats().saved, 0);
    }
}
