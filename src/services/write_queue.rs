//! Single-writer save path for the notification collection.
//!
//! Mutations hand over a full snapshot of the collection. Only the newest
//! snapshot is kept pending: if several arrive while a write is in flight,
//! the intermediate ones are never written. One background task performs the
//! writes, retrying a failing save with exponential backoff, and publishes the
//! outcome of each written generation so callers can await durability.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::config::PersistenceConfig;
use crate::db::NotificationRecord;
use crate::services::persistence::NotificationGateway;

/// Bounded exponential backoff for storage writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &PersistenceConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            initial_backoff: Duration::from_millis(cfg.initial_backoff_ms),
            max_backoff: Duration::from_millis(cfg.max_backoff_ms),
        }
    }

    /// Delay after the `failures`-th consecutive failure (1-based):
    /// `min(max_backoff, initial_backoff * 2^(failures - 1))`.
    pub fn delay_after(&self, failures: u32) -> Duration {
        let mut delay = self.initial_backoff;
        for _ in 1..failures {
            delay = delay.saturating_mul(2);
            if delay >= self.max_backoff {
                return self.max_backoff;
            }
        }
        delay.min(self.max_backoff)
    }
}

/// What happened to the durable copy after a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persistence {
    /// A snapshot at least as new as the mutation is stored.
    Saved,
    /// Nothing changed and no earlier write is outstanding, so nothing was written.
    Skipped,
    /// The in-memory change applied but the write failed after all retries.
    Deferred(String),
}

impl Persistence {
    pub fn is_durable(&self) -> bool {
        !matches!(self, Persistence::Deferred(_))
    }
}

#[derive(Debug, Clone)]
struct PendingWrite {
    generation: u64,
    records: Arc<Vec<NotificationRecord>>,
}

#[derive(Debug, Clone, Default)]
struct WriteReport {
    generation: u64,
    error: Option<String>,
}

pub struct WriteQueue {
    pending: watch::Sender<Option<PendingWrite>>,
    reports: watch::Receiver<WriteReport>,
    next_generation: AtomicU64,
}

impl WriteQueue {
    /// Start the writer task. It stops after flushing the newest pending
    /// snapshot once `shutdown` fires or the queue is dropped.
    pub fn spawn(
        gateway: Arc<NotificationGateway>,
        policy: RetryPolicy,
        shutdown: broadcast::Receiver<()>,
    ) -> (Self, JoinHandle<()>) {
        let (pending_tx, pending_rx) = watch::channel(None);
        let (reports_tx, reports_rx) = watch::channel(WriteReport::default());

        let handle = tokio::spawn(run_writer(
            gateway, policy, pending_rx, reports_tx, shutdown,
        ));

        let queue = Self {
            pending: pending_tx,
            reports: reports_rx,
            next_generation: AtomicU64::new(0),
        };
        (queue, handle)
    }

    /// Queue a snapshot, superseding any snapshot not yet picked up.
    /// Returns the generation to pass to [`WriteQueue::wait_for`].
    pub fn submit(&self, records: Vec<NotificationRecord>) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.pending.send_replace(Some(PendingWrite {
            generation,
            records: Arc::new(records),
        }));
        generation
    }

    /// Wait until `generation` or a newer snapshot has been written (or given up on).
    pub async fn wait_for(&self, generation: u64) -> Persistence {
        let mut reports = self.reports.clone();
        loop {
            let done = settled(&reports.borrow_and_update(), generation);
            if let Some(done) = done {
                return done;
            }
            if reports.changed().await.is_err() {
                return settled(&reports.borrow(), generation).unwrap_or_else(|| {
                    Persistence::Deferred("write queue is not running".to_string())
                });
            }
        }
    }

    /// True when the most recent write attempt failed, meaning storage lags memory.
    pub fn is_dirty(&self) -> bool {
        self.reports.borrow().error.is_some()
    }
}

fn settled(report: &WriteReport, generation: u64) -> Option<Persistence> {
    if report.generation < generation {
        return None;
    }
    Some(match &report.error {
        None => Persistence::Saved,
        Some(e) => Persistence::Deferred(e.clone()),
    })
}

async fn run_writer(
    gateway: Arc<NotificationGateway>,
    policy: RetryPolicy,
    mut pending: watch::Receiver<Option<PendingWrite>>,
    reports: watch::Sender<WriteReport>,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!(
        "Notification write queue started (key '{}', max_attempts={})",
        gateway.key(),
        policy.max_attempts
    );
    let mut last_written = 0u64;

    loop {
        tokio::select! {
            changed = pending.changed() => {
                if changed.is_err() {
                    flush_remaining(&gateway, policy, &mut pending, &reports, last_written).await;
                    tracing::info!("Notification write queue closed");
                    break;
                }
                let job = pending.borrow_and_update().clone();
                if let Some(job) = job {
                    last_written = write_snapshot(&gateway, policy, job, &mut pending, &reports).await;
                }
            }
            _ = shutdown.recv() => {
                flush_remaining(&gateway, policy, &mut pending, &reports, last_written).await;
                tracing::info!("Notification write queue shutting down");
                break;
            }
        }
    }
}

async fn flush_remaining(
    gateway: &NotificationGateway,
    policy: RetryPolicy,
    pending: &mut watch::Receiver<Option<PendingWrite>>,
    reports: &watch::Sender<WriteReport>,
    last_written: u64,
) {
    let job = pending.borrow_and_update().clone();
    if let Some(job) = job.filter(|j| j.generation > last_written) {
        tracing::info!(
            "Flushing pending notification snapshot (generation {})",
            job.generation
        );
        write_snapshot(gateway, policy, job, pending, reports).await;
    }
}

/// Write `job`, switching to a newer pending snapshot between retries.
/// Returns the generation that was finally written or abandoned.
async fn write_snapshot(
    gateway: &NotificationGateway,
    policy: RetryPolicy,
    mut job: PendingWrite,
    pending: &mut watch::Receiver<Option<PendingWrite>>,
    reports: &watch::Sender<WriteReport>,
) -> u64 {
    let mut failures = 0u32;

    let error = loop {
        match gateway.save(&job.records).await {
            Ok(()) => break None,
            Err(e) => {
                failures += 1;
                if failures >= policy.max_attempts {
                    tracing::error!(
                        "Giving up on notification snapshot {} after {} attempt(s): {}",
                        job.generation,
                        failures,
                        e
                    );
                    break Some(e.to_string());
                }

                let delay = policy.delay_after(failures);
                tracing::warn!(
                    "Saving notification snapshot {} failed (attempt {}/{}), retrying in {:?}: {}",
                    job.generation,
                    failures,
                    policy.max_attempts,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;

                let newer = pending.borrow_and_update().clone();
                if let Some(newer) = newer.filter(|n| n.generation > job.generation) {
                    tracing::debug!(
                        "Retrying with newer snapshot {} instead of {}",
                        newer.generation,
                        job.generation
                    );
                    job = newer;
                }
            }
        }
    };

    reports.send_replace(WriteReport {
        generation: job.generation,
        error,
    });
    job.generation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::kv_store::test_support::FlakyKeyValueStore;
    use crate::db::{KeyValueStore, MemoryKeyValueStore, NotificationStatus};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    fn record(id: &str) -> NotificationRecord {
        NotificationRecord {
            id: id.to_string(),
            title: "t".to_string(),
            message: "m".to_string(),
            time: "2024-02-02T12:00:00Z".parse().unwrap(),
            icon: "i".to_string(),
            color: "c".to_string(),
            status: NotificationStatus::Unread,
            details: None,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1000),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(4), Duration::from_millis(800));
        assert_eq!(policy.delay_after(5), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(40), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn saved_snapshot_is_reported() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let gateway = Arc::new(NotificationGateway::new(kv.clone(), "notifications"));
        let (_tx, rx) = broadcast::channel(1);
        let (queue, _handle) = WriteQueue::spawn(gateway.clone(), fast_policy(3), rx);

        let generation = queue.submit(vec![record("a")]);
        assert_eq!(queue.wait_for(generation).await, Persistence::Saved);
        assert!(!queue.is_dirty());
        assert_eq!(gateway.load().await.unwrap().unwrap(), vec![record("a")]);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let kv = Arc::new(FlakyKeyValueStore::failing(2));
        let gateway = Arc::new(NotificationGateway::new(kv.clone(), "notifications"));
        let (_tx, rx) = broadcast::channel(1);
        let (queue, _handle) = WriteQueue::spawn(gateway, fast_policy(3), rx);

        let generation = queue.submit(vec![record("a")]);
        assert_eq!(queue.wait_for(generation).await, Persistence::Saved);
        assert_eq!(kv.set_calls(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_defer_and_mark_dirty() {
        let kv = Arc::new(FlakyKeyValueStore::failing(10));
        let gateway = Arc::new(NotificationGateway::new(kv.clone(), "notifications"));
        let (_tx, rx) = broadcast::channel(1);
        let (queue, _handle) = WriteQueue::spawn(gateway, fast_policy(2), rx);

        let generation = queue.submit(vec![record("a")]);
        match queue.wait_for(generation).await {
            Persistence::Deferred(reason) => assert!(reason.contains("disk unavailable")),
            other => panic!("expected Deferred, got: {:?}", other),
        }
        assert!(queue.is_dirty());
        assert_eq!(kv.set_calls(), 2);
        assert!(kv.get("notifications").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn later_snapshot_supersedes_earlier_waiters() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let gateway = Arc::new(NotificationGateway::new(kv.clone(), "notifications"));
        let (_tx, rx) = broadcast::channel(1);
        let (queue, _handle) = WriteQueue::spawn(gateway.clone(), fast_policy(3), rx);

        let first = queue.submit(vec![record("a")]);
        let second = queue.submit(vec![record("b"), record("a")]);

        // The first waiter is satisfied by whichever snapshot lands, and the
        // stored blob always ends at the newest one.
        assert!(queue.wait_for(first).await.is_durable());
        assert_eq!(queue.wait_for(second).await, Persistence::Saved);
        let stored = gateway.load().await.unwrap().unwrap();
        assert_eq!(stored, vec![record("b"), record("a")]);
    }

    #[tokio::test]
    async fn shutdown_flushes_pending_snapshot() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let gateway = Arc::new(NotificationGateway::new(kv.clone(), "notifications"));
        let (tx, rx) = broadcast::channel(1);
        let (queue, handle) = WriteQueue::spawn(gateway.clone(), fast_policy(3), rx);

        queue.submit(vec![record("a")]);
        tx.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(gateway.load().await.unwrap().unwrap(), vec![record("a")]);
        // Nothing is running any more, so new writes cannot become durable.
        let generation = queue.submit(vec![]);
        assert!(!queue.wait_for(generation).await.is_durable());
    }
}
