use std::sync::Arc;

use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;

use crate::db::{
    NewNotification, NotificationCounts, NotificationFilter, NotificationRecord,
    NotificationStatus,
};
use crate::error::{AppError, AppResult};
use crate::services::badge::{self, BadgeCounter};
use crate::services::persistence::NotificationGateway;
use crate::services::write_queue::{Persistence, RetryPolicy, WriteQueue};

const MAX_TEXT_LEN: usize = 4096;

/// Result of a store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOutcome {
    /// Records added, changed or removed.
    pub affected: usize,
    pub persistence: Persistence,
}

/// Owner of the notification collection and its only writer.
///
/// Every mutation updates the in-memory list, republishes the derived counts
/// and hands the whole collection to the write queue. The returned future
/// resolves once that snapshot (or a newer one) has been written or given up on.
pub struct NotificationStore {
    records: Mutex<Vec<NotificationRecord>>,
    writer: WriteQueue,
    counts: watch::Sender<NotificationCounts>,
}

impl NotificationStore {
    pub fn new(initial: Vec<NotificationRecord>, writer: WriteQueue) -> Self {
        let (counts, _) = watch::channel(badge::tally(&initial));
        Self {
            records: Mutex::new(initial),
            writer,
            counts,
        }
    }

    /// Load the persisted collection (empty if missing or corrupted) and start
    /// the background writer.
    pub async fn open(
        gateway: Arc<NotificationGateway>,
        policy: RetryPolicy,
        shutdown: broadcast::Receiver<()>,
    ) -> (Self, JoinHandle<()>) {
        let initial = gateway.load_or_empty(policy).await;
        let (writer, handle) = WriteQueue::spawn(gateway, policy, shutdown);
        (Self::new(initial, writer), handle)
    }

    // ------------------------------------------------------------------------
    // Read side
    // ------------------------------------------------------------------------

    /// Records matching `filter`, most recent first.
    pub async fn list(&self, filter: NotificationFilter) -> Vec<NotificationRecord> {
        self.records
            .lock()
            .await
            .iter()
            .filter(|r| filter.matches(r.status))
            .cloned()
            .collect()
    }

    pub async fn get(&self, id: &str) -> Option<NotificationRecord> {
        self.records
            .lock()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    pub async fn status_of(&self, id: &str) -> Option<NotificationStatus> {
        self.records
            .lock()
            .await
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.status)
    }

    pub fn counts(&self) -> NotificationCounts {
        *self.counts.borrow()
    }

    pub fn unread_count(&self) -> usize {
        self.counts.borrow().unread
    }

    pub fn badge(&self) -> BadgeCounter {
        BadgeCounter::new(self.counts.subscribe())
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Prepend a producer's record. Status defaults to `unread`.
    ///
    /// Returns the record as inserted, so callers never need a second lookup.
    pub async fn add(
        &self,
        new: NewNotification,
    ) -> AppResult<(NotificationRecord, MutationOutcome)> {
        validate_new(&new)?;
        let record = new.into_record();

        let mut records = self.records.lock().await;
        if records.iter().any(|r| r.id == record.id) {
            return Err(AppError::Conflict(format!(
                "notification {} already exists",
                record.id
            )));
        }
        tracing::info!(
            "Adding notification {} ({}) with status {}",
            record.id,
            record.title,
            record.status
        );
        records.insert(0, record.clone());
        let ticket = self.publish("add", &records, 1);
        drop(records);

        Ok((record, self.settle("add", 1, ticket).await))
    }

    /// Unread → read. Trashed, already-read and unknown ids are left alone.
    pub async fn mark_as_read(&self, id: &str) -> MutationOutcome {
        self.mutate("mark_as_read", |records| {
            transition(records, |r| r.id == id && r.is_unread(), NotificationStatus::Read)
        })
        .await
    }

    /// Every unread record → read, written once for the whole batch.
    pub async fn mark_all_as_read(&self) -> MutationOutcome {
        self.mutate("mark_all_as_read", |records| {
            transition(records, |r| r.is_unread(), NotificationStatus::Read)
        })
        .await
    }

    /// Batch unread → read for the given ids, written once.
    pub async fn mark_many_as_read(&self, ids: &[String]) -> MutationOutcome {
        self.mutate("mark_many_as_read", |records| {
            transition(
                records,
                |r| r.is_unread() && ids.contains(&r.id),
                NotificationStatus::Read,
            )
        })
        .await
    }

    /// Move an unread or read record to the trash. Idempotent.
    pub async fn move_to_trash(&self, id: &str) -> MutationOutcome {
        self.mutate("move_to_trash", |records| {
            transition(
                records,
                |r| r.id == id && !r.is_trashed(),
                NotificationStatus::Trash,
            )
        })
        .await
    }

    /// Trash → read. A restored record never counts as unread again.
    pub async fn restore_from_trash(&self, id: &str) -> MutationOutcome {
        self.mutate("restore_from_trash", |records| {
            transition(records, |r| r.id == id && r.is_trashed(), NotificationStatus::Read)
        })
        .await
    }

    pub async fn restore_all_from_trash(&self) -> MutationOutcome {
        self.mutate("restore_all_from_trash", |records| {
            transition(records, |r| r.is_trashed(), NotificationStatus::Read)
        })
        .await
    }

    /// Remove one record from the collection whatever its status.
    pub async fn permanently_delete(&self, id: &str) -> MutationOutcome {
        self.mutate("permanently_delete", |records| {
            remove_where(records, |r| r.id == id)
        })
        .await
    }

    /// Remove every trashed record.
    pub async fn empty_trash(&self) -> MutationOutcome {
        self.mutate("empty_trash", |records| {
            remove_where(records, |r| r.is_trashed())
        })
        .await
    }

    async fn mutate<F>(&self, op: &'static str, f: F) -> MutationOutcome
    where
        F: FnOnce(&mut Vec<NotificationRecord>) -> usize,
    {
        let mut records = self.records.lock().await;
        let affected = f(&mut records);
        let ticket = self.publish(op, &records, affected);
        drop(records);

        self.settle(op, affected, ticket).await
    }

    /// Republish counts and queue a snapshot. Must be called with the records
    /// lock held so snapshots are queued in mutation order.
    fn publish(
        &self,
        op: &'static str,
        records: &[NotificationRecord],
        affected: usize,
    ) -> Option<u64> {
        let counts = badge::tally(records);
        self.counts.send_if_modified(|current| {
            if *current == counts {
                false
            } else {
                *current = counts;
                true
            }
        });

        if affected == 0 && !self.writer.is_dirty() {
            tracing::debug!("{}: nothing changed, skipping write", op);
            return None;
        }

        let generation = self.writer.submit(records.to_vec());
        tracing::debug!(
            "{}: {} record(s) affected, unread={}, queued snapshot {}",
            op,
            affected,
            counts.unread,
            generation
        );
        Some(generation)
    }

    async fn settle(&self, op: &'static str, affected: usize, ticket: Option<u64>) -> MutationOutcome {
        let persistence = match ticket {
            Some(generation) => self.writer.wait_for(generation).await,
            None => Persistence::Skipped,
        };

        if let Persistence::Deferred(ref reason) = persistence {
            tracing::warn!(
                "{}: change kept in memory but not persisted: {}",
                op,
                reason
            );
        }

        MutationOutcome {
            affected,
            persistence,
        }
    }
}

fn transition<P>(records: &mut [NotificationRecord], pred: P, to: NotificationStatus) -> usize
where
    P: Fn(&NotificationRecord) -> bool,
{
    let mut changed = 0;
    for record in records.iter_mut().filter(|r| pred(r)) {
        record.status = to;
        changed += 1;
    }
    changed
}

fn remove_where<P>(records: &mut Vec<NotificationRecord>, pred: P) -> usize
where
    P: Fn(&NotificationRecord) -> bool,
{
    let before = records.len();
    records.retain(|r| !pred(r));
    before - records.len()
}

fn validate_new(new: &NewNotification) -> AppResult<()> {
    if new.id.trim().is_empty() {
        return Err(AppError::Validation(
            "notification id cannot be empty".to_string(),
        ));
    }
    if new.title.trim().is_empty() {
        return Err(AppError::Validation(
            "notification title cannot be empty".to_string(),
        ));
    }

    let fields = [
        ("title", Some(new.title.as_str())),
        ("message", Some(new.message.as_str())),
        ("details", new.details.as_deref()),
    ];
    for (name, value) in fields {
        if value
            .map(|v| v.chars().count() > MAX_TEXT_LEN)
            .unwrap_or(false)
        {
            return Err(AppError::Validation(format!(
                "notification {} cannot exceed {} characters",
                name, MAX_TEXT_LEN
            )));
        }
    }

    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::db::repository::kv_store::test_support::FlakyKeyValueStore;
    use crate::db::{KeyValueStore, MemoryKeyValueStore};

    async fn ids(store: &NotificationStore, filter: NotificationFilter) -> Vec<String> {
        store.list(filter).await.into_iter().map(|r| r.id).collect()
    }

    async fn assert_badge_matches(store: &NotificationStore) {
        let unread = store.list(NotificationFilter::Unread).await.len();
        assert_eq!(store.unread_count(), unread);
    }

    #[tokio::test]
    async fn newest_record_comes_first() {
        let h = harness().await;
        h.store.add(new_notification("r1")).await.unwrap();
        h.store.add(new_notification("r2")).await.unwrap();

        assert_eq!(ids(&h.store, NotificationFilter::All).await, vec!["r2", "r1"]);
        let stored: Vec<String> = h
            .gateway
            .load()
            .await
            .unwrap()
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(stored, vec!["r2", "r1"]);
    }

    #[tokio::test]
    async fn add_rejects_duplicates_and_blank_ids() {
        let h = harness().await;
        h.store.add(new_notification("r1")).await.unwrap();

        assert!(matches!(
            h.store.add(new_notification("r1")).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            h.store.add(new_notification("  ")).await,
            Err(AppError::Validation(_))
        ));
        assert_eq!(h.store.counts().total, 1);
    }

    #[tokio::test]
    async fn add_returns_inserted_record_even_if_deleted_right_after() {
        let h = harness().await;
        let (record, out) = h.store.add(new_notification("r1")).await.unwrap();
        assert_eq!(out.affected, 1);
        h.store.permanently_delete("r1").await;

        assert_eq!(record.id, "r1");
        assert_eq!(record.status, NotificationStatus::Unread);
        assert!(h.store.get("r1").await.is_none());
    }

    #[tokio::test]
    async fn text_limit_counts_characters_not_bytes() {
        let h = harness().await;
        let mut new = new_notification("ru");
        // two bytes per character in UTF-8
        new.message = "я".repeat(MAX_TEXT_LEN);
        assert!(h.store.add(new).await.is_ok());

        let mut too_long = new_notification("ru2");
        too_long.message = "я".repeat(MAX_TEXT_LEN + 1);
        assert!(matches!(
            h.store.add(too_long).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn add_honours_explicit_status() {
        let h = harness().await;
        let mut new = new_notification("r1");
        new.status = Some(NotificationStatus::Read);
        h.store.add(new).await.unwrap();
        assert_eq!(h.store.unread_count(), 0);
        assert_eq!(h.store.status_of("r1").await, Some(NotificationStatus::Read));
    }

    #[tokio::test]
    async fn mark_as_read_skips_trash_and_unknown_ids() {
        let h = harness().await;
        h.store.add(new_notification("r1")).await.unwrap();
        h.store.add(new_notification("r2")).await.unwrap();
        h.store.move_to_trash("r2").await;

        let out = h.store.mark_as_read("r1").await;
        assert_eq!(out.affected, 1);
        assert_eq!(out.persistence, Persistence::Saved);

        let out = h.store.mark_as_read("r2").await;
        assert_eq!(out.affected, 0);
        assert_eq!(h.store.status_of("r2").await, Some(NotificationStatus::Trash));

        let out = h.store.mark_as_read("missing").await;
        assert_eq!(out.affected, 0);
        assert_eq!(out.persistence, Persistence::Skipped);
        assert_badge_matches(&h.store).await;
    }

    #[tokio::test]
    async fn mark_all_as_read_is_idempotent() {
        let h = harness().await;
        for id in ["a", "b", "c"] {
            h.store.add(new_notification(id)).await.unwrap();
        }
        h.store.move_to_trash("b").await;

        let first = h.store.mark_all_as_read().await;
        assert_eq!(first.affected, 2);
        let blob_after_first = h.gateway.load().await.unwrap();

        let second = h.store.mark_all_as_read().await;
        assert_eq!(second.affected, 0);
        assert_eq!(second.persistence, Persistence::Skipped);
        assert_eq!(h.gateway.load().await.unwrap(), blob_after_first);
        assert_eq!(h.store.status_of("b").await, Some(NotificationStatus::Trash));
        assert_eq!(h.store.unread_count(), 0);
    }

    #[tokio::test]
    async fn move_to_trash_twice_equals_once() {
        let h = harness().await;
        h.store.add(new_notification("r1")).await.unwrap();
        h.store.mark_as_read("r1").await;

        h.store.move_to_trash("r1").await;
        let once = h.store.list(NotificationFilter::Trash).await;
        let again = h.store.move_to_trash("r1").await;
        assert_eq!(again.affected, 0);
        assert_eq!(h.store.list(NotificationFilter::Trash).await, once);
        // isRead is derived, so a trashed record no longer reports read
        assert!(!once[0].is_read());
    }

    #[tokio::test]
    async fn restore_never_resurrects_unread() {
        let h = harness().await;
        h.store.add(new_notification("was_unread")).await.unwrap();
        h.store.add(new_notification("was_read")).await.unwrap();
        h.store.mark_as_read("was_read").await;
        h.store.move_to_trash("was_unread").await;
        h.store.move_to_trash("was_read").await;
        assert_eq!(h.store.unread_count(), 0);

        h.store.restore_from_trash("was_unread").await;
        assert_eq!(
            h.store.status_of("was_unread").await,
            Some(NotificationStatus::Read)
        );
        let out = h.store.restore_all_from_trash().await;
        assert_eq!(out.affected, 1);
        assert_eq!(h.store.status_of("was_read").await, Some(NotificationStatus::Read));
        assert_eq!(h.store.unread_count(), 0);
    }

    #[tokio::test]
    async fn restore_only_touches_trashed_records() {
        let h = harness().await;
        h.store.add(new_notification("r1")).await.unwrap();
        let out = h.store.restore_from_trash("r1").await;
        assert_eq!(out.affected, 0);
        assert_eq!(h.store.status_of("r1").await, Some(NotificationStatus::Unread));
    }

    #[tokio::test]
    async fn trash_then_empty_then_restore_missing() {
        let h = harness().await;
        h.store.add(new_notification("r1")).await.unwrap();
        h.store.add(new_notification("r2")).await.unwrap();

        h.store.move_to_trash("r1").await;
        assert_eq!(h.store.status_of("r1").await, Some(NotificationStatus::Trash));

        let out = h.store.empty_trash().await;
        assert_eq!(out.affected, 1);
        assert!(h.store.get("r1").await.is_none());
        assert_eq!(ids(&h.store, NotificationFilter::All).await, vec!["r2"]);

        let out = h.store.restore_from_trash("r1").await;
        assert_eq!(out.affected, 0);
        assert_eq!(h.store.counts().total, 1);
    }

    #[tokio::test]
    async fn permanently_delete_removes_any_status() {
        let h = harness().await;
        h.store.add(new_notification("r1")).await.unwrap();
        assert_eq!(h.store.permanently_delete("r1").await.affected, 1);
        assert_eq!(h.store.permanently_delete("r1").await.affected, 0);
        assert!(h.gateway.load().await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn badge_tracks_every_mutation() {
        let h = harness().await;
        let mut badge = h.store.badge();

        h.store.add(new_notification("a")).await.unwrap();
        assert_eq!(badge.changed().await, Some(1));
        h.store.add(new_notification("b")).await.unwrap();
        assert_badge_matches(&h.store).await;
        h.store.move_to_trash("a").await;
        assert_badge_matches(&h.store).await;
        h.store.restore_from_trash("a").await;
        assert_badge_matches(&h.store).await;
        h.store.mark_all_as_read().await;
        assert_badge_matches(&h.store).await;
        h.store.empty_trash().await;
        assert_badge_matches(&h.store).await;
        assert_eq!(badge.unread(), 0);
    }

    #[tokio::test]
    async fn reopening_restores_persisted_state() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        let h = harness_with(kv.clone()).await;
        h.store.add(new_notification("r1")).await.unwrap();
        h.store.add(new_notification("r2")).await.unwrap();
        h.store.move_to_trash("r1").await;
        let before = h.store.list(NotificationFilter::Trash).await;

        let reopened = harness_with(kv).await;
        assert_eq!(reopened.store.list(NotificationFilter::Trash).await, before);
        assert_eq!(reopened.store.unread_count(), 1);
    }

    #[tokio::test]
    async fn corrupted_blob_opens_empty() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        kv.set("notifications", "[{broken").await.unwrap();

        let h = harness_with(kv.clone()).await;
        assert_eq!(h.store.counts(), NotificationCounts::default());
        assert!(kv.get("notifications.corrupted").await.unwrap().is_some());
        h.store.add(new_notification("r1")).await.unwrap();
        assert_eq!(h.gateway.load().await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn startup_read_failure_does_not_wipe_stored_records() {
        let kv = Arc::new(FlakyKeyValueStore::failing_reads(1));
        let seed = NotificationGateway::new(kv.clone(), "notifications");
        let seeded: Vec<NotificationRecord> = ["c", "b", "a"]
            .into_iter()
            .map(|id| new_notification(id).into_record())
            .collect();
        seed.save(&seeded).await.unwrap();

        let h = harness_with(kv).await;
        h.store.add(new_notification("new")).await.unwrap();

        let stored: Vec<String> = h
            .gateway
            .load()
            .await
            .unwrap()
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(stored, vec!["new", "c", "b", "a"]);
    }

    #[tokio::test]
    async fn failed_write_keeps_memory_and_retries_on_next_mutation() {
        // fast_policy allows 2 attempts per snapshot; the first 2 writes fail
        let kv = Arc::new(FlakyKeyValueStore::failing(2));
        let h = harness_with(kv.clone()).await;

        let (_, out) = h.store.add(new_notification("r1")).await.unwrap();
        assert!(matches!(out.persistence, Persistence::Deferred(_)));
        assert_eq!(h.store.counts().total, 1);
        assert!(h.gateway.load().await.unwrap().is_none());

        // A no-op still re-sends the collection because storage is behind.
        let out = h.store.mark_as_read("missing").await;
        assert_eq!(out.affected, 0);
        assert_eq!(out.persistence, Persistence::Saved);
        assert_eq!(h.gateway.load().await.unwrap().unwrap().len(), 1);
    }
}
