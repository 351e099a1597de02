//! Persistence gateway for the notification collection.
//!
//! The whole collection is stored as one JSON array under a single key, so
//! every save replaces the previous blob and there are no partial writes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::db::{KeyValueStore, NotificationRecord};
use crate::error::{AppError, AppResult};
use crate::services::write_queue::RetryPolicy;

pub struct NotificationGateway {
    kv: Arc<dyn KeyValueStore>,
    key: String,
    /// Set when the startup load gave up; whatever is stored has not been
    /// seen yet and must be backed up before the first overwrite.
    unseen_blob: AtomicBool,
}

impl NotificationGateway {
    pub fn new(kv: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            kv,
            key: key.into(),
            unseen_blob: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the stored collection.
    ///
    /// Returns `Ok(None)` when nothing has been saved yet and
    /// `AppError::CorruptedState` when the blob is not a notification array.
    pub async fn load(&self) -> AppResult<Option<Vec<NotificationRecord>>> {
        let raw = self
            .kv
            .get(&self.key)
            .await
            .map_err(|e| self.storage_error(e))?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        serde_json::from_str::<Vec<NotificationRecord>>(&raw)
            .map(Some)
            .map_err(|e| AppError::CorruptedState(format!("key '{}': {}", self.key, e)))
    }

    /// Load the stored collection, treating a missing or corrupted blob as an
    /// empty collection.
    ///
    /// Storage failures are retried with `policy`. If every attempt fails the
    /// collection starts empty, and the stored blob is copied to
    /// `<key>.unloaded` before the first save replaces it.
    pub async fn load_or_empty(&self, policy: RetryPolicy) -> Vec<NotificationRecord> {
        let mut failures = 0u32;

        loop {
            match self.load().await {
                Ok(Some(records)) => {
                    tracing::info!(
                        "Loaded {} notification(s) from key '{}'",
                        records.len(),
                        self.key
                    );
                    return records;
                }
                Ok(None) => {
                    tracing::info!("No stored notifications under key '{}'", self.key);
                    return Vec::new();
                }
                Err(AppError::CorruptedState(msg)) => {
                    tracing::error!(
                        "Stored notifications are corrupted, starting empty: {}",
                        msg
                    );
                    if let Err(e) = self.quarantine().await {
                        tracing::warn!("Failed to move corrupted notifications aside: {}", e);
                    }
                    return Vec::new();
                }
                Err(e) => {
                    failures += 1;
                    if failures >= policy.max_attempts {
                        tracing::error!(
                            "Failed to load notifications from key '{}' after {} attempt(s), starting empty: {}",
                            self.key,
                            failures,
                            e
                        );
                        self.unseen_blob.store(true, Ordering::SeqCst);
                        return Vec::new();
                    }

                    let delay = policy.delay_after(failures);
                    tracing::warn!(
                        "Loading notifications failed (attempt {}/{}), retrying in {:?}: {}",
                        failures,
                        policy.max_attempts,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Serialize and store the entire collection, replacing the previous blob.
    pub async fn save(&self, records: &[NotificationRecord]) -> AppResult<()> {
        let raw = serde_json::to_string(records)?;
        if self.unseen_blob.load(Ordering::SeqCst) {
            self.back_up_unseen().await?;
        }
        self.kv
            .set(&self.key, &raw)
            .await
            .map_err(|e| self.storage_error(e))?;
        tracing::debug!(
            "Saved {} notification(s) under key '{}'",
            records.len(),
            self.key
        );
        Ok(())
    }

    pub async fn clear(&self) -> AppResult<()> {
        self.kv
            .remove(&self.key)
            .await
            .map_err(|e| self.storage_error(e))
    }

    /// Copy an unreadable blob to `<key>.corrupted`, then clear the key.
    async fn quarantine(&self) -> AppResult<()> {
        if let Some(raw) = self.kv.get(&self.key).await? {
            let backup = format!("{}.corrupted", self.key);
            self.kv.set(&backup, &raw).await?;
            tracing::warn!("Moved corrupted notifications to key '{}'", backup);
        }
        self.clear().await
    }

    /// Copy the blob the startup load never read to `<key>.unloaded`.
    /// Fails, and so blocks the save, while storage is still unreadable.
    async fn back_up_unseen(&self) -> AppResult<()> {
        let existing = self
            .kv
            .get(&self.key)
            .await
            .map_err(|e| self.storage_error(e))?;
        if let Some(raw) = existing {
            let backup = format!("{}.unloaded", self.key);
            self.kv
                .set(&backup, &raw)
                .await
                .map_err(|e| self.storage_error(e))?;
            tracing::warn!(
                "Copied notifications that were never loaded to key '{}'",
                backup
            );
        }
        self.unseen_blob.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn storage_error(&self, e: AppError) -> AppError {
        match e {
            AppError::Storage(_) => e,
            other => AppError::Storage(format!("key '{}': {}", self.key, other)),
        }
    }
}
