//! Deferred "viewed → read" transitions.
//!
//! A notifications screen stages the rows the user looked at and commits them
//! when it loses focus, so the list and badge stay put while the screen is
//! open. Staged ids live only in memory.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::services::notifications::{MutationOutcome, NotificationStore};
use crate::services::write_queue::Persistence;

pub struct ViewTracker {
    store: Arc<NotificationStore>,
    staged: Mutex<BTreeSet<String>>,
}

impl ViewTracker {
    pub fn new(store: Arc<NotificationStore>) -> Self {
        Self {
            store,
            staged: Mutex::new(BTreeSet::new()),
        }
    }

    /// Stage `id` if it is currently unread. Returns whether it is staged.
    pub async fn mark_as_viewed(&self, id: &str) -> bool {
        if !self.is_unread(id).await {
            tracing::debug!("Not staging {}: not an unread notification", id);
            return false;
        }
        self.staged.lock().await.insert(id.to_string());
        true
    }

    /// Staged ids that are still unread.
    pub async fn staged(&self) -> Vec<String> {
        let mut staged = self.staged.lock().await;
        let mut still_unread = BTreeSet::new();
        for id in staged.iter() {
            if self.is_unread(id).await {
                still_unread.insert(id.clone());
            }
        }
        *staged = still_unread;
        staged.iter().cloned().collect()
    }

    /// Turn every staged id that is still unread into read with a single
    /// write, then clear the staged set. Safe to call repeatedly.
    pub async fn commit(&self) -> MutationOutcome {
        let ids: Vec<String> = std::mem::take(&mut *self.staged.lock().await)
            .into_iter()
            .collect();

        if ids.is_empty() {
            return MutationOutcome {
                affected: 0,
                persistence: Persistence::Skipped,
            };
        }

        let outcome = self.store.mark_many_as_read(&ids).await;
        tracing::info!(
            "Committed {} viewed notification(s) as read ({} staged)",
            outcome.affected,
            ids.len()
        );
        outcome
    }

    /// Drop staged ids without touching their status.
    pub async fn discard(&self) -> usize {
        let mut staged = self.staged.lock().await;
        let dropped = staged.len();
        staged.clear();
        dropped
    }

    async fn is_unread(&self, id: &str) -> bool {
        self.store
            .status_of(id)
            .await
            .map(|s| s == crate::db::NotificationStatus::Unread)
            .unwrap_or(false)
    }
}
