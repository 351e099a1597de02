//! Unread badge and per-tab counts derived from the notification collection.

use tokio::sync::watch;

use crate::db::{NotificationCounts, NotificationRecord, NotificationStatus};

pub fn tally(records: &[NotificationRecord]) -> NotificationCounts {
    let mut counts = NotificationCounts {
        total: records.len(),
        ..NotificationCounts::default()
    };
    for record in records {
        match record.status {
            NotificationStatus::Unread => counts.unread += 1,
            NotificationStatus::Read => counts.read += 1,
            NotificationStatus::Trash => counts.trash += 1,
        }
    }
    counts
}

/// Observer handle over the counts the store publishes after each mutation.
#[derive(Clone)]
pub struct BadgeCounter {
    rx: watch::Receiver<NotificationCounts>,
}

impl BadgeCounter {
    pub fn new(rx: watch::Receiver<NotificationCounts>) -> Self {
        Self { rx }
    }

    pub fn unread(&self) -> usize {
        self.rx.borrow().unread
    }

    pub fn counts(&self) -> NotificationCounts {
        *self.rx.borrow()
    }

    /// Wait for the next change and return the new unread count,
    /// or `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<usize> {
        self.rx.changed().await.ok()?;
        let unread = self.rx.borrow_and_update().unread;
        Some(unread)
    }
}
