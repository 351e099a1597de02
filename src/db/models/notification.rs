use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::NotificationStatus;

/// One user-facing event shown in the notifications screen.
///
/// The persisted and wire shape carries a legacy `isRead` flag next to
/// `status`. It is derived from `status` when serializing and only consulted
/// when loading records written before `status` existed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredNotification", into = "StoredNotification")]
pub struct NotificationRecord {
    pub id: String,
    pub title: String,
    pub message: String,
    pub time: DateTime<Utc>,
    pub icon: String,
    pub color: String,
    pub status: NotificationStatus,
    pub details: Option<String>,
}

impl NotificationRecord {
    pub fn is_read(&self) -> bool {
        self.status == NotificationStatus::Read
    }

    pub fn is_unread(&self) -> bool {
        self.status == NotificationStatus::Unread
    }

    pub fn is_trashed(&self) -> bool {
        self.status == NotificationStatus::Trash
    }
}

/// Serialized form of a notification record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredNotification {
    id: String,
    title: String,
    message: String,
    time: DateTime<Utc>,
    icon: String,
    color: String,
    #[serde(default)]
    status: Option<NotificationStatus>,
    #[serde(default)]
    is_read: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl From<StoredNotification> for NotificationRecord {
    fn from(stored: StoredNotification) -> Self {
        let status = stored.status.unwrap_or(match stored.is_read {
            Some(true) => NotificationStatus::Read,
            _ => NotificationStatus::Unread,
        });

        NotificationRecord {
            id: stored.id,
            title: stored.title,
            message: stored.message,
            time: stored.time,
            icon: stored.icon,
            color: stored.color,
            status,
            details: stored.details,
        }
    }
}

impl From<NotificationRecord> for StoredNotification {
    fn from(record: NotificationRecord) -> Self {
        StoredNotification {
            is_read: Some(record.is_read()),
            status: Some(record.status),
            id: record.id,
            title: record.title,
            message: record.message,
            time: record.time,
            icon: record.icon,
            color: record.color,
            details: record.details,
        }
    }
}

/// Data a producer supplies to append a notification.
///
/// `status` may be omitted and defaults to `unread`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub id: String,
    pub title: String,
    pub message: String,
    pub time: DateTime<Utc>,
    pub icon: String,
    pub color: String,
    #[serde(default)]
    pub status: Option<NotificationStatus>,
    #[serde(default)]
    pub details: Option<String>,
}

impl NewNotification {
    pub fn into_record(self) -> NotificationRecord {
        NotificationRecord {
            id: self.id,
            title: self.title,
            message: self.message,
            time: self.time,
            icon: self.icon,
            color: self.color,
            status: self.status.unwrap_or_default(),
            details: self.details,
        }
    }
}

/// Per-status totals used for tab badges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationCounts {
    pub unread: usize,
    pub read: usize,
    pub trash: usize,
    pub total: usize,
}
