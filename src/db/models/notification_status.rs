use serde::{Deserialize, Serialize};

/// Lifecycle state of a notification record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    #[default]
    Unread,
    Read,
    Trash,
}

impl NotificationStatus {
    /// Convert to string
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationStatus::Unread => "unread",
            NotificationStatus::Read => "read",
            NotificationStatus::Trash => "trash",
        }
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which slice of the collection a consumer screen shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationFilter {
    /// Everything that is not in the trash.
    #[default]
    All,
    Unread,
    Read,
    Trash,
}

impl NotificationFilter {
    pub fn matches(self, status: NotificationStatus) -> bool {
        match self {
            NotificationFilter::All => status != NotificationStatus::Trash,
            NotificationFilter::Unread => status == NotificationStatus::Unread,
            NotificationFilter::Read => status == NotificationStatus::Read,
            NotificationFilter::Trash => status == NotificationStatus::Trash,
        }
    }
}
