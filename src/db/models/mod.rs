//! Notification models split into separate files.
//! Re-exported at `crate::db::models` (and `crate::db`) so callers can use
//! `use crate::db::NotificationRecord;`.

pub mod notification;
pub mod notification_status;

pub use self::notification::*;
pub use self::notification_status::*;
