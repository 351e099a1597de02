//! Producer side: turns booking events into notification records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::NewNotification;
use crate::i18n;

/// Types of booking events that produce a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingEventKind {
    Requested,
    Confirmed,
    Cancelled,
    Rescheduled,
    Reminder,
    PaymentReceived,
}

impl BookingEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingEventKind::Requested => "booking_requested",
            BookingEventKind::Confirmed => "booking_confirmed",
            BookingEventKind::Cancelled => "booking_cancelled",
            BookingEventKind::Rescheduled => "booking_rescheduled",
            BookingEventKind::Reminder => "appointment_reminder",
            BookingEventKind::PaymentReceived => "payment_received",
        }
    }

    /// Translation key prefix for the title/message pair.
    fn key(&self) -> &'static str {
        match self {
            BookingEventKind::Requested => "booking.requested",
            BookingEventKind::Confirmed => "booking.confirmed",
            BookingEventKind::Cancelled => "booking.cancelled",
            BookingEventKind::Rescheduled => "booking.rescheduled",
            BookingEventKind::Reminder => "booking.reminder",
            BookingEventKind::PaymentReceived => "payment.received",
        }
    }

    /// Icon name and accent color the list row uses.
    pub fn presentation(&self) -> (&'static str, &'static str) {
        match self {
            BookingEventKind::Requested => ("calendar-outline", "#2196F3"),
            BookingEventKind::Confirmed => ("checkmark-circle", "#4CAF50"),
            BookingEventKind::Cancelled => ("close-circle", "#F44336"),
            BookingEventKind::Rescheduled => ("time-outline", "#FF9800"),
            BookingEventKind::Reminder => ("alarm-outline", "#9C27B0"),
            BookingEventKind::PaymentReceived => ("card-outline", "#009688"),
        }
    }
}

/// Booking flow events, as emitted by the booking and payment screens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BookingEvent {
    BookingRequested {
        customer_name: String,
        service_name: String,
        starts_at: DateTime<Utc>,
    },
    BookingConfirmed {
        provider_name: String,
        service_name: String,
        starts_at: DateTime<Utc>,
    },
    BookingCancelled {
        counterpart_name: String,
        service_name: String,
        starts_at: DateTime<Utc>,
        #[serde(default)]
        reason: Option<String>,
    },
    BookingRescheduled {
        service_name: String,
        previous_start: DateTime<Utc>,
        starts_at: DateTime<Utc>,
    },
    AppointmentReminder {
        provider_name: String,
        service_name: String,
        starts_at: DateTime<Utc>,
    },
    PaymentReceived {
        customer_name: String,
        service_name: String,
        amount: String,
    },
}

fn format_when(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

impl BookingEvent {
    pub fn kind(&self) -> BookingEventKind {
        match self {
            BookingEvent::BookingRequested { .. } => BookingEventKind::Requested,
            BookingEvent::BookingConfirmed { .. } => BookingEventKind::Confirmed,
            BookingEvent::BookingCancelled { .. } => BookingEventKind::Cancelled,
            BookingEvent::BookingRescheduled { .. } => BookingEventKind::Rescheduled,
            BookingEvent::AppointmentReminder { .. } => BookingEventKind::Reminder,
            BookingEvent::PaymentReceived { .. } => BookingEventKind::PaymentReceived,
        }
    }

    /// Placeholder values available to this event's templates.
    fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            BookingEvent::BookingRequested {
                customer_name,
                service_name,
                starts_at,
            } => vec![
                ("customer", customer_name.clone()),
                ("service", service_name.clone()),
                ("when", format_when(starts_at)),
            ],
            BookingEvent::BookingConfirmed {
                provider_name,
                service_name,
                starts_at,
            }
            | BookingEvent::AppointmentReminder {
                provider_name,
                service_name,
                starts_at,
            } => vec![
                ("provider", provider_name.clone()),
                ("service", service_name.clone()),
                ("when", format_when(starts_at)),
            ],
            BookingEvent::BookingCancelled {
                counterpart_name,
                service_name,
                starts_at,
                reason,
            } => vec![
                ("counterpart", counterpart_name.clone()),
                ("service", service_name.clone()),
                ("when", format_when(starts_at)),
                ("reason", reason.clone().unwrap_or_default()),
            ],
            BookingEvent::BookingRescheduled {
                service_name,
                previous_start,
                starts_at,
            } => vec![
                ("service", service_name.clone()),
                ("previous", format_when(previous_start)),
                ("when", format_when(starts_at)),
            ],
            BookingEvent::PaymentReceived {
                customer_name,
                service_name,
                amount,
            } => vec![
                ("customer", customer_name.clone()),
                ("service", service_name.clone()),
                ("amount", amount.clone()),
            ],
        }
    }

    /// Build an unread notification for this event.
    ///
    /// `message_template` overrides the catalog message; it may use the same
    /// placeholders in `{name}` or `{{name}}` form.
    pub fn to_notification(
        &self,
        lang: Option<&str>,
        message_template: Option<&str>,
    ) -> NewNotification {
        let kind = self.kind();
        let owned = self.params();
        let params: Vec<(&str, &str)> = owned.iter().map(|(k, v)| (*k, v.as_str())).collect();

        let title = i18n::tr(lang, &format!("{}.title", kind.key()), None);
        let message = match message_template {
            Some(template) => i18n::render(template, &params),
            None => i18n::tr(
                lang,
                &format!("{}.message", kind.key()),
                Some(params.as_slice()),
            ),
        };

        let details = match self {
            BookingEvent::BookingCancelled {
                reason: Some(reason),
                ..
            } if !reason.trim().is_empty() => Some(i18n::tr(
                lang,
                "booking.cancelled.reason",
                Some(&[("reason", reason.as_str())]),
            )),
            _ => None,
        };

        let (icon, color) = kind.presentation();
        tracing::debug!("Rendered {} notification", kind.as_str());

        NewNotification {
            id: Uuid::new_v4().to_string(),
            title,
            message,
            time: Utc::now(),
            icon: icon.to_string(),
            color: color.to_string(),
            status: None,
            details,
        }
    }
}
