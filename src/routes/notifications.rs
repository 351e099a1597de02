use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::{NewNotification, NotificationCounts, NotificationFilter, NotificationRecord};
use crate::error::{AppError, AppErrorWithDetails, AppResult};
use crate::i18n;
use crate::services::bookings::BookingEvent;
use crate::services::notifications::MutationOutcome;
use crate::services::write_queue::Persistence;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_notifications).post(add_notification))
        .route("/bookings", post(add_from_booking))
        .route("/counts", get(get_counts))
        .route("/read-all", post(mark_all_as_read))
        .route("/trash", delete(empty_trash))
        .route("/trash/restore-all", post(restore_all_from_trash))
        .route("/views", get(list_views).delete(discard_views))
        .route("/views/commit", post(commit_views))
        .route("/:id", get(get_notification).delete(permanently_delete))
        .route("/:id/read", post(mark_as_read))
        .route("/:id/trash", post(move_to_trash))
        .route("/:id/restore", post(restore_from_trash))
        .route("/:id/view", post(mark_as_viewed))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    pub filter: Option<NotificationFilter>,
}

#[derive(Debug, Serialize)]
pub struct NotificationsListResponse {
    pub filter: NotificationFilter,
    pub items: Vec<NotificationRecord>,
    pub unread_count: usize,
}

#[derive(Debug, Serialize)]
pub struct CountsResponse {
    #[serde(flatten)]
    pub counts: NotificationCounts,
    pub badge: usize,
}

/// Body returned by every mutation endpoint.
#[derive(Debug, Serialize)]
pub struct MutationResponse {
    pub affected: usize,
    pub unread_count: usize,
    pub persisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddFromBookingRequest {
    pub event: BookingEvent,
    pub lang: Option<String>,
    pub message_template: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub notification: NotificationRecord,
    #[serde(flatten)]
    pub result: MutationResponse,
}

#[derive(Debug, Serialize)]
pub struct ViewsResponse {
    pub staged: bool,
    pub pending: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DiscardResponse {
    pub discarded: usize,
}

fn mutation_response(state: &AppState, outcome: MutationOutcome) -> Json<MutationResponse> {
    let warning = match &outcome.persistence {
        Persistence::Deferred(_) => Some(
            "The change is applied but could not be saved yet; it will be retried".to_string(),
        ),
        _ => None,
    };

    Json(MutationResponse {
        affected: outcome.affected,
        unread_count: state.notifications.unread_count(),
        persisted: outcome.persistence.is_durable(),
        warning,
    })
}

// ============================================================================
// Handlers: read side
// ============================================================================

/// List notifications for one tab, newest first
async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListNotificationsQuery>,
) -> Json<NotificationsListResponse> {
    let filter = query.filter.unwrap_or_default();
    let items = state.notifications.list(filter).await;

    Json(NotificationsListResponse {
        filter,
        items,
        unread_count: state.notifications.unread_count(),
    })
}

async fn get_counts(State(state): State<Arc<AppState>>) -> Json<CountsResponse> {
    let counts = state.notifications.counts();
    Json(CountsResponse {
        counts,
        badge: counts.unread,
    })
}

async fn get_notification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<NotificationRecord>> {
    state
        .notifications
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("notification {}", id)))
}

// ============================================================================
// Handlers: producers
// ============================================================================

async fn add_notification(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewNotification>,
) -> AppResult<(StatusCode, Json<CreatedResponse>)> {
    let (record, outcome) = state.notifications.add(body).await?;
    Ok(created(&state, record, outcome))
}

/// Render a booking event into a notification and add it
async fn add_from_booking(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AddFromBookingRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), AppErrorWithDetails> {
    let lang = match body.lang.as_deref() {
        Some(requested) => {
            let lang = i18n::normalize_language(requested);
            if !i18n::is_supported_language(&lang) {
                let message = i18n::tr(
                    Some(&state.config.default_lang),
                    "error.unsupported_language",
                    Some(&[("lang", requested)]),
                );
                return Err(AppError::BadRequest(message)
                    .with_details(serde_json::json!({ "supported": ["en", "ru"] })));
            }
            lang
        }
        None => state.config.default_lang.clone(),
    };

    let new = body
        .event
        .to_notification(Some(&lang), body.message_template.as_deref());
    let (record, outcome) = state.notifications.add(new).await?;
    Ok(created(&state, record, outcome))
}

fn created(
    state: &AppState,
    notification: NotificationRecord,
    outcome: MutationOutcome,
) -> (StatusCode, Json<CreatedResponse>) {
    let Json(result) = mutation_response(state, outcome);

    (
        StatusCode::CREATED,
        Json(CreatedResponse {
            notification,
            result,
        }),
    )
}

// ============================================================================
// Handlers: lifecycle mutations
// ============================================================================

async fn mark_as_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<MutationResponse> {
    let outcome = state.notifications.mark_as_read(&id).await;
    mutation_response(&state, outcome)
}

async fn mark_all_as_read(State(state): State<Arc<AppState>>) -> Json<MutationResponse> {
    let outcome = state.notifications.mark_all_as_read().await;
    mutation_response(&state, outcome)
}

async fn move_to_trash(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<MutationResponse> {
    let outcome = state.notifications.move_to_trash(&id).await;
    mutation_response(&state, outcome)
}

async fn restore_from_trash(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<MutationResponse> {
    let outcome = state.notifications.restore_from_trash(&id).await;
    mutation_response(&state, outcome)
}

async fn restore_all_from_trash(State(state): State<Arc<AppState>>) -> Json<MutationResponse> {
    let outcome = state.notifications.restore_all_from_trash().await;
    mutation_response(&state, outcome)
}

async fn permanently_delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<MutationResponse> {
    let outcome = state.notifications.permanently_delete(&id).await;
    mutation_response(&state, outcome)
}

async fn empty_trash(State(state): State<Arc<AppState>>) -> Json<MutationResponse> {
    let outcome = state.notifications.empty_trash().await;
    mutation_response(&state, outcome)
}

// ============================================================================
// Handlers: view tracking
// ============================================================================

async fn mark_as_viewed(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<ViewsResponse> {
    let staged = state.views.mark_as_viewed(&id).await;
    Json(ViewsResponse {
        staged,
        pending: state.views.staged().await,
    })
}

async fn list_views(State(state): State<Arc<AppState>>) -> Json<ViewsResponse> {
    Json(ViewsResponse {
        staged: false,
        pending: state.views.staged().await,
    })
}

/// The screen lost focus: staged views become read in one write
async fn commit_views(State(state): State<Arc<AppState>>) -> Json<MutationResponse> {
    let outcome = state.views.commit().await;
    mutation_response(&state, outcome)
}

async fn discard_views(State(state): State<Arc<AppState>>) -> Json<DiscardResponse> {
    Json(DiscardResponse {
        discarded: state.views.discard().await,
    })
}
