//! Notification routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use techconf_common::error::AppError;
use techconf_common::types::{Notification, NotificationId};

use crate::service::{CreateNotificationParams, NotificationService};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", post(create_notification))
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/{id}", get(get_notification))
        .route("/api/notifications/{id}/dispatch", post(requeue_notification))
}

/// POST /api/notifications — Submit a notification and queue it for all attendees.
async fn create_notification(
    State(state): State<AppState>,
    Json(params): Json<CreateNotificationParams>,
) -> Result<(StatusCode, Json<Notification>), AppError> {
    let notification = NotificationService::create(&state.pool, &state.queue, &params).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}

/// GET /api/notifications — List notifications, newest first.
async fn list_notifications(
    State(state): State<AppState>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let notifications = NotificationService::list(&state.pool).await?;
    Ok(Json(notifications))
}

/// GET /api/notifications/:id
async fn get_notification(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Notification>, AppError> {
    let notification = NotificationService::get(&state.pool, NotificationId::new(id)).await?;
    Ok(Json(notification))
}

/// POST /api/notifications/:id/dispatch — Queue a pending or failed notification again.
async fn requeue_notification(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<(StatusCode, Json<Notification>), AppError> {
    let notification =
        NotificationService::requeue(&state.pool, &state.queue, NotificationId::new(id)).await?;
    Ok((StatusCode::ACCEPTED, Json(notification)))
}
