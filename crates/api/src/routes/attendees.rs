//! Attendee routes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use techconf_common::error::AppError;
use techconf_common::types::Attendee;

use crate::service::{AttendeeService, CreateAttendeeParams};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/attendees", get(list_attendees).post(register_attendee))
}

/// POST /api/attendees — Register an attendee.
async fn register_attendee(
    State(state): State<AppState>,
    Json(params): Json<CreateAttendeeParams>,
) -> Result<(StatusCode, Json<Attendee>), AppError> {
    let attendee = AttendeeService::create(&state.pool, &params).await?;
    Ok((StatusCode::CREATED, Json(attendee)))
}

/// GET /api/attendees — List attendees by name.
async fn list_attendees(State(state): State<AppState>) -> Result<Json<Vec<Attendee>>, AppError> {
    let attendees = AttendeeService::list(&state.pool).await?;
    Ok(Json(attendees))
}
