//! Health check endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Queue depth is reported as `null` when Redis is unreachable.
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let queue_depth = match state.queue.depth().await {
        Ok(depth) => Some(depth),
        Err(e) => {
            tracing::warn!(error = %e, "Could not read notification queue depth");
            None
        }
    };

    Json(json!({
        "status": "ok",
        "service": "techconf-api",
        "version": env!("CARGO_PKG_VERSION"),
        "queue_depth": queue_depth,
    }))
}
