//! Shared application state for the Axum API server.

use sqlx::PgPool;
use techconf_common::queue::NotificationQueue;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub queue: NotificationQueue,
}

impl AppState {
    pub fn new(pool: PgPool, queue: NotificationQueue) -> Self {
        Self { pool, queue }
    }
}
