//! Notification store: the database side of a dispatch.
//!
//! A dispatch opens one `StoreSession`, which exclusively owns a database
//! connection until it is dropped. Every exit path of a dispatch therefore
//! releases the connection, including early returns and panics.
//!
//! Before any email goes out the session *claims* the notification by moving
//! it to `dispatching`. Only `pending` and `failed` rows, or `dispatching`
//! rows whose claim is older than the lease, can be claimed, so a duplicated
//! queue message does not email the audience twice while the first dispatch
//! is still running.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::{Connection, PgPool, Postgres};
use thiserror::Error;

use techconf_common::types::{Attendee, DispatchState, NotificationContent, NotificationId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not connect to notification store: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("notification {0} not found")]
    NotFound(NotificationId),

    #[error("notification {id} is {state} and cannot be claimed")]
    NotClaimable {
        id: NotificationId,
        state: DispatchState,
    },

    #[error("claim on notification {0} was lost before completion")]
    ClaimLost(NotificationId),
}

/// A notification this worker has claimed for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedNotification {
    pub id: NotificationId,
    /// Claim timestamp as stored; later writes are conditional on it.
    pub claimed_at: DateTime<Utc>,
    pub content: NotificationContent,
}

/// Source of store sessions.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    type Session: StoreSession;

    /// Acquire a scoped connection. Nothing is read or written yet.
    async fn open(&self) -> Result<Self::Session, StoreError>;
}

/// Queries issued during one dispatch.
#[async_trait]
pub trait StoreSession: Send {
    /// Atomically move the notification to `dispatching` and return its content.
    ///
    /// A `dispatching` row is taken over only when its `claimed_at` is older
    /// than `stale_before`.
    async fn claim_notification(
        &mut self,
        id: NotificationId,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<ClaimedNotification, StoreError>;

    /// Every attendee in the store.
    async fn fetch_attendees(&mut self) -> Result<Vec<Attendee>, StoreError>;

    /// Record the outcome and mark the notification `notified`.
    async fn complete_notification(
        &mut self,
        claim: &ClaimedNotification,
        status: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Mark a claimed notification `failed`. `status` and `completed_date` are left alone.
    async fn fail_notification(
        &mut self,
        claim: &ClaimedNotification,
        reason: &str,
    ) -> Result<(), StoreError>;
}

/// PostgreSQL-backed notification store.
#[derive(Clone)]
pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    type Session = PgStoreSession;

    async fn open(&self) -> Result<PgStoreSession, StoreError> {
        let conn = self.pool.acquire().await.map_err(StoreError::Connection)?;
        Ok(PgStoreSession { conn })
    }
}

/// A single pooled connection, returned to the pool on drop.
pub struct PgStoreSession {
    conn: PoolConnection<Postgres>,
}

#[derive(sqlx::FromRow)]
struct ClaimRow {
    subject: String,
    message: String,
    claimed_at: DateTime<Utc>,
}

#[async_trait]
impl StoreSession for PgStoreSession {
    async fn claim_notification(
        &mut self,
        id: NotificationId,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<ClaimedNotification, StoreError> {
        let claimed: Option<ClaimRow> = sqlx::query_as(
            r#"
            UPDATE notification
            SET dispatch_state = 'dispatching', claimed_at = $2, error_detail = NULL
            WHERE id = $1
              AND (dispatch_state IN ('pending', 'failed')
                   OR (dispatch_state = 'dispatching' AND claimed_at < $3))
            RETURNING subject, message, claimed_at
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(stale_before)
        .fetch_optional(&mut *self.conn)
        .await?;

        if let Some(row) = claimed {
            return Ok(ClaimedNotification {
                id,
                claimed_at: row.claimed_at,
                content: NotificationContent {
                    subject: row.subject,
                    message: row.message,
                },
            });
        }

        let state: Option<DispatchState> =
            sqlx::query_scalar("SELECT dispatch_state FROM notification WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *self.conn)
                .await?;

        match state {
            None => Err(StoreError::NotFound(id)),
            Some(state) => Err(StoreError::NotClaimable { id, state }),
        }
    }

    async fn fetch_attendees(&mut self) -> Result<Vec<Attendee>, StoreError> {
        let attendees: Vec<Attendee> =
            sqlx::query_as("SELECT id, first_name, last_name, email FROM attendee ORDER BY id")
                .fetch_all(&mut *self.conn)
                .await?;

        Ok(attendees)
    }

    async fn complete_notification(
        &mut self,
        claim: &ClaimedNotification,
        status: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tx = self.conn.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE notification
            SET status = $2, completed_date = $3, dispatch_state = 'notified', error_detail = NULL
            WHERE id = $1 AND dispatch_state = 'dispatching' AND claimed_at = $4
            "#,
        )
        .bind(claim.id)
        .bind(status)
        .bind(completed_at)
        .bind(claim.claimed_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated != 1 {
            tx.rollback().await?;
            return Err(StoreError::ClaimLost(claim.id));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn fail_notification(
        &mut self,
        claim: &ClaimedNotification,
        reason: &str,
    ) -> Result<(), StoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE notification
            SET dispatch_state = 'failed', error_detail = $2
            WHERE id = $1 AND dispatch_state = 'dispatching' AND claimed_at = $3
            "#,
        )
        .bind(claim.id)
        .bind(reason)
        .bind(claim.claimed_at)
        .execute(&mut *self.conn)
        .await?
        .rows_affected();

        if updated != 1 {
            return Err(StoreError::ClaimLost(claim.id));
        }
        Ok(())
    }
}
