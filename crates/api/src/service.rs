//! Notification and attendee services backing the API routes.
//!
//! The web tier only ever writes `subject`/`message` on notifications; the
//! worker owns `status`, `completed_date`, and the dispatch columns.

use serde::Deserialize;
use sqlx::PgPool;

use techconf_common::error::AppError;
use techconf_common::queue::NotificationQueue;
use techconf_common::types::{Attendee, DispatchState, Notification, NotificationId};

/// Parameters for submitting a notification.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateNotificationParams {
    pub subject: String,
    pub message: String,
}

/// Parameters for registering an attendee.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAttendeeParams {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl CreateNotificationParams {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.subject.trim().is_empty() {
            return Err(AppError::Validation("subject must not be empty".into()));
        }
        if self.message.trim().is_empty() {
            return Err(AppError::Validation("message must not be empty".into()));
        }
        Ok(())
    }
}

impl CreateAttendeeParams {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.first_name.trim().is_empty() {
            return Err(AppError::Validation("first_name must not be empty".into()));
        }
        if self.last_name.trim().is_empty() {
            return Err(AppError::Validation("last_name must not be empty".into()));
        }
        // Only a shape check; deliverability is the email provider's call
        let email = self.email.trim();
        let valid = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !valid {
            return Err(AppError::Validation(format!(
                "'{}' is not a valid email address",
                self.email
            )));
        }
        Ok(())
    }
}

/// Service layer for notification records.
pub struct NotificationService;

impl NotificationService {
    /// Insert a pending notification and queue it for dispatch.
    ///
    /// The row is committed before the id is queued, so the worker never
    /// sees an id it cannot load.
    pub async fn create(
        pool: &PgPool,
        queue: &NotificationQueue,
        params: &CreateNotificationParams,
    ) -> Result<Notification, AppError> {
        params.validate()?;

        let notification: Notification = sqlx::query_as(
            r#"
            INSERT INTO notification (subject, message, submitted_date, dispatch_state)
            VALUES ($1, $2, now(), 'pending')
            RETURNING *
            "#,
        )
        .bind(params.subject.trim())
        .bind(&params.message)
        .fetch_one(pool)
        .await?;

        queue.enqueue(notification.id).await?;

        tracing::info!(
            notification_id = %notification.id,
            subject = %notification.subject,
            "Notification submitted"
        );

        Ok(notification)
    }

    /// All notifications, newest first.
    pub async fn list(pool: &PgPool) -> Result<Vec<Notification>, AppError> {
        let notifications: Vec<Notification> =
            sqlx::query_as("SELECT * FROM notification ORDER BY submitted_date DESC, id DESC")
                .fetch_all(pool)
                .await?;

        Ok(notifications)
    }

    pub async fn get(pool: &PgPool, id: NotificationId) -> Result<Notification, AppError> {
        sqlx::query_as("SELECT * FROM notification WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", id)))
    }

    /// Queue an existing notification again.
    ///
    /// Notifications that already went out are refused; the worker would
    /// reject them anyway.
    pub async fn requeue(
        pool: &PgPool,
        queue: &NotificationQueue,
        id: NotificationId,
    ) -> Result<Notification, AppError> {
        let notification = Self::get(pool, id).await?;
        if notification.dispatch_state == DispatchState::Notified {
            return Err(AppError::Validation(format!(
                "Notification {} was already sent: {}",
                id,
                notification.status.as_deref().unwrap_or("notified")
            )));
        }

        queue.enqueue(id).await?;
        tracing::info!(
            notification_id = %id,
            dispatch_state = %notification.dispatch_state,
            "Notification re-queued"
        );

        Ok(notification)
    }
}

/// Service layer for attendee records.
pub struct AttendeeService;

impl AttendeeService {
    pub async fn create(pool: &PgPool, params: &CreateAttendeeParams) -> Result<Attendee, AppError> {
        params.validate()?;

        let attendee: Attendee = sqlx::query_as(
            r#"
            INSERT INTO attendee (first_name, last_name, email)
            VALUES ($1, $2, $3)
            RETURNING id, first_name, last_name, email
            "#,
        )
        .bind(params.first_name.trim())
        .bind(params.last_name.trim())
        .bind(params.email.trim())
        .fetch_one(pool)
        .await?;

        tracing::info!(attendee_id = attendee.id, "Attendee registered");
        Ok(attendee)
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Attendee>, AppError> {
        let attendees: Vec<Attendee> = sqlx::query_as(
            "SELECT id, first_name, last_name, email FROM attendee ORDER BY last_name, first_name",
        )
        .fetch_all(pool)
        .await?;

        Ok(attendees)
    }
}
