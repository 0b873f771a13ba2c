//! Notification dispatch.
//!
//! One dispatch takes a notification id through:
//! 1. Open a store session (connection failure ends the dispatch, nothing touched)
//! 2. Claim the notification and read its subject + message
//! 3. Load every attendee
//! 4. Send one personalized email per attendee, sequentially; a failed send
//!    is logged and recorded, and the loop moves on
//! 5. Persist `"Notified {n} attendees"` and the completion time
//!
//! `n` counts attendees *attempted*, not delivered. Per-attendee outcomes are
//! returned in the `DispatchReport` instead.
//!
//! If anything fails after the claim, the notification is marked `failed`
//! and the error is returned to the caller.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use techconf_common::types::{Attendee, NotificationContent, NotificationId};

use crate::config::DispatchConfig;
use crate::email::{EmailMessage, EmailSender};
use crate::store::{ClaimedNotification, NotificationStore, StoreError, StoreSession};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid notification id payload {payload:?}: {source}")]
    InvalidPayload {
        payload: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("store connection failed: {0}")]
    Connect(#[source] StoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DispatchError {
    /// Short machine-friendly label for log aggregation.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::InvalidPayload { .. } => "invalid_payload",
            DispatchError::Connect(_) => "connect",
            DispatchError::Store(StoreError::NotFound(_)) => "not_found",
            DispatchError::Store(StoreError::NotClaimable { .. }) => "not_claimable",
            DispatchError::Store(StoreError::ClaimLost(_)) => "claim_lost",
            DispatchError::Store(_) => "store",
        }
    }
}

/// Outcome of sending to one attendee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchResult {
    pub email: String,
    pub sent: bool,
    pub error: Option<String>,
}

/// Summary of a completed dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub notification_id: NotificationId,
    /// The status line persisted on the notification.
    pub status: String,
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub results: Vec<DispatchResult>,
}

/// `"Hello {first_name}! | {subject}"`
pub fn personalized_subject(first_name: &str, subject: &str) -> String {
    format!("Hello {}! | {}", first_name, subject)
}

/// Status line persisted after a dispatch over `attempted` attendees.
pub fn status_line(attempted: usize) -> String {
    format!("Notified {} attendees", attempted)
}

/// Claims taken before this instant are stale.
///
/// Never earlier than the Unix epoch, so the bound stays inside the range a
/// Postgres `timestamptz` accepts whatever lease is configured.
pub fn stale_before(now: DateTime<Utc>, lease: std::time::Duration) -> DateTime<Utc> {
    let floor = DateTime::<Utc>::UNIX_EPOCH;
    chrono::Duration::from_std(lease)
        .ok()
        .and_then(|lease| now.checked_sub_signed(lease))
        .map_or(floor, |cutoff| cutoff.max(floor))
}

/// Drives dispatches against a store and an email sender.
pub struct Dispatcher<S, E> {
    store: S,
    sender: E,
    config: DispatchConfig,
}

impl<S, E> Dispatcher<S, E>
where
    S: NotificationStore,
    E: EmailSender,
{
    pub fn new(store: S, sender: E, config: DispatchConfig) -> Self {
        Self {
            store,
            sender,
            config,
        }
    }

    /// Parse a raw queue payload and dispatch it.
    pub async fn handle_payload(&self, payload: &str) -> Result<DispatchReport, DispatchError> {
        let id: NotificationId =
            payload
                .parse()
                .map_err(|source| DispatchError::InvalidPayload {
                    payload: payload.to_string(),
                    source,
                })?;

        self.dispatch(id).await
    }

    /// Run one full dispatch for `id`.
    pub async fn dispatch(&self, id: NotificationId) -> Result<DispatchReport, DispatchError> {
        let started_at = Utc::now();
        tracing::info!(notification_id = %id, "Dispatch started");

        let mut session = self.store.open().await.map_err(DispatchError::Connect)?;

        let stale_before = stale_before(started_at, self.config.lease);
        let claim = session
            .claim_notification(id, started_at, stale_before)
            .await?;

        tracing::info!(
            notification_id = %id,
            subject = %claim.content.subject,
            "Notification claimed"
        );

        match self.deliver(&mut session, &claim, started_at).await {
            Ok(report) => Ok(report),
            Err(err) => {
                if let Err(mark_err) = session.fail_notification(&claim, &err.to_string()).await {
                    tracing::error!(
                        notification_id = %id,
                        error = %mark_err,
                        "Could not mark notification as failed"
                    );
                }
                Err(err)
            }
        }
    }

    async fn deliver(
        &self,
        session: &mut S::Session,
        claim: &ClaimedNotification,
        started_at: DateTime<Utc>,
    ) -> Result<DispatchReport, DispatchError> {
        let attendees = session.fetch_attendees().await?;

        let mut results = Vec::with_capacity(attendees.len());
        for attendee in &attendees {
            results.push(self.send_to(claim.id, attendee, &claim.content).await);
        }

        let completed_at = Utc::now();
        let status = status_line(attendees.len());
        session
            .complete_notification(claim, &status, completed_at)
            .await?;

        let delivered = results.iter().filter(|r| r.sent).count();
        Ok(DispatchReport {
            notification_id: claim.id,
            status,
            attempted: results.len(),
            delivered,
            failed: results.len() - delivered,
            started_at,
            completed_at,
            results,
        })
    }

    /// Send to a single attendee. Never fails the dispatch.
    async fn send_to(
        &self,
        id: NotificationId,
        attendee: &Attendee,
        content: &NotificationContent,
    ) -> DispatchResult {
        let email = EmailMessage {
            from: self.config.admin_email.clone(),
            to: attendee.email.clone(),
            subject: personalized_subject(&attendee.first_name, &content.subject),
            text_body: content.message.clone(),
        };

        match self.sender.send(&email).await {
            Ok(receipt) => {
                tracing::debug!(
                    notification_id = %id,
                    attendee = %attendee.email,
                    status_code = receipt.status_code,
                    message_id = receipt.message_id.as_deref().unwrap_or("-"),
                    "Email sent"
                );
                DispatchResult {
                    email: attendee.email.clone(),
                    sent: true,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(
                    notification_id = %id,
                    attendee = %attendee.email,
                    error = %e,
                    "Email send failed, continuing with remaining attendees"
                );
                DispatchResult {
                    email: attendee.email.clone(),
                    sent: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
