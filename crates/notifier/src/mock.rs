//! In-memory doubles for dispatcher and worker tests.
//!
//! Enabled for this crate's unit tests and, through the `test-utils`
//! feature, for other crates.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};

use techconf_common::types::{
    Attendee, DispatchState, Notification, NotificationContent, NotificationId,
};

use crate::email::{EmailError, EmailMessage, EmailSender, SendReceipt};
use crate::store::{ClaimedNotification, NotificationStore, StoreError, StoreSession};
use crate::worker::WorkSource;

// ===== MockNotificationStore =====

#[derive(Default)]
struct StoreState {
    notifications: HashMap<NotificationId, Notification>,
    attendees: Vec<Attendee>,
    queries: Vec<&'static str>,
    sessions_opened: usize,
    sessions_open: usize,
    fail_connect: bool,
    fail_attendees: bool,
    fail_complete: bool,
}

/// Shared-state store; clones observe the same data.
#[derive(Clone, Default)]
pub struct MockNotificationStore {
    state: Arc<Mutex<StoreState>>,
}

impl MockNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a `pending` notification.
    pub fn add_notification(&self, id: i32, subject: &str, message: &str) {
        let id = NotificationId::new(id);
        self.state.lock().unwrap().notifications.insert(
            id,
            Notification {
                id,
                subject: subject.to_string(),
                message: message.to_string(),
                status: None,
                submitted_date: Utc::now(),
                completed_date: None,
                dispatch_state: DispatchState::Pending,
                claimed_at: None,
                error_detail: None,
            },
        );
    }

    pub fn add_attendee(&self, first_name: &str, last_name: &str, email: &str) {
        let mut state = self.state.lock().unwrap();
        let id = state.attendees.len() as i32 + 1;
        state.attendees.push(Attendee {
            id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
        });
    }

    /// Force a notification into a given state, as another worker would.
    pub fn set_state(&self, id: i32, dispatch_state: DispatchState, claimed_at: Option<DateTime<Utc>>) {
        let mut state = self.state.lock().unwrap();
        if let Some(n) = state.notifications.get_mut(&NotificationId::new(id)) {
            n.dispatch_state = dispatch_state;
            n.claimed_at = claimed_at;
        }
    }

    pub fn notification(&self, id: i32) -> Option<Notification> {
        self.state
            .lock()
            .unwrap()
            .notifications
            .get(&NotificationId::new(id))
            .cloned()
    }

    /// Names of the queries issued so far, in order.
    pub fn queries(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().queries.clone()
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.lock().unwrap().sessions_opened
    }

    /// Sessions not yet dropped.
    pub fn sessions_open(&self) -> usize {
        self.state.lock().unwrap().sessions_open
    }

    pub fn fail_connect(&self) {
        self.state.lock().unwrap().fail_connect = true;
    }

    pub fn fail_attendees(&self) {
        self.state.lock().unwrap().fail_attendees = true;
    }

    pub fn fail_complete(&self) {
        self.state.lock().unwrap().fail_complete = true;
    }
}

#[async_trait]
impl NotificationStore for MockNotificationStore {
    type Session = MockStoreSession;

    async fn open(&self) -> Result<MockStoreSession, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_connect {
            return Err(StoreError::Connection(sqlx::Error::PoolTimedOut));
        }
        state.sessions_opened += 1;
        state.sessions_open += 1;
        Ok(MockStoreSession {
            state: self.state.clone(),
        })
    }
}

pub struct MockStoreSession {
    state: Arc<Mutex<StoreState>>,
}

impl Drop for MockStoreSession {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.sessions_open -= 1;
        }
    }
}

#[async_trait]
impl StoreSession for MockStoreSession {
    async fn claim_notification(
        &mut self,
        id: NotificationId,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<ClaimedNotification, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.queries.push("claim_notification");
        // Postgres rejects timestamps before 4713 BC
        if stale_before.year() < -4712 {
            return Err(StoreError::Database(sqlx::Error::Protocol(
                "timestamp out of range".to_string(),
            )));
        }
        let n = state
            .notifications
            .get_mut(&id)
            .ok_or(StoreError::NotFound(id))?;

        let stale_claim = n.dispatch_state == DispatchState::Dispatching
            && n.claimed_at.is_some_and(|at| at < stale_before);
        if !n.dispatch_state.is_claimable() && !stale_claim {
            return Err(StoreError::NotClaimable {
                id,
                state: n.dispatch_state,
            });
        }

        n.dispatch_state = DispatchState::Dispatching;
        n.claimed_at = Some(now);
        n.error_detail = None;
        Ok(ClaimedNotification {
            id,
            claimed_at: now,
            content: NotificationContent {
                subject: n.subject.clone(),
                message: n.message.clone(),
            },
        })
    }

    async fn fetch_attendees(&mut self) -> Result<Vec<Attendee>, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.queries.push("fetch_attendees");
        if state.fail_attendees {
            return Err(StoreError::Database(sqlx::Error::Protocol(
                "attendee table unavailable".to_string(),
            )));
        }
        Ok(state.attendees.clone())
    }

    async fn complete_notification(
        &mut self,
        claim: &ClaimedNotification,
        status: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.queries.push("complete_notification");
        if state.fail_complete {
            return Err(StoreError::Database(sqlx::Error::Protocol(
                "update rejected".to_string(),
            )));
        }
        let n = state
            .notifications
            .get_mut(&claim.id)
            .filter(|n| {
                n.dispatch_state == DispatchState::Dispatching
                    && n.claimed_at == Some(claim.claimed_at)
            })
            .ok_or(StoreError::ClaimLost(claim.id))?;

        n.status = Some(status.to_string());
        n.completed_date = Some(completed_at);
        n.dispatch_state = DispatchState::Notified;
        n.error_detail = None;
        Ok(())
    }

    async fn fail_notification(
        &mut self,
        claim: &ClaimedNotification,
        reason: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.queries.push("fail_notification");
        let n = state
            .notifications
            .get_mut(&claim.id)
            .filter(|n| {
                n.dispatch_state == DispatchState::Dispatching
                    && n.claimed_at == Some(claim.claimed_at)
            })
            .ok_or(StoreError::ClaimLost(claim.id))?;

        n.dispatch_state = DispatchState::Failed;
        n.error_detail = Some(reason.to_string());
        Ok(())
    }
}

// ===== MockEmailSender =====

/// Records every message; addresses registered with `fail_for` error out.
#[derive(Clone, Default)]
pub struct MockEmailSender {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl MockEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, address: &str) {
        self.failing.lock().unwrap().insert(address.to_string());
    }

    /// Every send attempt, including failed ones.
    pub fn attempts(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailSender for MockEmailSender {
    async fn send(&self, email: &EmailMessage) -> Result<SendReceipt, EmailError> {
        self.sent.lock().unwrap().push(email.clone());
        if self.failing.lock().unwrap().contains(&email.to) {
            return Err(EmailError::Other(format!(
                "network error sending to {}",
                email.to
            )));
        }
        Ok(SendReceipt {
            status_code: 202,
            message_id: Some(format!("mock-{}", email.to)),
        })
    }
}

// ===== MockWorkSource =====

/// Queue double that hands out preloaded payloads and queued read errors, then reports empty.
#[derive(Clone, Default)]
pub struct MockWorkSource {
    items: Arc<Mutex<VecDeque<Result<String, &'static str>>>>,
}

impl MockWorkSource {
    pub fn new<I, S>(payloads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: Arc::new(Mutex::new(
                payloads.into_iter().map(|p| Ok(p.into())).collect(),
            )),
        }
    }

    pub fn push_payload(&self, payload: impl Into<String>) {
        self.items.lock().unwrap().push_back(Ok(payload.into()));
    }

    /// Queue a read failure, surfaced as a Redis I/O error.
    pub fn push_error(&self, detail: &'static str) {
        self.items.lock().unwrap().push_back(Err(detail));
    }

    /// Payloads and errors not yet handed out.
    pub fn remaining(&self) -> usize {
        self.items.lock().unwrap().len()
    }
}

#[async_trait]
impl WorkSource for MockWorkSource {
    async fn next_payload(&self, timeout: Duration) -> Result<Option<String>, redis::RedisError> {
        let next = self.items.lock().unwrap().pop_front();
        match next {
            Some(Ok(payload)) => Ok(Some(payload)),
            Some(Err(detail)) => Err(redis::RedisError::from((redis::ErrorKind::IoError, detail))),
            None => {
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
        }
    }
}
