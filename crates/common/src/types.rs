use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Primary key of a `notification` row.
///
/// The work queue carries this id as a decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct NotificationId(pub i32);

impl NotificationId {
    pub fn new(id: i32) -> Self {
        Self(id)
    }

    pub fn get(self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NotificationId {
    type Err = std::num::ParseIntError;

    /// Parse a queue payload. Surrounding whitespace (e.g. a trailing
    /// newline from `redis-cli`) is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i32>().map(Self)
    }
}

/// Lifecycle of a notification's dispatch, persisted in `notification.dispatch_state`.
///
/// `pending → dispatching → notified`, or `dispatching → failed` when a
/// claimed dispatch could not be completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DispatchState {
    Pending,
    Dispatching,
    Notified,
    Failed,
}

impl DispatchState {
    /// Whether a worker may claim a notification in this state without
    /// checking the lease.
    pub fn is_claimable(self) -> bool {
        matches!(self, DispatchState::Pending | DispatchState::Failed)
    }
}

impl std::fmt::Display for DispatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchState::Pending => write!(f, "pending"),
            DispatchState::Dispatching => write!(f, "dispatching"),
            DispatchState::Notified => write!(f, "notified"),
            DispatchState::Failed => write!(f, "failed"),
        }
    }
}

/// An announcement to broadcast to every attendee.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: NotificationId,
    pub subject: String,
    pub message: String,
    /// Human-readable outcome, e.g. "Notified 3 attendees". Written only by the worker.
    pub status: Option<String>,
    pub submitted_date: DateTime<Utc>,
    /// Written only by the worker, together with `status`.
    pub completed_date: Option<DateTime<Utc>>,
    pub dispatch_state: DispatchState,
    pub claimed_at: Option<DateTime<Utc>>,
    pub error_detail: Option<String>,
}

/// Subject and body of a claimed notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationContent {
    pub subject: String,
    pub message: String,
}

/// A registered conference participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Attendee {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_id_parses_decimal_payload() {
        assert_eq!("42".parse::<NotificationId>().unwrap(), NotificationId(42));
        assert_eq!(" 7\n".parse::<NotificationId>().unwrap(), NotificationId(7));
    }

    #[test]
    fn test_notification_id_rejects_garbage() {
        assert!("".parse::<NotificationId>().is_err());
        assert!("abc".parse::<NotificationId>().is_err());
        assert!("4.2".parse::<NotificationId>().is_err());
        assert!("99999999999".parse::<NotificationId>().is_err());
    }

    #[test]
    fn test_dispatch_state_display_matches_column_values() {
        assert_eq!(DispatchState::Pending.to_string(), "pending");
        assert_eq!(DispatchState::Dispatching.to_string(), "dispatching");
        assert_eq!(DispatchState::Notified.to_string(), "notified");
        assert_eq!(DispatchState::Failed.to_string(), "failed");
    }

    #[test]
    fn test_claimable_states() {
        assert!(DispatchState::Pending.is_claimable());
        assert!(DispatchState::Failed.is_claimable());
        assert!(!DispatchState::Dispatching.is_claimable());
        assert!(!DispatchState::Notified.is_claimable());
    }
}
