//! Queue consumer loop.
//!
//! Pops one payload at a time and runs it through the dispatcher. Every
//! outcome is logged here; a popped message is never pushed back, whatever
//! the result.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use techconf_common::queue::NotificationQueue;

use crate::dispatch::{DispatchError, DispatchReport, Dispatcher};
use crate::email::EmailSender;
use crate::store::NotificationStore;

/// Pause after a queue error before polling again.
const QUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(2);

/// Where work items come from.
#[async_trait]
pub trait WorkSource: Send + Sync {
    /// Next raw payload, or `None` if nothing arrived within `timeout`.
    async fn next_payload(&self, timeout: Duration) -> Result<Option<String>, redis::RedisError>;
}

#[async_trait]
impl WorkSource for NotificationQueue {
    async fn next_payload(&self, timeout: Duration) -> Result<Option<String>, redis::RedisError> {
        self.next(timeout).await
    }
}

/// Counters for one `run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
}

pub struct Worker<Q, S, E> {
    source: Q,
    dispatcher: Dispatcher<S, E>,
    poll_timeout: Duration,
    error_backoff: Duration,
}

impl<Q, S, E> Worker<Q, S, E>
where
    Q: WorkSource,
    S: NotificationStore,
    E: EmailSender,
{
    pub fn new(source: Q, dispatcher: Dispatcher<S, E>, poll_timeout: Duration) -> Self {
        Self {
            source,
            dispatcher,
            poll_timeout,
            error_backoff: QUEUE_ERROR_BACKOFF,
        }
    }

    /// Override the pause after a failed queue read.
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Consume the queue until `shutdown` resolves.
    ///
    /// Shutdown is only observed between messages; a dispatch in progress
    /// runs to completion.
    pub async fn run<F>(&self, shutdown: F) -> WorkerStats
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut stats = WorkerStats::default();

        tracing::info!(
            poll_timeout_secs = self.poll_timeout.as_secs(),
            "Notification worker started"
        );

        loop {
            let next = tokio::select! {
                _ = &mut shutdown => break,
                next = self.source.next_payload(self.poll_timeout) => next,
            };

            match next {
                Ok(Some(payload)) => {
                    stats.processed += 1;
                    match self.process(&payload).await {
                        Ok(_) => stats.succeeded += 1,
                        Err(_) => stats.failed += 1,
                    }
                }
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read from notification queue");
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(self.error_backoff) => {}
                    }
                }
            }
        }

        tracing::info!(
            processed = stats.processed,
            succeeded = stats.succeeded,
            failed = stats.failed,
            "Notification worker stopped"
        );
        stats
    }

    /// Dispatch a single payload and log the outcome.
    pub async fn process(&self, payload: &str) -> Result<DispatchReport, DispatchError> {
        let result = self.dispatcher.handle_payload(payload).await;

        match &result {
            Ok(report) => tracing::info!(
                notification_id = %report.notification_id,
                attempted = report.attempted,
                delivered = report.delivered,
                failed = report.failed,
                status = %report.status,
                elapsed_ms = (report.completed_at - report.started_at).num_milliseconds(),
                "Dispatch completed"
            ),
            Err(e) => tracing::error!(
                payload = %payload.trim(),
                kind = e.kind(),
                error = %e,
                "Dispatch failed"
            ),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use techconf_common::types::DispatchState;

    use super::*;
    use crate::config::DispatchConfig;
    use crate::mock::{MockEmailSender, MockNotificationStore, MockWorkSource};

    fn worker(
        source: MockWorkSource,
        store: &MockNotificationStore,
        sender: &MockEmailSender,
    ) -> Worker<MockWorkSource, MockNotificationStore, MockEmailSender> {
        let dispatcher = Dispatcher::new(
            store.clone(),
            sender.clone(),
            DispatchConfig {
                admin_email: "info@techconf.com".to_string(),
                lease: Duration::from_secs(900),
            },
        );
        Worker::new(source, dispatcher, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_run_drains_queue_and_counts_outcomes() {
        let store = MockNotificationStore::new();
        store.add_notification(1, "Schedule", "Lunch moved to 1pm");
        store.add_notification(2, "Parking", "Lot C is closed");
        store.add_attendee("Alice", "Anders", "alice@x.com");
        let sender = MockEmailSender::new();
        let source = MockWorkSource::new(["1", "not-an-id", "2", "404"]);

        let worker = worker(source.clone(), &store, &sender);
        let stats = worker
            .run(tokio::time::sleep(Duration::from_millis(200)))
            .await;

        assert_eq!(source.remaining(), 0);
        assert_eq!(
            stats,
            WorkerStats {
                processed: 4,
                succeeded: 2,
                failed: 2,
            }
        );
        assert_eq!(sender.attempts().len(), 2);
        assert_eq!(store.notification(1).unwrap().dispatch_state, DispatchState::Notified);
        assert_eq!(store.notification(2).unwrap().dispatch_state, DispatchState::Notified);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_when_idle() {
        let store = MockNotificationStore::new();
        let sender = MockEmailSender::new();
        let worker = worker(MockWorkSource::default(), &store, &sender);

        let stats = worker.run(std::future::ready(())).await;

        assert_eq!(stats, WorkerStats::default());
    }

    #[tokio::test]
    async fn test_run_keeps_polling_after_queue_error() {
        let store = MockNotificationStore::new();
        store.add_notification(1, "Schedule", "Lunch moved to 1pm");
        store.add_attendee("Alice", "Anders", "alice@x.com");
        let sender = MockEmailSender::new();
        let source = MockWorkSource::default();
        source.push_error("connection reset by peer");
        source.push_payload("1");

        let worker = worker(source.clone(), &store, &sender)
            .with_error_backoff(Duration::from_millis(10));
        let stats = worker
            .run(tokio::time::sleep(Duration::from_millis(200)))
            .await;

        assert_eq!(source.remaining(), 0);
        assert_eq!(
            stats,
            WorkerStats {
                processed: 1,
                succeeded: 1,
                failed: 0,
            }
        );
        assert_eq!(store.notification(1).unwrap().dispatch_state, DispatchState::Notified);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_error_backoff() {
        let store = MockNotificationStore::new();
        store.add_notification(1, "Schedule", "Lunch moved to 1pm");
        let sender = MockEmailSender::new();
        let source = MockWorkSource::default();
        source.push_error("connection refused");
        source.push_payload("1");

        // default two second backoff; shutdown fires well inside it
        let worker = worker(source.clone(), &store, &sender);
        let stats = tokio::time::timeout(
            Duration::from_secs(1),
            worker.run(tokio::time::sleep(Duration::from_millis(50))),
        )
        .await
        .expect("run should stop during backoff");

        assert_eq!(stats, WorkerStats::default());
        assert_eq!(source.remaining(), 1);
        assert!(sender.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_process_returns_typed_error() {
        let store = MockNotificationStore::new();
        let sender = MockEmailSender::new();
        let worker = worker(MockWorkSource::default(), &store, &sender);

        let err = worker.process("12").await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
