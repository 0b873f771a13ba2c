//! Notification work queue backed by a Redis list of notification ids.
//!
//! Producers `LPUSH` the decimal id, the worker `BRPOP`s from the other end,
//! so ids are consumed in submission order. A popped message is gone: there
//! is no acknowledgement or redelivery.

use std::time::Duration;

use redis::aio::ConnectionManager;

use crate::types::NotificationId;

/// Handle to the notification work queue.
#[derive(Clone)]
pub struct NotificationQueue {
    redis: ConnectionManager,
    queue_name: String,
}

impl NotificationQueue {
    pub fn new(redis: ConnectionManager, queue_name: impl Into<String>) -> Self {
        Self {
            redis,
            queue_name: queue_name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.queue_name
    }

    /// Push a notification id for dispatch.
    pub async fn enqueue(&self, id: NotificationId) -> Result<(), redis::RedisError> {
        let mut conn = self.redis.clone();
        let depth: u64 = redis::cmd("LPUSH")
            .arg(&self.queue_name)
            .arg(id.to_string())
            .query_async(&mut conn)
            .await?;

        tracing::info!(
            notification_id = %id,
            queue = %self.queue_name,
            depth,
            "Notification enqueued"
        );
        Ok(())
    }

    /// Wait up to `timeout` for the next raw payload.
    ///
    /// Returns `None` when the wait timed out with the queue empty. The
    /// payload is returned unparsed; validating it is the consumer's job.
    pub async fn next(&self, timeout: Duration) -> Result<Option<String>, redis::RedisError> {
        let mut conn = self.redis.clone();
        // BRPOP with a zero timeout blocks forever
        let timeout_secs = timeout.as_secs().max(1);
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&self.queue_name)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await?;

        Ok(popped.map(|(_, payload)| payload))
    }

    /// Number of ids waiting in the queue.
    pub async fn depth(&self) -> Result<u64, redis::RedisError> {
        let mut conn = self.redis.clone();
        redis::cmd("LLEN")
            .arg(&self.queue_name)
            .query_async(&mut conn)
            .await
    }
}
