use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;

/// Connection settings for the conference PostgreSQL database.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database host (`POSTGRES_URL`)
    pub host: String,

    /// Database port (default: 5432)
    pub port: u16,

    /// Database name (`POSTGRES_DB`)
    pub name: String,

    /// Login role (`POSTGRES_USER`)
    pub user: String,

    /// Login password (`POSTGRES_PW`)
    pub password: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 5)
    pub max_connections: u32,
}

/// Settings for the Redis-backed notification work queue.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Redis connection string
    pub redis_url: String,

    /// Name of the Redis list holding pending notification ids
    pub queue_name: String,

    /// How long a single `BRPOP` waits before the worker loop re-checks for shutdown
    pub poll_timeout: Duration,
}

impl DatabaseConfig {
    /// Load database settings from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    /// Load database settings through an arbitrary key lookup.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        Ok(Self {
            host: required(lookup, "POSTGRES_URL")?,
            port: parsed_or(lookup, "POSTGRES_PORT", 5432)?,
            name: required(lookup, "POSTGRES_DB")?,
            user: required(lookup, "POSTGRES_USER")?,
            password: required(lookup, "POSTGRES_PW")?,
            max_connections: parsed_or(lookup, "DB_MAX_CONNECTIONS", 5)?,
        })
    }
}

impl QueueConfig {
    /// Load queue settings from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    /// Load queue settings through an arbitrary key lookup.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        Ok(Self {
            redis_url: lookup("REDIS_URL").unwrap_or_else(|| "redis://localhost:6379".to_string()),
            queue_name: lookup("NOTIFICATION_QUEUE")
                .unwrap_or_else(|| "notificationqueue".to_string()),
            poll_timeout: Duration::from_secs(parsed_or(lookup, "QUEUE_POLL_TIMEOUT_SECS", 5)?),
        })
    }
}

/// Fetch a required, non-empty variable.
pub fn required(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Result<String, AppError> {
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AppError::Config(format!(
            "{key} environment variable is required"
        ))),
    }
}

/// Parse an optional variable, falling back to `default` when unset.
pub fn parsed_or<T: FromStr>(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, AppError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            AppError::Config(format!(
                "{key} must be a valid {}",
                std::any::type_name::<T>()
            ))
        }),
    }
}
