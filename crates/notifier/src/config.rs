use std::time::Duration;

use techconf_common::config::{DatabaseConfig, QueueConfig, parsed_or, required};
use techconf_common::error::AppError;

/// Default SendGrid v3 send endpoint.
pub const DEFAULT_SENDGRID_API_URL: &str = "https://api.sendgrid.com/v3/mail/send";

/// Longest dispatch lease accepted (`DISPATCH_LEASE_SECS`): 30 days.
pub const MAX_DISPATCH_LEASE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Everything the notification worker needs, loaded once at startup.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database: DatabaseConfig,
    pub queue: QueueConfig,

    /// Sender address on every outgoing email (`ADMIN_EMAIL_ADDRESS`)
    pub admin_email: String,

    /// SendGrid API key (`SENDGRID_API_KEY`)
    pub sendgrid_api_key: String,

    /// SendGrid send endpoint, overridable for sandboxes
    pub sendgrid_api_url: String,

    /// Upper bound on a single email send (default: 30s)
    pub send_timeout: Duration,

    /// How long a dispatch claim is honoured before another worker may take it over (default: 15 min)
    pub lease: Duration,
}

/// The part of the configuration the dispatch logic itself reads.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub admin_email: String,
    pub lease: Duration,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// Fails on the first missing required option, before anything connects.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let lease = Duration::from_secs(parsed_or(lookup, "DISPATCH_LEASE_SECS", 900)?);
        if lease > MAX_DISPATCH_LEASE {
            return Err(AppError::Config(format!(
                "DISPATCH_LEASE_SECS must be at most {}",
                MAX_DISPATCH_LEASE.as_secs()
            )));
        }

        Ok(Self {
            database: DatabaseConfig::from_lookup(lookup)?,
            queue: QueueConfig::from_lookup(lookup)?,
            admin_email: required(lookup, "ADMIN_EMAIL_ADDRESS")?,
            sendgrid_api_key: required(lookup, "SENDGRID_API_KEY")?,
            sendgrid_api_url: lookup("SENDGRID_API_URL")
                .unwrap_or_else(|| DEFAULT_SENDGRID_API_URL.to_string()),
            send_timeout: Duration::from_secs(parsed_or(lookup, "EMAIL_SEND_TIMEOUT_SECS", 30)?),
            lease,
        })
    }

    pub fn dispatch(&self) -> DispatchConfig {
        DispatchConfig {
            admin_email: self.admin_email.clone(),
            lease: self.lease,
        }
    }
}
