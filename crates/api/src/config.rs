use std::net::SocketAddr;

use techconf_common::config::{DatabaseConfig, QueueConfig, parsed_or};
use techconf_common::error::AppError;

/// Web tier configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub database: DatabaseConfig,
    pub queue: QueueConfig,

    /// Listen address (default: 0.0.0.0:3000)
    pub bind_addr: SocketAddr,
}

impl ApiConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        Ok(Self {
            database: DatabaseConfig::from_lookup(lookup)?,
            queue: QueueConfig::from_lookup(lookup)?,
            bind_addr: parsed_or(lookup, "API_BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(key: &str) -> Option<String> {
        match key {
            "POSTGRES_URL" => Some("localhost".into()),
            "POSTGRES_DB" => Some("techconfdb".into()),
            "POSTGRES_USER" => Some("techconf".into()),
            "POSTGRES_PW" => Some("techconf".into()),
            "API_BIND_ADDR" => Some("127.0.0.1:8080".into()),
            _ => None,
        }
    }

    #[test]
    fn test_bind_addr_override() {
        let config = ApiConfig::from_lookup(&lookup).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.queue.queue_name, "notificationqueue");
    }

    #[test]
    fn test_sendgrid_key_not_required() {
        // The web tier never sends email itself
        assert!(ApiConfig::from_lookup(&lookup).is_ok());
    }
}
