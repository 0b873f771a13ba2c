use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

use crate::config::DatabaseConfig;

/// Build connection options from the individual `POSTGRES_*` settings.
pub fn connect_options(config: &DatabaseConfig) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.name)
        .username(&config.user)
        .password(&config.password)
}

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(5))
}

/// Create a PostgreSQL connection pool, connecting immediately.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    let pool = pool_options(config)
        .connect_with(connect_options(config))
        .await?;

    tracing::info!(
        host = %config.host,
        database = %config.name,
        max_connections = config.max_connections,
        "Connected to PostgreSQL"
    );
    Ok(pool)
}

/// Create a PostgreSQL connection pool that connects on first acquire.
///
/// A database outage then surfaces as an error on the acquiring call
/// instead of at startup.
pub fn create_lazy_pool(config: &DatabaseConfig) -> PgPool {
    tracing::info!(
        host = %config.host,
        database = %config.name,
        max_connections = config.max_connections,
        "PostgreSQL pool configured (lazy)"
    );
    pool_options(config).connect_lazy_with(connect_options(config))
}
