//! TechConf API server binary entrypoint.

use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use techconf_common::db::create_pool;
use techconf_common::queue::NotificationQueue;
use techconf_common::redis_pool::create_redis_pool;

use techconf_api::config::ApiConfig;
use techconf_api::routes::create_router;
use techconf_api::state::AppState;

/// Notification bodies are plain text; 64 KiB is plenty.
const MAX_BODY_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("techconf_api=debug,techconf_common=info,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting TechConf API server...");

    // Load configuration
    let config = ApiConfig::from_env()?;

    // Create database connection pool
    let pool = create_pool(&config.database).await?;

    // Create Redis connection for the work queue
    let redis = create_redis_pool(&config.queue.redis_url).await?;
    let queue = NotificationQueue::new(redis, config.queue.queue_name.clone());

    let state = AppState::new(pool, queue);

    // Build router
    let app = create_router(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    tracing::info!("API server listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Received shutdown signal, stopping gracefully...");
        })
        .await?;

    Ok(())
}
