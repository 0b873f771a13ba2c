use techconf_common::db;
use techconf_common::queue::NotificationQueue;
use techconf_common::redis_pool::create_redis_pool;
use techconf_notifier::config::WorkerConfig;
use techconf_notifier::dispatch::Dispatcher;
use techconf_notifier::email::SendGridSender;
use techconf_notifier::store::PgNotificationStore;
use techconf_notifier::worker::Worker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "techconf_notifier=info,techconf_common=info".into()),
        )
        .json()
        .init();

    tracing::info!("TechConf notification worker starting...");

    // Configuration must be complete before anything connects
    let config = WorkerConfig::from_env()?;

    let pool = db::create_lazy_pool(&config.database);
    let redis = create_redis_pool(&config.queue.redis_url).await?;
    let queue = NotificationQueue::new(redis, config.queue.queue_name.clone());

    let sender = SendGridSender::new(
        config.sendgrid_api_url.clone(),
        config.sendgrid_api_key.clone(),
        config.send_timeout,
    )?;
    let dispatcher = Dispatcher::new(PgNotificationStore::new(pool), sender, config.dispatch());

    tracing::info!(queue = %queue.name(), "Listening for notification ids");
    let worker = Worker::new(queue, dispatcher, config.queue.poll_timeout);

    // Run until Ctrl+C; the in-flight dispatch is allowed to finish
    worker
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Received shutdown signal, stopping gracefully...");
        })
        .await;

    tracing::info!("TechConf notification worker stopped.");
    Ok(())
}
