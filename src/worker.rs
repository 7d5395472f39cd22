//! Stream worker runtime.
//!
//! Reads submissions from the stream through a consumer group and feeds them
//! to [`ShortenService`] on a fixed-size worker pool. Several worker
//! processes may share the group; each needs a distinct consumer name.
//!
//! Shutdown order on SIGINT/SIGTERM:
//!
//! 1. cancel the read loop
//! 2. close the consumer, which waits for dispatched entries
//! 3. close the background spawner, which waits for pending callbacks
//!
//! [`ShortenService`]: crate::application::services::ShortenService

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::concurrency::{BoundedSpawner, WorkerPool};
use crate::config::Config;
use crate::infrastructure::notify::{CompletionNotifier, WebhookNotifier};
use crate::infrastructure::stream::{RedisStreamBroker, StreamConsumer};
use crate::runtime;

/// Runs the consumer until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if a connection cannot be established at startup or the
/// consumer group cannot be created. Errors after startup are logged and
/// retried by the consumer.
pub async fn run(config: Config) -> Result<()> {
    let pool = runtime::connect_database(&config).await?;
    let broker = Arc::new(
        RedisStreamBroker::connect(&config.redis_url)
            .await
            .context("Failed to connect stream broker")?,
    );

    let background = Arc::new(BoundedSpawner::new(config.background_concurrency));
    let notifier: Arc<dyn CompletionNotifier> = Arc::new(
        WebhookNotifier::new(config.webhook_config())
            .context("Failed to build webhook client")?,
    );
    let service = Arc::new(runtime::build_service(
        &config,
        pool,
        broker.connection(),
        background.clone(),
        Some(notifier),
    )?);

    let worker_pool = Arc::new(WorkerPool::new(config.worker_pool_size));
    let consumer = StreamConsumer::new(broker, worker_pool, config.consumer_options());

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        runtime::shutdown_signal().await;
        on_signal.cancel();
    });

    info!(
        stream = %config.queue_name,
        consumer = %config.consumer_name,
        workers = config.worker_pool_size,
        callback_slots = background.limit(),
        "Stream worker starting"
    );

    let consumed = consumer.consume(&cancel, &config.queue_name, service).await;

    consumer.close().await;
    info!(
        in_flight = background.in_flight(),
        "Draining pending callbacks"
    );
    background.close().await;
    info!("Stream worker stopped");

    consumed.context("Stream consumer failed")
}
