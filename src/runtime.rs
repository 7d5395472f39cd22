//! Process wiring shared by the API server and the stream worker.
//!
//! Both processes build the same [`ShortenService`]; they differ in which
//! half of it they drive and in whether completion callbacks are enabled.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

use crate::application::services::ShortenService;
use crate::concurrency::BoundedSpawner;
use crate::config::Config;
use crate::infrastructure::cache::{CacheService, NullCache, RedisCache};
use crate::infrastructure::notify::CompletionNotifier;
use crate::infrastructure::persistence::PgShortLinkRepository;
use crate::infrastructure::stream::RedisStreamProducer;
use crate::utils::code_generator::Base62Encoder;
use crate::utils::url_validator::UrlValidator;

/// Opens the PostgreSQL pool and applies pending migrations.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a migration fails.
pub async fn connect_database(config: &Config) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_connect_timeout))
        .idle_timeout(Duration::from_secs(config.db_idle_timeout))
        .max_lifetime(Duration::from_secs(config.db_max_lifetime))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    info!("✓ Connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    Ok(pool)
}

/// Opens the shared Redis connection used for publishing and caching.
///
/// # Errors
///
/// Returns an error if the URL is invalid or Redis is unreachable.
pub async fn connect_redis(config: &Config) -> Result<ConnectionManager> {
    let client = redis::Client::open(config.redis_url.as_str()).context("Invalid Redis URL")?;
    let conn = ConnectionManager::new(client)
        .await
        .context("Failed to connect to Redis")?;
    info!("✓ Connected to Redis");
    Ok(conn)
}

/// Builds the service from already-open connections.
///
/// # Errors
///
/// Returns an error if the code generator rejects `SECRET_KEY`.
pub fn build_service(
    config: &Config,
    pool: PgPool,
    redis: ConnectionManager,
    background: Arc<BoundedSpawner>,
    notifier: Option<Arc<dyn CompletionNotifier>>,
) -> Result<ShortenService> {
    let encoder = Base62Encoder::new(&config.secret_key, config.short_url_length)
        .map_err(|e| anyhow::anyhow!("Invalid SECRET_KEY: {e}"))?;

    let cache: Arc<dyn CacheService> = if config.cache_enabled {
        Arc::new(RedisCache::from_manager(redis.clone()))
    } else {
        Arc::new(NullCache::new())
    };

    let service = ShortenService::new(
        config.shorten_settings(),
        Arc::new(PgShortLinkRepository::new(Arc::new(pool))),
        Arc::new(RedisStreamProducer::new(redis, config.stream_max_len)),
        cache,
        Arc::new(encoder),
        UrlValidator::system(),
        background,
    );

    Ok(match notifier {
        Some(notifier) => service.with_notifier(notifier),
        None => service,
    })
}

/// Resolves on Ctrl+C or SIGTERM.
///
/// If a handler cannot be installed the corresponding branch never resolves.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received SIGTERM signal"),
    }
}
