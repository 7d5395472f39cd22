//! HTTP server initialization and runtime setup.
//!
//! The API process validates and enqueues submissions and serves reads. It
//! never writes short links itself; that is the worker's job.

use crate::concurrency::BoundedSpawner;
use crate::config::Config;
use crate::routes::app_router;
use crate::runtime;
use crate::state::AppState;

use anyhow::Result;
use axum::ServiceExt;
use axum::extract::Request;
use std::net::SocketAddr;
use std::sync::Arc;

/// Runs the HTTP server until Ctrl+C or SIGTERM.
///
/// Initializes:
/// - PostgreSQL connection pool and migrations
/// - Redis connection shared by the stream producer and the cache
/// - Background spawner for cache writes
/// - Axum HTTP server with graceful shutdown
///
/// # Errors
///
/// Returns an error if:
/// - Database or Redis connection fails
/// - Server bind fails
/// - Server runtime error occurs
pub async fn run(config: Config) -> Result<()> {
    let pool = runtime::connect_database(&config).await?;
    let redis = runtime::connect_redis(&config).await?;

    let background = Arc::new(BoundedSpawner::new(config.background_concurrency));
    let service = runtime::build_service(&config, pool, redis, background.clone(), None)?;

    let app = app_router(AppState::new(Arc::new(service)));

    let addr: SocketAddr = config.listen_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{addr}");

    axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .with_graceful_shutdown(runtime::shutdown_signal())
        .await?;

    background.close().await;
    tracing::info!("Server stopped");
    Ok(())
}
