//! Stream worker entry point.
//!
//! # Usage
//!
//! ```bash
//! # Uses CONSUMER_NAME / WORKER_POOL_SIZE from the environment
//! cargo run --bin worker
//!
//! # Run a second worker in the same consumer group
//! cargo run --bin worker -- --consumer-name worker-2 --workers 32
//! ```

use clap::Parser;
use stream_shortener::{config::Config, telemetry, worker};

/// Processes queued URL submissions.
#[derive(Parser)]
#[command(name = "worker")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Consumer name within the group (overrides `CONSUMER_NAME`)
    #[arg(long)]
    consumer_name: Option<String>,

    /// Worker pool size (overrides `WORKER_POOL_SIZE`)
    #[arg(long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(name) = cli.consumer_name {
        config.consumer_name = name;
    }
    if let Some(workers) = cli.workers {
        config.worker_pool_size = workers;
    }
    config.validate()?;

    telemetry::init_tracing(&config.log_level, &config.log_format)?;
    config.print_summary();

    worker::run(config).await
}
