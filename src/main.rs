//! API server entry point.

use stream_shortener::{config, server, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let config = config::load_from_env()?;
    telemetry::init_tracing(&config.log_level, &config.log_format)?;
    config.print_summary();

    server::run(config).await
}
