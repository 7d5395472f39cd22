//! Tracing subscriber setup shared by both binaries.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Installs the global `fmt` subscriber.
///
/// `log_level` is an [`EnvFilter`] directive such as `info` or
/// `stream_shortener=debug,sqlx=warn`; an unparsable directive falls back to
/// `info`. `log_format` selects human-readable (`text`) or JSON lines (`json`).
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(log_level: &str, log_format: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = if log_format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))
}
