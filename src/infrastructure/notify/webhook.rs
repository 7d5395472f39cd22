//! HTTP webhook notifier.

use super::service::{CompletionNotifier, NotifyError};
use crate::domain::entities::CompletionNotice;
use async_trait::async_trait;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};

/// Webhook client settings.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Total tries per notification, including the first.
    pub max_attempts: usize,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// POSTs [`CompletionNotice`] JSON to callback URLs.
///
/// Transport errors and 5xx responses are retried with exponential backoff
/// up to `max_attempts`; any other non-2xx status fails immediately.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    config: WebhookConfig,
}

impl WebhookNotifier {
    /// # Errors
    ///
    /// Returns [`NotifyError::Configuration`] if the HTTP client cannot be built.
    pub fn new(config: WebhookConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("stream-shortener/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| NotifyError::Configuration(e.to_string()))?;

        Ok(Self { client, config })
    }

    async fn post_once(
        &self,
        callback_url: &str,
        notice: &CompletionNotice,
    ) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(callback_url)
            .json(notice)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NotifyError::Status(status.as_u16()))
        }
    }
}

const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Delays between tries: `base`, `2 * base`, `4 * base`, ... capped at
/// [`MAX_RETRY_DELAY`], one fewer than `max_attempts`.
fn retry_delays(base: Duration, max_attempts: usize) -> impl Iterator<Item = Duration> {
    let base_ms = base.as_millis().clamp(1, u64::MAX as u128) as u64;
    // ExponentialBackoff yields factor * 2^n starting at n = 1.
    ExponentialBackoff::from_millis(2)
        .factor(base_ms)
        .map(|delay| (delay / 2).min(MAX_RETRY_DELAY))
        .take(max_attempts.saturating_sub(1))
}

#[async_trait]
impl CompletionNotifier for WebhookNotifier {
    async fn notify(
        &self,
        callback_url: &str,
        notice: &CompletionNotice,
    ) -> Result<(), NotifyError> {
        let retries = retry_delays(self.config.base_delay, self.config.max_attempts).map(jitter);

        let result = RetryIf::start(
            retries,
            || self.post_once(callback_url, notice),
            |e: &NotifyError| {
                let retry = e.is_retryable();
                if retry {
                    warn!(callback_url, error = %e, "Callback delivery failed, retrying");
                }
                retry
            },
        )
        .await;

        if result.is_ok() {
            debug!(callback_url, status = %notice.status, "Callback delivered");
        }
        result
    }
}
