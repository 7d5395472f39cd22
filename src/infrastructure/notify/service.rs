//! Notifier trait and error types.

use async_trait::async_trait;

use crate::domain::entities::CompletionNotice;

/// Errors from a single notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("failed to build notifier: {0}")]
    Configuration(String),

    #[error("callback request failed: {0}")]
    Transport(String),

    #[error("callback responded with HTTP {0}")]
    Status(u16),
}

impl NotifyError {
    /// Connection problems and server-side failures may succeed on a later try.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status(code) => *code >= 500,
            Self::Configuration(_) => false,
        }
    }
}

/// Reports the outcome of a submission to its callback URL.
///
/// Delivery is best-effort: callers log failures and carry on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    /// Sends `notice` to `callback_url`.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if the request fails or the endpoint answers
    /// with a non-2xx status.
    async fn notify(
        &self,
        callback_url: &str,
        notice: &CompletionNotice,
    ) -> Result<(), NotifyError>;
}
