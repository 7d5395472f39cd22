//! Completion notifications to caller-supplied callback URLs.
//!
//! - [`CompletionNotifier`] - delivery contract
//! - [`WebhookNotifier`] - JSON POST over HTTP with bounded transport retry

mod service;
mod webhook;

pub use service::{CompletionNotifier, NotifyError};
pub use webhook::{WebhookConfig, WebhookNotifier};

#[cfg(test)]
pub use service::MockCompletionNotifier;
