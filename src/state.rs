//! Shared application state for HTTP handlers.

use std::sync::Arc;

use crate::application::services::ShortenService;

/// State injected into every handler.
///
/// Cloned per request; the service sits behind an [`Arc`].
#[derive(Clone)]
pub struct AppState {
    pub shorten_service: Arc<ShortenService>,
}

impl AppState {
    pub fn new(shorten_service: Arc<ShortenService>) -> Self {
        Self { shorten_service }
    }
}
