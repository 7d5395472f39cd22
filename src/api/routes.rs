//! Versioned API route configuration.

use crate::api::handlers::{decode_handler, encode_handler, long_url_handler, redirect_handler};
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};

/// Routes mounted under `/api/v1`.
///
/// # Endpoints
///
/// - `POST /encode`                   - Submit a long URL (202, processed asynchronously)
/// - `GET  /decode?shorten_url=...`   - Resolve a short URL or code
/// - `GET  /urls/long?long_url=...`   - Look up the record of a long URL
/// - `GET  /{code}`                   - 301 redirect to the long URL
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/encode", post(encode_handler))
        .route("/decode", get(decode_handler))
        .route("/urls/long", get(long_url_handler))
        .route("/{code}", get(redirect_handler))
}
