//! Handler for URL submission.

use axum::{Json, extract::State, http::StatusCode};
use validator::Validate;

use crate::api::dto::shorten::{EncodeRequest, EncodeResponse};
use crate::error::AppError;
use crate::state::AppState;

/// Accepts a long URL for asynchronous shortening.
///
/// # Endpoint
///
/// `POST /api/v1/encode`
///
/// # Request Body
///
/// ```json
/// {
///   "long_url": "https://example.com/some/page",
///   "callback_url": "https://hooks.example.net/done"
/// }
/// ```
///
/// # Response
///
/// `202 Accepted` once the submission is on the stream:
///
/// ```json
/// {
///   "status": "submitted",
///   "entry_id": "1718000000000-0",
///   "long_url": "https://example.com/some/page"
/// }
/// ```
///
/// # Errors
///
/// - 400 if either URL is malformed, not public, or uses a disallowed scheme
/// - 500 if the stream is unavailable
pub async fn encode_handler(
    State(state): State<AppState>,
    Json(payload): Json<EncodeRequest>,
) -> Result<(StatusCode, Json<EncodeResponse>), AppError> {
    payload.validate()?;

    let entry_id = state
        .shorten_service
        .submit_url(&payload.long_url, payload.callback_url.as_deref())
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(EncodeResponse::submitted(entry_id, payload.long_url)),
    ))
}
