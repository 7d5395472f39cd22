//! Handler for short URL redirect.

use axum::{
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde_json::json;

use crate::error::AppError;
use crate::state::AppState;
use crate::utils::code_generator::is_base62;

/// Longest code accepted on the redirect path.
pub const MAX_REDIRECT_CODE_LENGTH: usize = 10;

/// Redirects a short code to its long URL.
///
/// # Endpoint
///
/// `GET /api/v1/{code}`
///
/// Resolution goes through the same cache-aside path as `/decode`.
///
/// # Errors
///
/// - 400 if the code is not base62 or longer than [`MAX_REDIRECT_CODE_LENGTH`]
/// - 404 if the code is unknown
pub async fn redirect_handler(
    Path(code): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    if !is_base62(&code) || code.len() > MAX_REDIRECT_CODE_LENGTH {
        return Err(AppError::bad_request(
            format!("code [{code}] is not valid"),
            json!({ "code": code, "max_length": MAX_REDIRECT_CODE_LENGTH }),
        ));
    }

    let link = state.shorten_service.decode(&code).await?;

    Ok((
        StatusCode::MOVED_PERMANENTLY,
        [(header::LOCATION, link.long_url)],
    ))
}
