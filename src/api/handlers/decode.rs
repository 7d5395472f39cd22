//! Handlers for reading stored short links.

use axum::{
    Json,
    extract::{Query, State},
};
use validator::Validate;

use crate::api::dto::shorten::{DecodeQuery, LongUrlQuery, ShortLinkResponse};
use crate::error::AppError;
use crate::state::AppState;

/// Resolves a short URL (or a bare code) to its record.
///
/// # Endpoint
///
/// `GET /api/v1/decode?shorten_url=http://localhost:8080/3fKq9ZxA`
///
/// # Errors
///
/// - 400 if no code can be extracted
/// - 404 if the code is unknown
pub async fn decode_handler(
    State(state): State<AppState>,
    Query(query): Query<DecodeQuery>,
) -> Result<Json<ShortLinkResponse>, AppError> {
    query.validate()?;

    let service = &state.shorten_service;
    let link = service.decode(&query.shorten_url).await?;
    let short_url = service.short_url(&link.code);

    Ok(Json(ShortLinkResponse::new(link, short_url)))
}

/// Looks up the record of an exact long URL.
///
/// # Endpoint
///
/// `GET /api/v1/urls/long?long_url=https://example.com/some/page`
///
/// Returns 404 until a worker has processed the submission.
pub async fn long_url_handler(
    State(state): State<AppState>,
    Query(query): Query<LongUrlQuery>,
) -> Result<Json<ShortLinkResponse>, AppError> {
    query.validate()?;

    let service = &state.shorten_service;
    let link = service.get_by_long_url(&query.long_url).await?;
    let short_url = service.short_url(&link.code);

    Ok(Json(ShortLinkResponse::new(link, short_url)))
}
