//! DTOs for the encode, decode and lookup endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{NoneAsEmptyString, serde_as};
use validator::Validate;

use crate::domain::entities::{Algorithm, LinkStatus, ShortLink};

/// Request to shorten a long URL.
#[serde_as]
#[derive(Debug, Deserialize, Validate)]
pub struct EncodeRequest {
    #[validate(url(message = "Invalid URL format"))]
    pub long_url: String,

    /// Receives a [`crate::domain::entities::CompletionNotice`] once the
    /// submission has been processed. An empty string means none.
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    #[validate(url(message = "Invalid callback URL format"))]
    pub callback_url: Option<String>,
}

/// Acknowledgement of an accepted submission.
///
/// The code is not known yet; it is assigned when a worker processes the entry.
#[derive(Debug, Serialize)]
pub struct EncodeResponse {
    pub status: &'static str,
    pub entry_id: String,
    pub long_url: String,
}

impl EncodeResponse {
    pub fn submitted(entry_id: String, long_url: String) -> Self {
        Self {
            status: "submitted",
            entry_id,
            long_url,
        }
    }
}

/// Query for `GET /decode`: a full short URL or a bare code.
#[derive(Debug, Deserialize, Validate)]
pub struct DecodeQuery {
    #[validate(length(min = 1, message = "shorten_url must not be empty"))]
    pub shorten_url: String,
}

/// Query for `GET /urls/long`.
#[derive(Debug, Deserialize, Validate)]
pub struct LongUrlQuery {
    #[validate(url(message = "Invalid URL format"))]
    pub long_url: String,
}

/// A stored short link as returned by the read endpoints.
#[derive(Debug, Serialize)]
pub struct ShortLinkResponse {
    pub code: String,
    pub short_url: String,
    pub long_url: String,
    pub status: LinkStatus,
    pub algo: Algorithm,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShortLinkResponse {
    pub fn new(link: ShortLink, short_url: String) -> Self {
        Self {
            code: link.code,
            short_url,
            long_url: link.long_url,
            status: link.status,
            algo: link.algo,
            created_at: link.created_at,
            updated_at: link.updated_at,
        }
    }
}
