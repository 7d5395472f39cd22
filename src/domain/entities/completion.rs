//! Completion notice delivered to a caller-supplied callback URL.

use serde::Serialize;

use super::short_link::LinkStatus;

/// JSON body POSTed to the callback once a submission has been processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionNotice {
    pub status: LinkStatus,
    pub long_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompletionNotice {
    pub fn success(
        status: LinkStatus,
        long_url: impl Into<String>,
        short_url: String,
        code: String,
    ) -> Self {
        Self {
            status,
            long_url: long_url.into(),
            short_url: Some(short_url),
            code: Some(code),
            error: None,
        }
    }

    pub fn failure(long_url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: LinkStatus::Failed,
            long_url: long_url.into(),
            short_url: None,
            code: None,
            error: Some(error.into()),
        }
    }
}
