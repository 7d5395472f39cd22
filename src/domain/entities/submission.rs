//! Submission envelope carried on the stream.

use serde::{Deserialize, Serialize};

/// The wire message published by `submit` and consumed by the worker.
///
/// Serialized as `{"url": "...", "callback_url": "..."}`; `callback_url` is
/// omitted when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

impl Submission {
    pub fn new(url: impl Into<String>, callback_url: Option<String>) -> Self {
        Self {
            url: url.into(),
            callback_url: callback_url.filter(|c| !c.is_empty()),
        }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(data: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(data)
    }
}
