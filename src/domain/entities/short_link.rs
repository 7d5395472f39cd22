//! Short link entity: the persisted mapping from code to long URL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Processing state of a short link.
///
/// Only `Encoded` records are ever persisted by the worker; `Submitted` and
/// `Failed` appear in completion notices and in rows written by other tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Submitted,
    Encoded,
    Failed,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Encoded => "encoded",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for LinkStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(Self::Submitted),
            "encoded" => Ok(Self::Encoded),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown link status '{other}'")),
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies the function that produced a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Base62,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base62 => "base62",
        }
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "base62" => Ok(Self::Base62),
            other => Err(format!("unknown algorithm '{other}'")),
        }
    }
}

/// A persisted short link.
///
/// Serialized as-is into the cache, so field names double as the cache wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortLink {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: LinkStatus,
    pub code: String,
    pub algo: Algorithm,
    pub long_url: String,
}

/// Input data for persisting a new short link.
#[derive(Debug, Clone, PartialEq)]
pub struct NewShortLink {
    pub code: String,
    pub algo: Algorithm,
    pub long_url: String,
    pub status: LinkStatus,
}

impl NewShortLink {
    /// Builds an already-encoded record, the only kind the worker writes.
    pub fn encoded(code: String, algo: Algorithm, long_url: String) -> Self {
        Self {
            code,
            algo,
            long_url,
            status: LinkStatus::Encoded,
        }
    }
}
