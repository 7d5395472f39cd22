//! Business logic services for the application layer.

pub mod shorten_service;

pub use shorten_service::{
    DEFAULT_CACHE_TTL, HandleError, HandleOutcome, ShortenService, ShortenSettings, cache_key,
};
