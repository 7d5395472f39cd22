//! Application layer services implementing business logic.
//!
//! Services consume the repository, stream, cache and notifier traits and
//! expose the operations used by the HTTP handlers and the stream worker.
//!
//! # Available Services
//!
//! - [`services::shorten_service::ShortenService`] - Submission, processing and decoding of short links

pub mod services;
