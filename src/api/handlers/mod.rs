//! HTTP request handlers for API endpoints.
//!
//! Handlers only bind and validate input; all behavior lives in
//! [`crate::application::services::ShortenService`].

pub mod decode;
pub mod encode;
pub mod health;
pub mod redirect;

pub use decode::{decode_handler, long_url_handler};
pub use encode::encode_handler;
pub use health::health_handler;
pub use redirect::redirect_handler;
