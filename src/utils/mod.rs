//! Utility functions for code generation and URL validation.
//!
//! - [`code_generator`] - Deterministic HMAC/base62 short code generation
//! - [`url_validator`] - URL validation with SSRF protection

pub mod code_generator;
pub mod url_validator;
