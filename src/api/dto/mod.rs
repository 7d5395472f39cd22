//! Data Transfer Objects for API requests and responses.
//!
//! All DTOs use Serde for JSON serialization/deserialization and validator
//! for input validation. The validator derive only performs the cheap syntactic
//! checks; scheme and address rules are enforced by the service.

pub mod health;
pub mod shorten;
