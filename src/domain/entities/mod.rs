//! Core domain entities representing the business data model.
//!
//! # Entity Types
//!
//! - [`ShortLink`] - A persisted code → long URL mapping
//! - [`Submission`] - The envelope carried on the stream between API and worker
//! - [`CompletionNotice`] - The payload reported to a caller's callback URL
//!
//! Creation inputs use a separate struct ([`NewShortLink`]) so that
//! store-assigned fields never have to be invented by callers.

pub mod completion;
pub mod short_link;
pub mod submission;

pub use completion::CompletionNotice;
pub use short_link::{Algorithm, LinkStatus, NewShortLink, ShortLink};
pub use submission::Submission;
