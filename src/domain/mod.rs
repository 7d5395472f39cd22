//! Domain layer containing business entities and repository contracts.
//!
//! The domain layer has no dependencies on infrastructure or presentation
//! layers. Business logic lives in [`crate::application::services`].
//!
//! # Modules
//!
//! - [`entities`] - Core business data structures
//! - [`repositories`] - Data access trait definitions
//!
//! # Processing Flow
//!
//! 1. The API validates a long URL and publishes a [`entities::Submission`]
//! 2. A stream worker picks the entry up and assigns a deterministic code
//! 3. The resulting [`entities::ShortLink`] is persisted via [`repositories::ShortLinkRepository`]
//! 4. The caller's callback (if any) receives a [`entities::CompletionNotice`]

pub mod entities;
pub mod repositories;
