//! PostgreSQL repository implementations.
//!
//! Queries are built at runtime with `sqlx::query_as`; schema lives in
//! `migrations/` and is applied on startup.
//!
//! # Repositories
//!
//! - [`PgShortLinkRepository`] - Short link storage and lookup

pub mod pg_short_link_repository;

pub use pg_short_link_repository::PgShortLinkRepository;
