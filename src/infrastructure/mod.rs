//! Infrastructure layer for external integrations.
//!
//! This layer implements interfaces defined by the domain and application
//! layers, providing concrete implementations for external systems.
//!
//! # Modules
//!
//! - [`cache`] - Caching abstractions (Redis and no-op implementations)
//! - [`notify`] - Completion callbacks over HTTP
//! - [`persistence`] - PostgreSQL repository implementations
//! - [`stream`] - Redis Streams and in-memory stream queue

pub mod cache;
pub mod notify;
pub mod persistence;
pub mod stream;
