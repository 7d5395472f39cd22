//! Concurrency primitives shared by the worker and the API.
//!
//! - [`worker_pool`] - Fixed-size pool fed by a handoff channel
//! - [`bounded`] - Detached task spawning with a concurrency cap

pub mod bounded;
pub mod worker_pool;

pub use bounded::BoundedSpawner;
pub use worker_pool::{PoolError, WorkerPool};
