//! Cache service trait and error types.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// Errors that can occur during cache operations.
#[derive(Debug)]
pub enum CacheError {
    ConnectionError(String),
    OperationError(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ConnectionError(e) => write!(f, "Cache connection error: {}", e),
            Self::OperationError(e) => write!(f, "Cache operation error: {}", e),
        }
    }
}

impl std::error::Error for CacheError {}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() {
            Self::ConnectionError(e.to_string())
        } else {
            Self::OperationError(e.to_string())
        }
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Key-value store used by the decode path.
///
/// Values are opaque bytes. Implementations report failures honestly; it is
/// the caller's job to treat a failed read as a miss and ignore failed writes.
///
/// # Implementations
///
/// - [`crate::infrastructure::cache::RedisCache`] - Redis-backed cache with TTL support
/// - [`crate::infrastructure::cache::NullCache`] - No-op implementation for disabled caching
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheService: Send + Sync {
    /// Returns the value stored under `key`, or `None` on a miss.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backend cannot be reached.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, expiring after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the write was not applied.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()>;

    /// Removes `key`. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backend cannot be reached.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Checks if the cache backend is healthy.
    async fn health_check(&self) -> bool;
}
