//! Repository trait for short link data access.

use crate::domain::entities::{NewShortLink, ShortLink};
use crate::error::AppError;
use async_trait::async_trait;

/// Persistence contract consumed by the shortening service.
///
/// Records are immutable once encoded, so the contract has no update or
/// delete operations.
///
/// # Uniqueness
///
/// Implementations must reject a second record with the same `code` or the
/// same `long_url` and surface it as [`AppError::Conflict`]. The service has
/// no lock around its check-then-insert sequence and relies on this to resolve
/// concurrent deliveries of the same submission.
///
/// # Implementations
///
/// - [`crate::infrastructure::persistence::PgShortLinkRepository`] - PostgreSQL implementation
/// - Test mocks available with `cfg(test)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ShortLinkRepository: Send + Sync {
    /// Persists a new short link and returns the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Conflict`] if the code or long URL already exists.
    /// Returns [`AppError::Internal`] on database errors.
    async fn save(&self, new_link: NewShortLink) -> Result<ShortLink, AppError>;

    /// Finds a link by its short code.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Internal`] on database errors.
    async fn find_by_code(&self, code: &str) -> Result<Option<ShortLink>, AppError>;

    /// Finds a link by its exact long URL.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Internal`] on database errors.
    async fn find_by_long_url(&self, long_url: &str) -> Result<Option<ShortLink>, AppError>;

    /// Returns `true` if the backing store answers a trivial query.
    async fn health_check(&self) -> bool;
}
