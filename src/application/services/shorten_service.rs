//! Submit, process and decode short links.
//!
//! The write path is split in two. [`ShortenService::submit_url`] validates a
//! long URL and publishes it to the stream without touching the database.
//! A worker later feeds each entry to [`ShortenService::handle_message`],
//! which assigns the deterministic code and persists the record. Because
//! entries are delivered at least once, processing is idempotent: a long URL
//! that already has a record is treated as a replay.
//!
//! The read path ([`ShortenService::decode`]) is cache-aside over the
//! repository.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::concurrency::BoundedSpawner;
use crate::domain::entities::{CompletionNotice, NewShortLink, ShortLink, Submission};
use crate::domain::repositories::ShortLinkRepository;
use crate::error::AppError;
use crate::infrastructure::cache::CacheService;
use crate::infrastructure::notify::CompletionNotifier;
use crate::infrastructure::stream::{
    HandlerError, MessageHandler, StreamMessage, StreamProducer,
};
use crate::utils::code_generator::UrlEncoder;
use crate::utils::url_validator::{UrlValidationError, UrlValidator};

/// Default lifetime of a cached decode result.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Builds the cache key for a short code.
pub fn cache_key(code: &str) -> String {
    format!("url:code:{code}")
}

/// Static settings of the service.
#[derive(Debug, Clone)]
pub struct ShortenSettings {
    /// Stream submissions are published to.
    pub queue_name: String,
    /// Prefix of public short URLs, e.g. `https://sho.rt`.
    pub redirect_host: String,
    pub cache_ttl: Duration,
}

/// Result of processing one submission.
#[derive(Debug, Clone, PartialEq)]
pub enum HandleOutcome {
    /// A new record was stored.
    Created(ShortLink),
    /// The long URL already had a record; nothing was written.
    Replayed(ShortLink),
}

impl HandleOutcome {
    pub fn link(&self) -> &ShortLink {
        match self {
            Self::Created(link) | Self::Replayed(link) => link,
        }
    }
}

/// Why a submission could not be processed.
#[derive(Debug, thiserror::Error)]
pub enum HandleError {
    #[error("malformed submission: {0}")]
    Malformed(String),

    #[error("invalid long URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),

    #[error("code '{code}' is already taken by a different long URL")]
    Collision { code: String },

    #[error("storage error: {0}")]
    Storage(AppError),
}

impl HandleError {
    /// Permanent failures cannot succeed on redelivery.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Storage(_) => false,
            Self::InvalidUrl(e) => !e.is_transient(),
            Self::Malformed(_) | Self::Collision { .. } => true,
        }
    }
}

/// Orchestrates the shortening pipeline.
pub struct ShortenService {
    settings: ShortenSettings,
    repository: Arc<dyn ShortLinkRepository>,
    producer: Arc<dyn StreamProducer>,
    cache: Arc<dyn CacheService>,
    encoder: Arc<dyn UrlEncoder>,
    validator: UrlValidator,
    notifier: Option<Arc<dyn CompletionNotifier>>,
    background: Arc<BoundedSpawner>,
}

impl ShortenService {
    /// Creates a service without a notifier; see [`Self::with_notifier`].
    pub fn new(
        settings: ShortenSettings,
        repository: Arc<dyn ShortLinkRepository>,
        producer: Arc<dyn StreamProducer>,
        cache: Arc<dyn CacheService>,
        encoder: Arc<dyn UrlEncoder>,
        validator: UrlValidator,
        background: Arc<BoundedSpawner>,
    ) -> Self {
        Self {
            settings,
            repository,
            producer,
            cache,
            encoder,
            validator,
            notifier: None,
            background,
        }
    }

    /// Enables completion callbacks.
    pub fn with_notifier(mut self, notifier: Arc<dyn CompletionNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn settings(&self) -> &ShortenSettings {
        &self.settings
    }

    /// Public short URL for `code`.
    pub fn short_url(&self, code: &str) -> String {
        format!("{}/{}", self.settings.redirect_host.trim_end_matches('/'), code)
    }

    /// Validates `long_url` (and `callback_url`, if any) and enqueues it.
    ///
    /// Returns the stream entry id. No record exists until a worker has
    /// processed the entry.
    ///
    /// # Errors
    ///
    /// - [`AppError::Validation`] if either URL is rejected
    /// - [`AppError::Internal`] if the submission could not be published
    pub async fn submit_url(
        &self,
        long_url: &str,
        callback_url: Option<&str>,
    ) -> Result<String, AppError> {
        self.validator.validate(long_url).await.map_err(|e| {
            AppError::bad_request("Invalid URL", json!({ "reason": e.to_string() }))
        })?;

        let callback_url = callback_url.filter(|c| !c.is_empty());
        if let Some(callback) = callback_url {
            self.validator.validate_callback(callback).await.map_err(|e| {
                AppError::bad_request("Invalid callback URL", json!({ "reason": e.to_string() }))
            })?;
        }

        let submission = Submission::new(long_url, callback_url.map(str::to_string));
        let payload = submission.to_bytes().map_err(|e| {
            AppError::internal("Failed to encode submission", json!({ "reason": e.to_string() }))
        })?;

        let entry_id = self
            .producer
            .publish(&self.settings.queue_name, &payload)
            .await
            .map_err(|e| {
                error!(queue = %self.settings.queue_name, error = %e, "Publish failed");
                AppError::internal("Failed to enqueue URL", json!({}))
            })?;

        debug!(entry_id = %entry_id, long_url, "Submission enqueued");
        Ok(entry_id)
    }

    /// Processes one serialized [`Submission`].
    ///
    /// # Errors
    ///
    /// See [`HandleError`]; [`HandleError::is_permanent`] tells whether a
    /// redelivery could succeed.
    pub async fn handle_message(&self, payload: &[u8]) -> Result<HandleOutcome, HandleError> {
        let submission =
            Submission::from_bytes(payload).map_err(|e| HandleError::Malformed(e.to_string()))?;
        let Submission { url, callback_url } = submission;

        if let Err(e) = self.validator.validate(&url).await {
            // A failed lookup is retried on redelivery, so the caller hears nothing yet.
            if !e.is_transient() {
                self.notify(callback_url, CompletionNotice::failure(&url, e.to_string()));
            }
            return Err(e.into());
        }

        if let Some(existing) = self
            .repository
            .find_by_long_url(&url)
            .await
            .map_err(HandleError::Storage)?
        {
            return Ok(self.replay(existing, callback_url));
        }

        let code = self.encoder.encode(&url);
        let new_link = NewShortLink::encoded(code.clone(), self.encoder.algorithm(), url.clone());

        match self.repository.save(new_link).await {
            Ok(link) => {
                info!(code = %link.code, long_url = %link.long_url, "Short link created");
                metrics::counter!("shortlinks_created_total").increment(1);

                let notice = CompletionNotice::success(
                    link.status,
                    &link.long_url,
                    self.short_url(&link.code),
                    link.code.clone(),
                );
                self.notify(callback_url, notice);
                Ok(HandleOutcome::Created(link))
            }
            // Another delivery of the same URL won the insert, or the code
            // belongs to a different URL.
            Err(AppError::Conflict { .. }) => match self
                .repository
                .find_by_long_url(&url)
                .await
                .map_err(HandleError::Storage)?
            {
                Some(existing) => Ok(self.replay(existing, callback_url)),
                None => {
                    error!(code = %code, long_url = %url, "Code collision between distinct URLs");
                    let error = HandleError::Collision { code };
                    let notice = CompletionNotice::failure(&url, error.to_string());
                    self.notify(callback_url, notice);
                    Err(error)
                }
            },
            Err(e) => Err(HandleError::Storage(e)),
        }
    }

    /// Resolves a bare code or a full short URL to its record.
    ///
    /// # Errors
    ///
    /// - [`AppError::Validation`] if no code can be extracted
    /// - [`AppError::NotFound`] if the code is unknown
    /// - [`AppError::Internal`] on database errors
    pub async fn decode(&self, short: &str) -> Result<ShortLink, AppError> {
        let code = self.extract_code(short)?;
        let key = cache_key(code);

        match self.cache.get(&key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<ShortLink>(&bytes) {
                Ok(link) => {
                    metrics::counter!("decode_cache_hits_total").increment(1);
                    debug!(code, "Decode served from cache");
                    return Ok(link);
                }
                Err(e) => warn!(code, error = %e, "Discarding unreadable cache entry"),
            },
            Ok(None) => {}
            Err(e) => warn!(code, error = %e, "Cache read failed, falling back to database"),
        }
        metrics::counter!("decode_cache_misses_total").increment(1);

        let link = self
            .repository
            .find_by_code(code)
            .await?
            .ok_or_else(|| AppError::not_found("Short URL not found", json!({ "code": code })))?;

        self.populate_cache(key, &link);
        Ok(link)
    }

    /// Looks a record up by its exact long URL, bypassing the cache.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] if no record exists.
    pub async fn get_by_long_url(&self, long_url: &str) -> Result<ShortLink, AppError> {
        self.repository
            .find_by_long_url(long_url)
            .await?
            .ok_or_else(|| {
                AppError::not_found("Long URL not found", json!({ "long_url": long_url }))
            })
    }

    pub async fn storage_healthy(&self) -> bool {
        self.repository.health_check().await
    }

    pub async fn cache_healthy(&self) -> bool {
        self.cache.health_check().await
    }

    fn extract_code<'a>(&self, short: &'a str) -> Result<&'a str, AppError> {
        let short = short.trim();
        let host = self.settings.redirect_host.trim_end_matches('/');

        let code = short
            .strip_prefix(host)
            .unwrap_or(short)
            .trim_start_matches('/');

        if code.is_empty() {
            return Err(AppError::bad_request(
                "Short URL has no code",
                json!({ "shorten_url": short }),
            ));
        }
        Ok(code)
    }

    fn replay(&self, existing: ShortLink, callback_url: Option<String>) -> HandleOutcome {
        info!(code = %existing.code, long_url = %existing.long_url, "Replayed submission");
        metrics::counter!("shortlinks_replayed_total").increment(1);

        let notice = CompletionNotice::success(
            existing.status,
            &existing.long_url,
            self.short_url(&existing.code),
            existing.code.clone(),
        );
        self.notify(callback_url, notice);
        HandleOutcome::Replayed(existing)
    }

    /// Queues delivery of `notice`; failures are only logged.
    ///
    /// Never waits for a background slot, so the handler finishes well inside
    /// the pending idle time. A notice that finds every slot busy is dropped.
    fn notify(&self, callback_url: Option<String>, notice: CompletionNotice) {
        let (Some(callback_url), Some(notifier)) = (callback_url, self.notifier.clone()) else {
            return;
        };

        let url = callback_url.clone();
        let queued = self.background.try_spawn("notify", async move {
            if let Err(e) = notifier.notify(&callback_url, &notice).await {
                warn!(%callback_url, error = %e, "Completion notification failed");
                metrics::counter!("notifications_failed_total").increment(1);
            }
        });
        if !queued {
            warn!(
                callback_url = %url,
                "Background slots exhausted, completion notification dropped"
            );
            metrics::counter!("notifications_failed_total").increment(1);
        }
    }

    fn populate_cache(&self, key: String, link: &ShortLink) {
        let bytes = match serde_json::to_vec(link) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(code = %link.code, error = %e, "Failed to serialize cache entry");
                return;
            }
        };

        let cache = self.cache.clone();
        let ttl = self.settings.cache_ttl;
        self.background.try_spawn("cache-populate", async move {
            if let Err(e) = cache.set(&key, &bytes, ttl).await {
                debug!(key = %key, error = %e, "Cache write failed");
            }
        });
    }
}

#[async_trait]
impl MessageHandler for ShortenService {
    async fn handle(&self, message: &StreamMessage) -> Result<(), HandlerError> {
        match self.handle_message(&message.payload).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_permanent() => Err(HandlerError::Permanent(e.to_string())),
            Err(e) => Err(HandlerError::Retryable(e.to_string())),
        }
    }
}
