#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use stream_shortener::application::services::{ShortenService, ShortenSettings};
use stream_shortener::concurrency::BoundedSpawner;
use stream_shortener::domain::entities::{CompletionNotice, NewShortLink, ShortLink};
use stream_shortener::domain::repositories::ShortLinkRepository;
use stream_shortener::error::AppError;
use stream_shortener::infrastructure::cache::{CacheResult, CacheService};
use stream_shortener::infrastructure::notify::{CompletionNotifier, NotifyError};
use stream_shortener::infrastructure::stream::MemoryStream;
use stream_shortener::state::AppState;
use stream_shortener::utils::code_generator::Base62Encoder;
use stream_shortener::utils::url_validator::{BlockList, StaticResolver, UrlValidator};

pub const SECRET: &str = "s3cr3t";
pub const CODE_LENGTH: usize = 8;
pub const QUEUE: &str = "shorten-url-stream";
pub const HOST: &str = "http://localhost:8080";
pub const CALLBACK: &str = "https://hooks.example.net/done";

/// Repository that enforces the same uniqueness rules as the database.
#[derive(Default)]
pub struct InMemoryRepository {
    links: Mutex<Vec<ShortLink>>,
    pub saves: AtomicUsize,
    pub healthy: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        let repo = Self::default();
        repo.healthy.store(true, Ordering::SeqCst);
        repo
    }

    pub async fn all(&self) -> Vec<ShortLink> {
        self.links.lock().await.clone()
    }

    pub async fn insert(&self, new_link: NewShortLink) -> ShortLink {
        self.save(new_link).await.unwrap()
    }
}

#[async_trait]
impl ShortLinkRepository for InMemoryRepository {
    async fn save(&self, new_link: NewShortLink) -> Result<ShortLink, AppError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        let mut links = self.links.lock().await;

        if links
            .iter()
            .any(|l| l.code == new_link.code || l.long_url == new_link.long_url)
        {
            return Err(AppError::conflict(
                "Unique constraint violation",
                json!({ "constraint": "shorten_urls_code_key" }),
            ));
        }

        let now = Utc::now();
        let link = ShortLink {
            id: links.len() as i64 + 1,
            created_at: now,
            updated_at: now,
            status: new_link.status,
            code: new_link.code,
            algo: new_link.algo,
            long_url: new_link.long_url,
        };
        links.push(link.clone());
        Ok(link)
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<ShortLink>, AppError> {
        Ok(self
            .links
            .lock()
            .await
            .iter()
            .find(|l| l.code == code)
            .cloned())
    }

    async fn find_by_long_url(&self, long_url: &str) -> Result<Option<ShortLink>, AppError> {
        Ok(self
            .links
            .lock()
            .await
            .iter()
            .find(|l| l.long_url == long_url)
            .cloned())
    }

    async fn health_check(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

/// Byte cache that counts reads and hits.
#[derive(Default)]
pub struct CountingCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    pub gets: AtomicUsize,
    pub hits: AtomicUsize,
}

impl CountingCache {
    pub async fn contains(&self, key: &str) -> bool {
        self.entries.lock().await.contains_key(key)
    }
}

#[async_trait]
impl CacheService for CountingCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let value = self.entries.lock().await.get(key).cloned();
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], _ttl: Duration) -> CacheResult<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Notifier that records every notice instead of sending it.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, CompletionNotice)>>,
}

#[async_trait]
impl CompletionNotifier for RecordingNotifier {
    async fn notify(&self, callback_url: &str, notice: &CompletionNotice) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .await
            .push((callback_url.to_string(), notice.clone()));
        Ok(())
    }
}

/// Validator with a fixed host table: public hosts resolve to a public
/// address, `internal.example.com` to a private one.
pub fn test_validator() -> UrlValidator {
    let public = IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34));
    let private = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));
    let resolver = StaticResolver::new()
        .with_host("example.com", &[public])
        .with_host("www.example.org", &[public])
        .with_host("hooks.example.net", &[public])
        .with_host("internal.example.com", &[private]);

    UrlValidator::new(BlockList::reserved(), Arc::new(resolver))
}

/// A service wired to in-memory collaborators.
pub struct TestApp {
    pub service: Arc<ShortenService>,
    pub stream: Arc<MemoryStream>,
    pub repository: Arc<InMemoryRepository>,
    pub cache: Arc<CountingCache>,
    pub notifier: Arc<RecordingNotifier>,
    pub background: Arc<BoundedSpawner>,
}

impl TestApp {
    pub fn new() -> Self {
        let stream = Arc::new(MemoryStream::new());
        let repository = Arc::new(InMemoryRepository::new());
        let cache = Arc::new(CountingCache::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let background = Arc::new(BoundedSpawner::new(8));

        let settings = ShortenSettings {
            queue_name: QUEUE.to_string(),
            redirect_host: HOST.to_string(),
            cache_ttl: Duration::from_secs(60),
        };

        let service = ShortenService::new(
            settings,
            repository.clone(),
            stream.clone(),
            cache.clone(),
            Arc::new(encoder()),
            test_validator(),
            background.clone(),
        )
        .with_notifier(notifier.clone());

        Self {
            service: Arc::new(service),
            stream,
            repository,
            cache,
            notifier,
            background,
        }
    }

    pub fn state(&self) -> AppState {
        AppState::new(self.service.clone())
    }
}

pub fn encoder() -> Base62Encoder {
    Base62Encoder::new(SECRET, CODE_LENGTH).unwrap()
}

/// Polls `check` until it returns true or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
