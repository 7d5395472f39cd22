//! PostgreSQL implementation of the short link repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;

use crate::domain::entities::{NewShortLink, ShortLink};
use crate::domain::repositories::ShortLinkRepository;
use crate::error::AppError;

const COLUMNS: &str = "id, created_at, updated_at, status, code, algo, long_url";

/// PostgreSQL repository over the `shorten_urls` table.
///
/// Unique indexes on `code` and `long_url` back the repository contract; a
/// violation comes back as [`AppError::Conflict`].
pub struct PgShortLinkRepository {
    pool: Arc<PgPool>,
}

impl PgShortLinkRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<ShortLink>, AppError> {
        let sql = format!("SELECT {COLUMNS} FROM shorten_urls WHERE {column} = $1");
        let row: Option<ShortLinkRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(self.pool.as_ref())
            .await?;

        row.map(ShortLink::try_from).transpose()
    }
}

#[derive(sqlx::FromRow)]
struct ShortLinkRow {
    id: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    status: String,
    code: String,
    algo: String,
    long_url: String,
}

impl TryFrom<ShortLinkRow> for ShortLink {
    type Error = AppError;

    fn try_from(row: ShortLinkRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = |reason: String| {
            tracing::error!(id, %reason, "Unreadable short link row");
            AppError::internal("Corrupt short link record", json!({ "id": id }))
        };

        Ok(ShortLink {
            id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            status: row.status.parse().map_err(corrupt)?,
            algo: row.algo.parse().map_err(corrupt)?,
            code: row.code,
            long_url: row.long_url,
        })
    }
}

#[async_trait]
impl ShortLinkRepository for PgShortLinkRepository {
    async fn save(&self, new_link: NewShortLink) -> Result<ShortLink, AppError> {
        let sql = format!(
            "INSERT INTO shorten_urls (status, code, algo, long_url) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        let row: ShortLinkRow = sqlx::query_as(&sql)
            .bind(new_link.status.as_str())
            .bind(&new_link.code)
            .bind(new_link.algo.as_str())
            .bind(&new_link.long_url)
            .fetch_one(self.pool.as_ref())
            .await?;

        ShortLink::try_from(row)
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<ShortLink>, AppError> {
        self.find_one("code", code).await
    }

    async fn find_by_long_url(&self, long_url: &str) -> Result<Option<ShortLink>, AppError> {
        self.find_one("long_url", long_url).await
    }

    async fn health_check(&self) -> bool {
        match sqlx::query("SELECT 1").execute(self.pool.as_ref()).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Database health check failed");
                false
            }
        }
    }
}
