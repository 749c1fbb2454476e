//! SQLite-backed favicon cache.

use crate::{
    cache::{FaviconCacheEntry, FaviconStore},
    errors::StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    FromRow, SqlitePool,
};
use std::str::FromStr;
use tracing::{debug, error, info};

pub struct SqliteStore {
    pool: SqlitePool,
}

#[derive(FromRow)]
struct FaviconCacheRow {
    host: String,
    title: String,
    description: Option<String>,
    img_url: String,
    bg_color: String,
    mime_type: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<FaviconCacheRow> for FaviconCacheEntry {
    fn from(row: FaviconCacheRow) -> Self {
        FaviconCacheEntry {
            host: row.host,
            title: row.title,
            description: row.description,
            image_url: row.img_url,
            background_color: row.bg_color,
            mime_type: row.mime_type,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl SqliteStore {
    /// Open (creating if needed) the database at `database_url` and make sure
    /// the `favicon_cache` table exists.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let store = Self::from_pool(pool).await?;
        info!("Favicon cache database ready at {}", database_url);
        Ok(store)
    }

    /// Wrap an existing pool, creating the table if it is missing.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        create_table(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn create_table(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS favicon_cache (
        id INTEGER PRIMARY KEY,
        host VARCHAR(255) NOT NULL,
        title VARCHAR(200) NOT NULL DEFAULT '',
        description TEXT,
        img_url VARCHAR(500) NOT NULL DEFAULT '',
        bg_color VARCHAR(20) NOT NULL DEFAULT '#ffffff',
        mime_type VARCHAR(50) NOT NULL DEFAULT 'image/png',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_favicon_cache_host ON favicon_cache (host)")
        .execute(pool)
        .await?;

    Ok(())
}

#[async_trait]
impl FaviconStore for SqliteStore {
    async fn find_by_host(&self, host: &str) -> Result<Option<FaviconCacheEntry>, StoreError> {
        let row = sqlx::query_as::<_, FaviconCacheRow>(
            "SELECT host, title, description, img_url, bg_color, mime_type, created_at, updated_at \
             FROM favicon_cache WHERE host = ? LIMIT 1",
        )
        .bind(host)
        .fetch_optional(&self.pool)
        .await?;

        debug!("Database lookup for host {}: {}", host, if row.is_some() { "hit" } else { "miss" });
        Ok(row.map(FaviconCacheEntry::from))
    }

    async fn create(&self, entry: &FaviconCacheEntry) -> Result<(), StoreError> {
        match sqlx::query(
            "INSERT INTO favicon_cache (\
                host, \
                title, \
                description, \
                img_url, \
                bg_color, \
                mime_type, \
                created_at, \
                updated_at\
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.host)
        .bind(&entry.title)
        .bind(&entry.description)
        .bind(&entry.image_url)
        .bind(&entry.background_color)
        .bind(&entry.mime_type)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await
        {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::Duplicate(entry.host.clone()))
            }
            Err(e) => {
                error!("Error when writing favicon cache entry for {}: {}", entry.host, e);
                Err(e.into())
            }
        }
    }
}
