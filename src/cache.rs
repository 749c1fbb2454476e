use crate::{errors::StoreError, IconInfo};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_BG_COLOR: &str = "#ffffff";
pub const DEFAULT_MIME_TYPE: &str = "image/png";

/// A persisted favicon, keyed by normalized host (no scheme, no port).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaviconCacheEntry {
    pub host: String,
    pub title: String,
    pub description: Option<String>,
    pub image_url: String,
    pub background_color: String,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FaviconCacheEntry {
    pub fn new(host: &str, icon: &IconInfo) -> Self {
        let now = Utc::now();
        Self {
            host: host.to_string(),
            title: icon.title.clone(),
            description: icon.description.clone(),
            image_url: icon.image_url.clone(),
            background_color: or_default(&icon.background_color, DEFAULT_BG_COLOR),
            mime_type: or_default(&icon.mime_type, DEFAULT_MIME_TYPE),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn to_icon(&self) -> IconInfo {
        IconInfo {
            title: self.title.clone(),
            description: self.description.clone(),
            image_url: self.image_url.clone(),
            background_color: self.background_color.clone(),
            mime_type: self.mime_type.clone(),
        }
    }
}

pub(crate) fn or_default(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

/// Keyed favicon store. Implementations handle their own concurrency.
#[async_trait]
pub trait FaviconStore: Send + Sync {
    async fn find_by_host(&self, host: &str) -> Result<Option<FaviconCacheEntry>, StoreError>;

    /// Insert-only. An existing entry for the same host is left untouched and
    /// reported as `StoreError::Duplicate`.
    async fn create(&self, entry: &FaviconCacheEntry) -> Result<(), StoreError>;
}

/// In-process store. Unbounded, with no TTL: entries live as long as the
/// process and are never evicted.
pub struct MemoryStore {
    cache: Cache<String, FaviconCacheEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let cache = Cache::builder().build();
        Self { cache }
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FaviconStore for MemoryStore {
    async fn find_by_host(&self, host: &str) -> Result<Option<FaviconCacheEntry>, StoreError> {
        match self.cache.get(host).await {
            Some(entry) => {
                debug!("Memory store hit for host: {}", host);
                Ok(Some(entry))
            }
            None => {
                debug!("Memory store miss for host: {}", host);
                Ok(None)
            }
        }
    }

    async fn create(&self, entry: &FaviconCacheEntry) -> Result<(), StoreError> {
        let inserted = self
            .cache
            .entry(entry.host.clone())
            .or_insert_with(async { entry.clone() })
            .await;

        if inserted.is_fresh() {
            debug!("Stored favicon for host: {}", entry.host);
            Ok(())
        } else {
            Err(StoreError::Duplicate(entry.host.clone()))
        }
    }
}
