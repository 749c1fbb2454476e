use crate::{
    cache::{FaviconCacheEntry, FaviconStore, MemoryStore},
    config::Config,
    database::SqliteStore,
    errors::{FaviconError, StoreError},
    host::{normalize_host, probe_hosts},
    provider::{HttpIconProvider, IconProvider},
    rate_limit::UpstreamLimiter,
    IconInfo,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Resolves page URLs to display icons: cache first (with one level of parent
/// domain fallback), then a rate-limited upstream lookup whose result is
/// cached on a best-effort basis.
///
/// Holds no mutable state of its own; share it behind an `Arc`.
pub struct FaviconService {
    store: Arc<dyn FaviconStore>,
    provider: Arc<dyn IconProvider>,
    limiter: Arc<UpstreamLimiter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconSource {
    /// Served from the cache entry stored under `matched_host`.
    Cache { matched_host: String },
    /// Fetched from the provider during this call.
    Upstream,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub icon: IconInfo,
    /// Normalized host of the input URL.
    pub host: String,
    pub source: IconSource,
}

impl Resolution {
    pub fn cached(&self) -> bool {
        matches!(self.source, IconSource::Cache { .. })
    }
}

impl FaviconService {
    pub fn new(
        store: Arc<dyn FaviconStore>,
        provider: Arc<dyn IconProvider>,
        limiter: Arc<UpstreamLimiter>,
    ) -> Self {
        Self { store, provider, limiter }
    }

    /// Wire up the HTTP provider, the limiter and the store named by
    /// `database_url` (in-memory when empty).
    pub async fn from_config(config: Arc<Config>) -> Result<Self, FaviconError> {
        config.validate()?;

        let store: Arc<dyn FaviconStore> = if config.database_url.is_empty() {
            info!("No database configured, using in-memory favicon cache");
            Arc::new(MemoryStore::default())
        } else {
            Arc::new(
                SqliteStore::connect(&config.database_url)
                    .await
                    .map_err(|e| FaviconError::Internal(format!("Failed to open favicon cache: {}", e)))?,
            )
        };

        let provider = Arc::new(HttpIconProvider::from_config(&config)?);
        let limiter = Arc::new(UpstreamLimiter::from_config(&config)?);

        info!(
            "FaviconService initialized (upstream limit {}/s, burst {})",
            config.rate_limit_per_second, config.rate_limit_burst
        );
        Ok(Self::new(store, provider, limiter))
    }

    /// Icon for `url`.
    pub async fn get_favicon(&self, url: &str) -> Result<IconInfo, FaviconError> {
        self.resolve(url).await.map(|resolution| resolution.icon)
    }

    /// Like [`get_favicon`](Self::get_favicon), also reporting where the icon
    /// came from.
    pub async fn resolve(&self, url: &str) -> Result<Resolution, FaviconError> {
        let host = normalize_host(url)?;

        if let Some(entry) = self.find_cached(&host).await {
            debug!("Favicon cache hit for {} (stored under {})", host, entry.host);
            return Ok(Resolution {
                icon: entry.to_icon(),
                host,
                source: IconSource::Cache { matched_host: entry.host },
            });
        }

        info!("Favicon cache miss for {}, querying provider", host);

        if !self.limiter.allow() {
            warn!("Provider lookup for {} rate limited", host);
            return Err(FaviconError::RateLimited);
        }

        let icon = self.provider.fetch(&host).await.map_err(|e| {
            warn!("Failed to fetch favicon for {} ({}): {}", host, e.kind(), e);
            FaviconError::ResolutionFailed(e)
        })?;

        // Best-effort: a failed write still returns the fetched icon.
        if let Err(e) = self.persist(&host, &icon).await {
            warn!("Failed to cache favicon for {}: {}", host, e);
        }

        Ok(Resolution {
            icon,
            host,
            source: IconSource::Upstream,
        })
    }

    /// First hit along the probe order. Read errors count as misses.
    async fn find_cached(&self, host: &str) -> Option<FaviconCacheEntry> {
        for probe in probe_hosts(host) {
            match self.store.find_by_host(&probe).await {
                Ok(Some(entry)) => return Some(entry),
                Ok(None) => {}
                Err(e) => {
                    warn!("Favicon cache read error for {}: {}", probe, e);
                }
            }
        }
        None
    }

    async fn persist(&self, host: &str, icon: &IconInfo) -> Result<(), StoreError> {
        self.store.create(&FaviconCacheEntry::new(host, icon)).await?;
        info!("Cached favicon for {}", host);
        Ok(())
    }
}
