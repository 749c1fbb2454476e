//! # Favicon Service Library
//!
//! Resolves arbitrary page URLs to display icons for a new-tab page.
//!
//! ## Features
//!
//! - Strict URL validation (http/https only, bounded host length)
//! - Persistent cache keyed by host, with one level of parent-domain fallback
//! - Token-bucket protection of the upstream icon provider
//! - Timeout, redirect and body-size bounds on every upstream call
//! - Best-effort cache writes: a store outage never fails a lookup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use favicon_service::{Config, FaviconService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(Config::load()?);
//!     let service = FaviconService::from_config(config).await?;
//!     let icon = service.get_favicon("https://wiki.example.com/page").await?;
//!
//!     println!("{} -> {}", icon.title, icon.image_url);
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod database;
pub mod errors;
pub mod favicon;
pub mod host;
pub mod provider;
pub mod rate_limit;

// Re-export main types for easy access
pub use cache::{FaviconCacheEntry, FaviconStore, MemoryStore};
pub use config::Config;
pub use database::SqliteStore;
pub use errors::{FaviconError, FetchError, StoreError};
pub use favicon::{FaviconService, IconSource, Resolution};
pub use provider::{HttpIconProvider, IconProvider};
pub use rate_limit::UpstreamLimiter;

/// Display icon for a site.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IconInfo {
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "imgUrl")]
    pub image_url: String,
    #[serde(rename = "bgColor")]
    pub background_color: String,
    pub mime_type: String,
}
