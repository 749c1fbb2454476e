#[cfg(feature = "server")]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
#[cfg(feature = "server")]
use serde_json::json;
use thiserror::Error;

/// Public error contract of the favicon lookup.
#[derive(Error, Debug)]
pub enum FaviconError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported scheme: {0} (only http and https are allowed)")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    EmptyHost,

    #[error("Host too long: {0} characters (max 255)")]
    HostTooLong(usize),

    #[error("Upstream lookup rate limited, retry later")]
    RateLimited,

    #[error("Favicon resolution failed: {0}")]
    ResolutionFailed(#[source] FetchError),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FaviconError {
    /// Input validation failures, decided locally before any I/O.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            FaviconError::InvalidUrl(_)
                | FaviconError::UnsupportedScheme(_)
                | FaviconError::EmptyHost
                | FaviconError::HostTooLong(_)
        )
    }

    /// Short label used for logging and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            FaviconError::InvalidUrl(_) => "invalid_url",
            FaviconError::UnsupportedScheme(_) => "unsupported_scheme",
            FaviconError::EmptyHost => "empty_host",
            FaviconError::HostTooLong(_) => "host_too_long",
            FaviconError::RateLimited => "rate_limited",
            FaviconError::ResolutionFailed(e) => e.kind(),
            FaviconError::ConfigError(_) => "config",
            FaviconError::Internal(_) => "internal",
        }
    }
}

/// Failures of the upstream icon lookup. Kept for diagnostics; callers of
/// `get_favicon` only see them wrapped in `FaviconError::ResolutionFailed`.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Upstream returned HTTP {0}")]
    UpstreamHttp(reqwest::StatusCode),

    #[error("Upstream response could not be parsed: {0}")]
    UpstreamParse(String),

    #[error("Too many redirects")]
    TooManyRedirects,

    #[error("Upstream request timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Transport(reqwest::Error),
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::UpstreamHttp(_) => "upstream_http",
            FetchError::UpstreamParse(_) => "upstream_parse",
            FetchError::TooManyRedirects => "too_many_redirects",
            FetchError::Timeout => "timeout",
            FetchError::Transport(_) => "transport",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_redirect() {
            FetchError::TooManyRedirects
        } else if e.is_decode() {
            FetchError::UpstreamParse(e.to_string())
        } else {
            FetchError::Transport(e)
        }
    }
}

/// Cache store failures. Never surfaced by the lookup itself.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache entry already exists for host: {0}")]
    Duplicate(String),
}

#[cfg(feature = "server")]
impl IntoResponse for FaviconError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ref e if e.is_validation() => (StatusCode::BAD_REQUEST, self.to_string()),
            FaviconError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
            FaviconError::ResolutionFailed(_) => {
                (StatusCode::BAD_GATEWAY, "Favicon resolution failed".to_string())
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string()),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}
