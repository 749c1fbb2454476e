//! Upstream icon lookup.
//!
//! The provider answers `GET <endpoint>?url=<host>` with
//! `{"msg": "success", "data": {"icon": {...}}}`. Any other `msg` is a failure.
//! Requests are bounded by a timeout, a redirect limit and a body size cap.

use crate::{
    cache::{or_default, DEFAULT_BG_COLOR, DEFAULT_MIME_TYPE},
    config::Config,
    errors::{FaviconError, FetchError},
    IconInfo,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const SUCCESS_MSG: &str = "success";

/// Source of icon metadata for a host. The orchestrator only ever talks to
/// this trait, so alternate upstreams can be plugged in.
#[async_trait]
pub trait IconProvider: Send + Sync {
    async fn fetch(&self, host: &str) -> Result<IconInfo, FetchError>;
}

#[derive(Debug, Clone, Copy)]
pub struct FetchLimits {
    pub timeout: Duration,
    pub max_redirects: usize,
    pub max_body_bytes: usize,
}

impl FetchLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.fetch_timeout(),
            max_redirects: config.max_redirects,
            max_body_bytes: config.max_response_size,
        }
    }
}

pub struct HttpIconProvider {
    client: reqwest::Client,
    endpoint: Url,
    max_body_bytes: usize,
}

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    #[serde(default)]
    msg: String,
    data: Option<ProviderData>,
}

#[derive(Debug, Deserialize)]
struct ProviderData {
    icon: Option<ProviderIcon>,
}

#[derive(Debug, Deserialize)]
struct ProviderIcon {
    #[serde(default)]
    title: String,
    description: Option<String>,
    #[serde(rename = "imgUrl", default)]
    img_url: String,
    #[serde(rename = "bgColor", default)]
    bg_color: String,
    #[serde(rename = "mimeType", default)]
    mime_type: String,
}

impl HttpIconProvider {
    pub fn new(endpoint: &str, limits: FetchLimits, user_agent: &str) -> Result<Self, FaviconError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| FaviconError::Internal(format!("Invalid provider URL '{}': {}", endpoint, e)))?;

        let client = reqwest::Client::builder()
            .timeout(limits.timeout)
            .redirect(reqwest::redirect::Policy::limited(limits.max_redirects))
            .user_agent(user_agent)
            .gzip(true)
            .build()
            .map_err(|e| FaviconError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        info!(
            "Icon provider initialized: {} (timeout {:?}, {} redirects, {} byte body cap)",
            endpoint, limits.timeout, limits.max_redirects, limits.max_body_bytes
        );

        Ok(Self {
            client,
            endpoint,
            max_body_bytes: limits.max_body_bytes,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, FaviconError> {
        Self::new(&config.favicon_api_url, FetchLimits::from_config(config), &config.user_agent)
    }

    fn request_url(&self, host: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("url", host);
        url
    }

    /// Read at most `max_body_bytes`; anything past the cap is never pulled
    /// off the wire, whatever `Content-Length` claims.
    async fn read_capped(&self, mut response: reqwest::Response) -> Result<Vec<u8>, FetchError> {
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let remaining = self.max_body_bytes - body.len();
            if chunk.len() >= remaining {
                body.extend_from_slice(&chunk[..remaining]);
                debug!("Provider response reached the {} byte cap", self.max_body_bytes);
                break;
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait]
impl IconProvider for HttpIconProvider {
    async fn fetch(&self, host: &str) -> Result<IconInfo, FetchError> {
        let url = self.request_url(host);
        debug!("Querying icon provider: {}", url);

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                warn!("Icon provider request for {} failed: {}", host, e);
                FetchError::from(e)
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            warn!("Icon provider returned status {} for {}", status, host);
            return Err(FetchError::UpstreamHttp(status));
        }

        let body = self.read_capped(response).await?;
        debug!("Icon provider response length: {} bytes", body.len());

        let icon = parse_provider_response(&body).map_err(|e| {
            warn!("Icon provider response for {} rejected: {}", host, e);
            e
        })?;

        info!("Fetched icon for {} from provider: {}", host, icon.title);
        Ok(icon)
    }
}

fn parse_provider_response(body: &[u8]) -> Result<IconInfo, FetchError> {
    let parsed: ProviderResponse =
        serde_json::from_slice(body).map_err(|e| FetchError::UpstreamParse(e.to_string()))?;

    if parsed.msg != SUCCESS_MSG {
        return Err(FetchError::UpstreamParse(format!("provider reported '{}'", parsed.msg)));
    }

    let icon = parsed
        .data
        .and_then(|d| d.icon)
        .ok_or_else(|| FetchError::UpstreamParse("missing data.icon".to_string()))?;

    Ok(IconInfo {
        title: icon.title,
        description: icon.description.filter(|d| !d.is_empty()),
        image_url: icon.img_url,
        background_color: or_default(&icon.bg_color, DEFAULT_BG_COLOR),
        mime_type: or_default(&icon.mime_type, DEFAULT_MIME_TYPE),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SUCCESS_BODY: &str = r##"{"msg":"success","data":{"icon":{"title":"T","imgUrl":"u","bgColor":"#fff","mimeType":"image/png"}}}"##;

    fn limits() -> FetchLimits {
        FetchLimits {
            timeout: Duration::from_secs(5),
            max_redirects: 5,
            max_body_bytes: 1 << 20,
        }
    }

    fn provider(server: &MockServer, limits: FetchLimits) -> HttpIconProvider {
        HttpIconProvider::new(&format!("{}/icon", server.uri()), limits, "favicon-service-test").unwrap()
    }

    #[test]
    fn test_parse_success() {
        let icon = parse_provider_response(SUCCESS_BODY.as_bytes()).unwrap();
        assert_eq!(icon.title, "T");
        assert_eq!(icon.description, None);
        assert_eq!(icon.image_url, "u");
        assert_eq!(icon.background_color, "#fff");
        assert_eq!(icon.mime_type, "image/png");
    }

    #[test]
    fn test_parse_fills_defaults() {
        let body = r#"{"msg":"success","data":{"icon":{"title":"T","imgUrl":"u"}}}"#;
        let icon = parse_provider_response(body.as_bytes()).unwrap();
        assert_eq!(icon.background_color, "#ffffff");
        assert_eq!(icon.mime_type, "image/png");
    }

    #[test]
    fn test_parse_rejects_failure_msg() {
        let body = r#"{"msg":"not found","data":null}"#;
        assert!(matches!(parse_provider_response(body.as_bytes()), Err(FetchError::UpstreamParse(_))));
        assert!(matches!(parse_provider_response(b"{}"), Err(FetchError::UpstreamParse(_))));
        assert!(matches!(parse_provider_response(b"<html>"), Err(FetchError::UpstreamParse(_))));
        assert!(matches!(
            parse_provider_response(br#"{"msg":"success","data":{}}"#),
            Err(FetchError::UpstreamParse(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_sends_host_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/icon"))
            .and(query_param("url", "wiki.example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SUCCESS_BODY))
            .expect(1)
            .mount(&server)
            .await;

        let icon = provider(&server, limits()).fetch("wiki.example.com").await.unwrap();
        assert_eq!(icon.title, "T");
    }

    #[tokio::test]
    async fn test_non_200_is_upstream_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = provider(&server, limits()).fetch("example.com").await.unwrap_err();
        assert!(matches!(err, FetchError::UpstreamHttp(s) if s.as_u16() == 503));
    }

    #[tokio::test]
    async fn test_non_200_success_status_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let err = provider(&server, limits()).fetch("example.com").await.unwrap_err();
        assert!(matches!(err, FetchError::UpstreamHttp(s) if s.as_u16() == 204));
    }

    #[tokio::test]
    async fn test_bad_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"msg":"fail"}"#))
            .mount(&server)
            .await;

        let err = provider(&server, limits()).fetch("example.com").await.unwrap_err();
        assert!(matches!(err, FetchError::UpstreamParse(_)));
    }

    #[tokio::test]
    async fn test_redirect_chain_is_capped() {
        let server = MockServer::start().await;
        let base = server.uri();
        // Every hop points one level deeper, so the chain never ends
        Mock::given(method("GET"))
            .and(path_regex("^/icon"))
            .respond_with(move |req: &wiremock::Request| {
                let next = format!("{}{}/next", base, req.url.path());
                ResponseTemplate::new(302).insert_header("Location", next.as_str())
            })
            .mount(&server)
            .await;

        let err = provider(&server, limits()).fetch("example.com").await.unwrap_err();
        assert!(matches!(err, FetchError::TooManyRedirects), "got {:?}", err);
        let requests = server.received_requests().await.unwrap();
        assert!(requests.len() <= 6, "followed {} hops", requests.len());
    }

    #[tokio::test]
    async fn test_redirect_within_limit_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/icon"))
            .respond_with(
                ResponseTemplate::new(301).insert_header("Location", format!("{}/v2/icon", server.uri()).as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/icon"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SUCCESS_BODY))
            .mount(&server)
            .await;

        let icon = provider(&server, limits()).fetch("example.com").await.unwrap();
        assert_eq!(icon.image_url, "u");
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(SUCCESS_BODY)
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let limits = FetchLimits {
            timeout: Duration::from_millis(200),
            ..limits()
        };
        let err = provider(&server, limits).fetch("example.com").await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_body_beyond_cap_is_not_read() {
        let server = MockServer::start().await;
        // Valid JSON up front, padding after: the cap drops only the padding
        let padded = format!("{}{}", SUCCESS_BODY, " ".repeat(64 * 1024));
        Mock::given(method("GET"))
            .and(path("/icon"))
            .respond_with(ResponseTemplate::new(200).set_body_string(padded))
            .mount(&server)
            .await;

        let limits = FetchLimits {
            max_body_bytes: 1024,
            ..limits()
        };
        let icon = provider(&server, limits).fetch("example.com").await.unwrap();
        assert_eq!(icon.title, "T");
    }

    #[tokio::test]
    async fn test_oversized_document_truncated_to_parse_error() {
        let server = MockServer::start().await;
        let body = format!(
            r#"{{"msg":"success","data":{{"icon":{{"title":"{}","imgUrl":"u"}}}}}}"#,
            "x".repeat(4096)
        );
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let limits = FetchLimits {
            max_body_bytes: 512,
            ..limits()
        };
        let err = provider(&server, limits).fetch("example.com").await.unwrap_err();
        assert!(matches!(err, FetchError::UpstreamParse(_)));
    }
}
