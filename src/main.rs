use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc, time::Instant};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use favicon_service::{
    config::Config, errors::FaviconError, favicon::FaviconService, IconInfo, IconSource,
};

mod metrics;

/// `udId` of icons resolved through the favicon cache/provider, as opposed to
/// curated catalogue icons which carry positive ids.
const RESOLVED_ICON_ID: i64 = -1;

#[derive(Clone)]
pub struct AppState {
    favicon_service: Arc<FaviconService>,
    config: Arc<Config>,
}

#[derive(Deserialize)]
struct FaviconQuery {
    /// Page URL to resolve, e.g. "https://wiki.example.com/page"
    #[serde(default)]
    url: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FaviconResponse {
    #[serde(rename = "udId")]
    ud_id: i64,
    title: String,
    /// Always a string on the wire; a missing description is sent as "".
    description: String,
    url: String,
    #[serde(rename = "imgUrl")]
    image_url: String,
    #[serde(rename = "bgColor")]
    background_color: String,
    mime_type: String,
    cached: bool,
}

impl FaviconResponse {
    fn new(url: String, icon: IconInfo, cached: bool) -> Self {
        Self {
            ud_id: RESOLVED_ICON_ID,
            title: icon.title,
            description: icon.description.unwrap_or_default(),
            url,
            image_url: icon.image_url,
            background_color: icon.background_color,
            mime_type: icon.mime_type,
            cached,
        }
    }
}

/// Response envelope expected by the new-tab extension.
#[derive(Serialize)]
struct Envelope<T> {
    msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "favicon_service=info,tower_http=debug".into()),
        )
        .init();

    let config = Arc::new(Config::load()?);
    info!("Configuration loaded successfully");

    let favicon_service = Arc::new(FaviconService::from_config(config.clone()).await?);

    metrics::init_metrics();

    let app_state = AppState {
        favicon_service,
        config: config.clone(),
    };

    let app = Router::new()
        .route("/icon/byurl", get(icon_by_url))
        .route("/favicon", get(favicon_lookup).post(favicon_lookup_post))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive())
                .into_inner(),
        )
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!("Favicon service listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("Metrics: http://{}/metrics", addr);

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, gracefully shutting down...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}

/// Extension-facing lookup. Failures are soft: the extension renders its own
/// placeholder when `data` is absent.
async fn icon_by_url(Query(params): Query<FaviconQuery>, State(state): State<AppState>) -> Response {
    let url = match params.url.filter(|u| !u.trim().is_empty()) {
        Some(url) => url,
        None => {
            let body = Envelope::<FaviconResponse> {
                msg: "url is required".to_string(),
                data: None,
            };
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };

    let data = match lookup(&state, url).await {
        Ok(response) => Some(response),
        Err(e) => {
            warn!("Icon lookup failed, returning empty result: {}", e);
            None
        }
    };

    Json(Envelope {
        msg: "success".to_string(),
        data,
    })
    .into_response()
}

async fn favicon_lookup(
    Query(params): Query<FaviconQuery>,
    State(state): State<AppState>,
) -> Result<Json<FaviconResponse>, FaviconError> {
    let url = params
        .url
        .ok_or_else(|| FaviconError::InvalidUrl("missing url parameter".to_string()))?;
    lookup(&state, url).await.map(Json)
}

async fn favicon_lookup_post(
    State(state): State<AppState>,
    Json(payload): Json<FaviconQuery>,
) -> Result<Json<FaviconResponse>, FaviconError> {
    favicon_lookup(Query(payload), State(state)).await
}

// Shared by both endpoints so metrics are recorded once per lookup
async fn lookup(state: &AppState, url: String) -> Result<FaviconResponse, FaviconError> {
    let start_time = Instant::now();
    metrics::increment_requests();

    let resolution = match state.favicon_service.resolve(&url).await {
        Ok(resolution) => resolution,
        Err(e) => {
            metrics::increment_errors(e.kind());
            return Err(e);
        }
    };

    match &resolution.source {
        IconSource::Cache { matched_host } if *matched_host == resolution.host => {
            metrics::increment_cache_hits("exact")
        }
        IconSource::Cache { .. } => metrics::increment_cache_hits("parent"),
        IconSource::Upstream => metrics::increment_cache_misses(),
    }
    metrics::record_query_time(start_time.elapsed().as_millis() as u64);

    let cached = resolution.cached();
    Ok(FaviconResponse::new(url, resolution.icon, cached))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.config.start_time.elapsed().as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn icon(description: Option<&str>) -> IconInfo {
        IconInfo {
            title: "Example".to_string(),
            description: description.map(str::to_string),
            image_url: "https://img.example.net/e.png".to_string(),
            background_color: "#ffffff".to_string(),
            mime_type: "image/png".to_string(),
        }
    }

    #[test]
    fn test_missing_description_is_empty_string() {
        let response = FaviconResponse::new("https://example.com/".to_string(), icon(None), false);
        let json = serde_json::to_value(Envelope {
            msg: "success".to_string(),
            data: Some(response),
        })
        .unwrap();

        assert_eq!(json["data"]["description"], "");
        assert_eq!(json["data"]["udId"], -1);
        assert_eq!(json["data"]["imgUrl"], "https://img.example.net/e.png");
        assert_eq!(json["data"]["bgColor"], "#ffffff");
        assert_eq!(json["data"]["mimeType"], "image/png");
    }

    #[test]
    fn test_description_passed_through() {
        let response = FaviconResponse::new("https://example.com/".to_string(), icon(Some("Docs")), true);
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["description"], "Docs");
        assert_eq!(json["cached"], true);
    }

    #[test]
    fn test_failed_lookup_envelope_has_no_data() {
        let json = serde_json::to_value(Envelope::<FaviconResponse> {
            msg: "success".to_string(),
            data: None,
        })
        .unwrap();

        assert_eq!(json, serde_json::json!({ "msg": "success" }));
    }
}
