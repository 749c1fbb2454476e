use axum::{http::StatusCode, response::IntoResponse};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn init_metrics() {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("Metrics recorder already initialized");
                return;
            }

            // Initialize metrics with zero values
            counter!("favicon_requests_total").absolute(0);
            counter!("favicon_cache_hits_total", "level" => "exact").absolute(0);
            counter!("favicon_cache_hits_total", "level" => "parent").absolute(0);
            counter!("favicon_cache_misses_total").absolute(0);
            counter!("favicon_errors_total", "error_type" => "unknown").absolute(0);
            histogram!("favicon_request_duration_seconds").record(0.0);
        }
        Err(e) => {
            tracing::error!("Failed to install metrics recorder: {}", e);
        }
    }
}

pub fn increment_requests() {
    counter!("favicon_requests_total").increment(1);
}

/// `level` is "exact" or "parent".
pub fn increment_cache_hits(level: &'static str) {
    counter!("favicon_cache_hits_total", "level" => level).increment(1);
}

pub fn increment_cache_misses() {
    counter!("favicon_cache_misses_total").increment(1);
}

pub fn increment_errors(error_type: &'static str) {
    counter!("favicon_errors_total", "error_type" => error_type).increment(1);
}

pub fn record_query_time(duration_ms: u64) {
    let duration_seconds = duration_ms as f64 / 1000.0;
    histogram!("favicon_request_duration_seconds").record(duration_seconds);
}

pub async fn metrics_handler() -> impl IntoResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::SERVICE_UNAVAILABLE, "Metrics not initialized".to_string()),
    }
}
