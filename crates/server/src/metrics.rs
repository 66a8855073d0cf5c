//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the tankobon server:
//! - HTTP request metrics (latency, counts, in flight)
//! - Library state (collected dynamically)
//! - Core scan and reconciliation metrics, registered from `tankobon_core::metrics`

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "tankobon_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("tankobon_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "tankobon_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Library Metrics (collected dynamically)
// =============================================================================

/// Scan running state (1 = running, 0 = idle).
pub static SCAN_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "tankobon_scan_running",
        "Whether a library scan is running (1) or idle (0)",
    )
    .unwrap()
});

/// Cataloged manga.
pub static MANGA_CATALOGED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("tankobon_manga_cataloged", "Number of manga in the catalog").unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Library
    registry.register(Box::new(SCAN_RUNNING.clone())).unwrap();
    registry
        .register(Box::new(MANGA_CATALOGED.clone()))
        .unwrap();

    // Core metrics (scans, store, reconciliation, external services)
    for metric in tankobon_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// This is called before encoding metrics to update gauges with current values.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    SCAN_RUNNING.set(if state.scanner().is_running() { 1 } else { 0 });

    if let Ok(mangas) = state.catalog().all_mangas() {
        MANGA_CATALOGED.set(mangas.len() as i64);
    }
}

static NUMERIC_SEGMENT: Lazy<regex_lite::Regex> =
    Lazy::new(|| regex_lite::Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace ids and chapter/page numbers
/// with placeholders).
pub fn normalize_path(path: &str) -> String {
    // A match consumes its trailing slash, so adjacent numeric segments need a second pass.
    let result = NUMERIC_SEGMENT.replace_all(path, "/{id}$1");
    NUMERIC_SEGMENT.replace_all(&result, "/{id}$1").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_numeric() {
        assert_eq!(normalize_path("/api/v1/manga/12345"), "/api/v1/manga/{id}");
    }

    #[test]
    fn test_normalize_path_numeric_middle() {
        assert_eq!(
            normalize_path("/api/v1/manga/3/chapters/12/pages/4"),
            "/api/v1/manga/{id}/chapters/{id}/pages/{id}"
        );
    }

    #[test]
    fn test_normalize_path_no_ids() {
        assert_eq!(normalize_path("/api/v1/health"), "/api/v1/health");
        assert_eq!(normalize_path("/api/v1/sources/Mangadex/manga"), "/api/v1/sources/Mangadex/manga");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("tankobon_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_all_metrics() {
        HTTP_REQUEST_DURATION
            .with_label_values(&["GET", "/test", "200"])
            .observe(0.1);
        HTTP_REQUESTS_IN_FLIGHT.set(0);
        SCAN_RUNNING.set(0);
        MANGA_CATALOGED.set(0);
        tankobon_core::metrics::CHAPTERS_ADDED.inc_by(0);

        let output = encode_metrics();

        assert!(output.contains("tankobon_http_request_duration_seconds"));
        assert!(output.contains("tankobon_http_requests_in_flight"));
        assert!(output.contains("tankobon_scan_running"));
        assert!(output.contains("tankobon_manga_cataloged"));
        assert!(output.contains("tankobon_chapters_added_total"));
    }
}
