//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Library scanning (scans, manga and chapters added)
//! - Catalog store (id allocation contention)
//! - Reconciliation (outcomes, chapter misses, covers, provider calls)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Library Scanner Metrics
// =============================================================================

/// Library scans total by result.
pub static SCANS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("tankobon_scans_total", "Total library scans"),
        &["result"], // "completed", "rejected", "failed"
    )
    .unwrap()
});

/// Library scan duration in seconds.
pub static SCAN_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("tankobon_scan_duration_seconds", "Duration of library scans")
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0]),
        &[],
    )
    .unwrap()
});

/// Manga examined by the scanner, by decision.
pub static MANGA_SCANNED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("tankobon_manga_scanned_total", "Total manga directories examined"),
        &["decision"], // "added", "rescanned", "skipped", "failed"
    )
    .unwrap()
});

/// Chapters inserted into the catalog.
pub static CHAPTERS_ADDED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("tankobon_chapters_added_total", "Total chapters cataloged").unwrap()
});

/// Chapter archives that could not be read during a deep scan.
pub static ARCHIVE_ERRORS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "tankobon_archive_errors_total",
        "Total chapter archives that failed to open",
    )
    .unwrap()
});

// =============================================================================
// Catalog Store Metrics
// =============================================================================

/// Id allocations that lost an optimistic-concurrency race and retried.
pub static ID_ALLOCATION_CONFLICTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "tankobon_id_allocation_conflicts_total",
        "Total manga id allocation attempts that lost a race",
    )
    .unwrap()
});

// =============================================================================
// Reconciliation Metrics
// =============================================================================

/// Reconciliations total by result.
pub static RECONCILIATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("tankobon_reconciliations_total", "Total manga reconciliations"),
        &["result"], // "updated", "no_match", "failed"
    )
    .unwrap()
});

/// Local chapters with no matching remote chapter.
pub static RECONCILIATION_MISSES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "tankobon_reconciliation_misses_total",
        "Total local chapters without a remote match",
    )
    .unwrap()
});

/// Covers downloaded from the metadata provider.
pub static COVERS_DOWNLOADED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("tankobon_covers_downloaded_total", "Total covers downloaded").unwrap()
});

// =============================================================================
// External Service Metrics
// =============================================================================

/// External service request duration.
pub static EXTERNAL_SERVICE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "tankobon_external_service_duration_seconds",
            "Duration of external service calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["service", "operation"],
    )
    .unwrap()
});

/// External service requests total.
pub static EXTERNAL_SERVICE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "tankobon_external_service_requests_total",
            "Total external service requests",
        ),
        &["service", "operation", "status"], // status: "success", "error"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Scanner
        Box::new(SCANS_TOTAL.clone()),
        Box::new(SCAN_DURATION.clone()),
        Box::new(MANGA_SCANNED.clone()),
        Box::new(CHAPTERS_ADDED.clone()),
        Box::new(ARCHIVE_ERRORS.clone()),
        // Store
        Box::new(ID_ALLOCATION_CONFLICTS.clone()),
        // Reconciliation
        Box::new(RECONCILIATIONS_TOTAL.clone()),
        Box::new(RECONCILIATION_MISSES.clone()),
        Box::new(COVERS_DOWNLOADED.clone()),
        // External services
        Box::new(EXTERNAL_SERVICE_DURATION.clone()),
        Box::new(EXTERNAL_SERVICE_REQUESTS.clone()),
    ]
}
