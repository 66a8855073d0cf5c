//! Library scan API handlers.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tankobon_core::{ScanError, ScanOptions, ScanReport, ScanState, SchedulerStatus};
use tracing::{info, warn};

use super::handlers::{error, ApiError};
use crate::state::AppState;

/// Per-request overrides of the configured scan options.
#[derive(Debug, Default, Deserialize)]
pub struct ScanParams {
    pub rescan_manga: Option<bool>,
    pub rescan_chapters: Option<bool>,
    pub deep_scan: Option<bool>,
}

impl ScanParams {
    fn apply(&self, mut options: ScanOptions) -> ScanOptions {
        if let Some(v) = self.rescan_manga {
            options.rescan_manga = v;
        }
        if let Some(v) = self.rescan_chapters {
            options.rescan_chapters = v;
        }
        if let Some(v) = self.deep_scan {
            options.deep_scan = v;
        }
        options
    }
}

#[derive(Debug, Serialize)]
pub struct ScanStartedResponse {
    pub status: &'static str,
    pub options: ScanOptions,
}

#[derive(Debug, Serialize)]
pub struct LibraryStatusResponse {
    pub scan: ScanState,
    pub scheduler: Option<SchedulerStatus>,
    pub last_report: Option<ScanReport>,
}

/// POST /api/v1/library/scan
///
/// Start a scan in the background.
pub async fn start_scan(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ScanParams>,
) -> Result<(StatusCode, Json<ScanStartedResponse>), ApiError> {
    let scanner = state.scanner();
    let options = params.apply(scanner.options());
    let handle = scanner.spawn_scan(options).map_err(|e| {
        let status = match e {
            ScanError::AlreadyRunning => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error(status, e.to_string())
    })?;
    info!(?options, "Scan requested over the API");

    tokio::spawn(async move {
        match handle.await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Requested scan failed: {}", e),
            Err(e) => warn!("Requested scan task panicked: {}", e),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(ScanStartedResponse {
            status: "started",
            options,
        }),
    ))
}

/// GET /api/v1/library/status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<LibraryStatusResponse> {
    Json(LibraryStatusResponse {
        scan: state.scanner().state(),
        scheduler: state.scheduler().map(|s| s.status()),
        last_report: state.scanner().last_report(),
    })
}
