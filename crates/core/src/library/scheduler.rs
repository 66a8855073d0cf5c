//! Periodic library scans.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

use super::scanner::{LibraryScanner, ScanError, ScanReport};

/// Scheduler status for the API.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub interval_secs: u64,
    pub scan_in_progress: bool,
}

/// Runs a library scan every `interval`, optionally once at startup.
pub struct ScanScheduler {
    scanner: Arc<LibraryScanner>,
    interval: Duration,
    scan_on_startup: bool,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ScanScheduler {
    pub fn new(scanner: Arc<LibraryScanner>, interval: Duration, scan_on_startup: bool) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            scanner,
            interval,
            scan_on_startup,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    pub fn scanner(&self) -> &Arc<LibraryScanner> {
        &self.scanner
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.is_running(),
            interval_secs: self.interval.as_secs(),
            scan_in_progress: self.scanner.is_running(),
        }
    }

    /// Start the scan loop (spawns a background task).
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Scan scheduler already running");
            return;
        }

        info!(interval_secs = self.interval.as_secs(), "Starting scan scheduler");

        let running = Arc::clone(&self.running);
        let scanner = Arc::clone(&self.scanner);
        let interval = self.interval;
        let scan_on_startup = self.scan_on_startup;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            if scan_on_startup {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Scan scheduler stopped during startup scan");
                        return;
                    }
                    result = scanner.scan_and_reconcile_all() => log_result("Startup", result),
                }
            }

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Scan scheduler received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        log_result("Scheduled", scanner.scan().await);
                    }
                }
            }
            info!("Scan scheduler stopped");
        });
    }

    /// Stop the scan loop. A scan already in progress runs to completion.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Scan scheduler not running");
            return;
        }

        info!("Stopping scan scheduler");
        let _ = self.shutdown_tx.send(());
    }
}

fn log_result(kind: &str, result: Result<ScanReport, ScanError>) {
    match result {
        Ok(report) => info!(
            scan_id = %report.scan_id,
            manga_added = report.manga_added,
            failures = report.failures.len(),
            "{} scan complete",
            kind
        ),
        Err(ScanError::AlreadyRunning) => {
            info!("{} scan skipped, a scan is already running", kind)
        }
        Err(e) => warn!("{} scan failed: {}", kind, e),
    }
}
