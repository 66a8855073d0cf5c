//! Library scanner implementation.
//!
//! Walks `<root>/<source>/<manga>/<chapter>.cbz`, brings the catalog in line
//! with what is on disk, and hands every touched manga to the reconciler.
//! Manga are processed one at a time; a failure is recorded for that manga
//! and the walk continues.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::archive;
use super::natural::assign_chapter_numbers;
use super::CHAPTER_EXTENSION;
use crate::catalog::{Catalog, CatalogError, Chapter, ChapterDraft, MangaDraft, MangaStatus};
use crate::metrics;
use crate::reconcile::{ReconcileError, ReconcileOutcome, Reconciler};

/// Reconciliations run at once by [`LibraryScanner::reconcile_all`].
const RECONCILE_ALL_CONCURRENCY: usize = 4;

/// Flags controlling how much work a scan does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Re-process manga that are already cataloged even if they look unchanged.
    pub rescan_manga: bool,
    /// Re-inspect chapters that are already cataloged.
    pub rescan_chapters: bool,
    /// Open archives to count pages instead of assuming 1.
    pub deep_scan: bool,
    /// Wait for spawned reconciliations before the scan returns.
    pub await_reconciliation: bool,
}

/// Whether a library scan is in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ScanState {
    Idle,
    Running {
        scan_id: Uuid,
        started_at: DateTime<Utc>,
    },
}

/// A manga that could not be scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanFailure {
    pub source: String,
    pub path_name: String,
    pub error: String,
}

/// Reconciliation results collected during a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ReconciliationTally {
    pub updated: usize,
    pub no_match: usize,
    pub failed: usize,
    /// Spawned without waiting for the result.
    pub detached: usize,
}

impl ReconciliationTally {
    fn record(&mut self, result: &Result<ReconcileOutcome, ReconcileError>) {
        match result {
            Ok(ReconcileOutcome::Updated { .. }) => self.updated += 1,
            Ok(ReconcileOutcome::NoMatch) => self.no_match += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Summary of one library scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub scan_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: usize,
    pub manga_examined: usize,
    pub manga_added: usize,
    pub manga_skipped: usize,
    pub chapters_added: usize,
    pub chapters_renumbered: usize,
    pub failures: Vec<ScanFailure>,
    pub reconciliation: ReconciliationTally,
}

impl ScanReport {
    fn new(scan_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            scan_id,
            started_at,
            finished_at: started_at,
            sources: 0,
            manga_examined: 0,
            manga_added: 0,
            manga_skipped: 0,
            chapters_added: 0,
            chapters_renumbered: 0,
            failures: Vec::new(),
            reconciliation: ReconciliationTally::default(),
        }
    }
}

/// Errors for library scans.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("A library scan is already running")]
    AlreadyRunning,

    #[error("Cannot read library directory {path}: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A chapter archive found in a manga directory.
#[derive(Debug)]
struct ArchiveFile {
    stem: String,
    path: PathBuf,
    upload_date: DateTime<Utc>,
}

/// What a manga directory contains.
#[derive(Debug, Default)]
struct MangaListing {
    cover: Option<String>,
    archives: Vec<ArchiveFile>,
}

enum MangaScan {
    Skipped,
    Processed { manga_id: u64, created: bool },
}

/// Holds the scanner in the running state until dropped.
struct ScanClaim {
    state: Arc<Mutex<ScanState>>,
    scan_id: Uuid,
    started_at: DateTime<Utc>,
}

impl Drop for ScanClaim {
    fn drop(&mut self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = ScanState::Idle;
    }
}

/// Scans the library tree into the catalog.
pub struct LibraryScanner {
    root: PathBuf,
    catalog: Arc<Catalog>,
    reconciler: Option<Arc<Reconciler>>,
    options: ScanOptions,
    state: Arc<Mutex<ScanState>>,
    last_report: Mutex<Option<ScanReport>>,
}

impl LibraryScanner {
    pub fn new(root: impl Into<PathBuf>, catalog: Arc<Catalog>, options: ScanOptions) -> Self {
        Self {
            root: root.into(),
            catalog,
            reconciler: None,
            options,
            state: Arc::new(Mutex::new(ScanState::Idle)),
            last_report: Mutex::new(None),
        }
    }

    /// Reconcile every touched manga with this reconciler.
    pub fn with_reconciler(mut self, reconciler: Arc<Reconciler>) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> ScanOptions {
        self.options
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn reconciler(&self) -> Option<&Arc<Reconciler>> {
        self.reconciler.as_ref()
    }

    fn lock_state(&self) -> MutexGuard<'_, ScanState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current scan state.
    pub fn state(&self) -> ScanState {
        self.lock_state().clone()
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lock_state(), ScanState::Running { .. })
    }

    /// Report of the most recent completed scan.
    pub fn last_report(&self) -> Option<ScanReport> {
        self.last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn begin(&self) -> Result<ScanClaim, ScanError> {
        let mut state = self.lock_state();
        if matches!(*state, ScanState::Running { .. }) {
            metrics::SCANS_TOTAL.with_label_values(&["rejected"]).inc();
            return Err(ScanError::AlreadyRunning);
        }

        let scan_id = Uuid::new_v4();
        let started_at = Utc::now();
        *state = ScanState::Running {
            scan_id,
            started_at,
        };
        Ok(ScanClaim {
            state: Arc::clone(&self.state),
            scan_id,
            started_at,
        })
    }

    /// Scan with the configured options.
    pub async fn scan(&self) -> Result<ScanReport, ScanError> {
        self.scan_with(self.options).await
    }

    /// Scan with explicit options.
    ///
    /// Returns [`ScanError::AlreadyRunning`] if another scan is in progress.
    pub async fn scan_with(&self, options: ScanOptions) -> Result<ScanReport, ScanError> {
        self.run_scan(options, true).await
    }

    /// Claim the scanner and scan in the background.
    ///
    /// Fails with [`ScanError::AlreadyRunning`] before spawning anything if
    /// another scan is in progress.
    pub fn spawn_scan(
        self: &Arc<Self>,
        options: ScanOptions,
    ) -> Result<JoinHandle<Result<ScanReport, ScanError>>, ScanError> {
        let claim = self.begin()?;
        let scanner = Arc::clone(self);
        Ok(tokio::spawn(async move {
            scanner.run_claimed(claim, options, true).await
        }))
    }

    /// Scan, then reconcile every cataloged manga rather than only the ones
    /// the scan touched.
    pub async fn scan_and_reconcile_all(&self) -> Result<ScanReport, ScanError> {
        let mut report = self.run_scan(self.options, false).await?;
        report.reconciliation = self.reconcile_all().await?;
        self.store_report(&report);
        Ok(report)
    }

    /// Reconcile every cataloged manga, a few at a time.
    pub async fn reconcile_all(&self) -> Result<ReconciliationTally, ScanError> {
        let mut tally = ReconciliationTally::default();
        let Some(reconciler) = &self.reconciler else {
            return Ok(tally);
        };

        let ids: Vec<u64> = self.catalog.all_mangas()?.iter().map(|m| m.id).collect();
        info!(count = ids.len(), "Reconciling all manga");

        let results: Vec<_> = stream::iter(ids)
            .map(|id| async move { reconciler.reconcile(id).await })
            .buffer_unordered(RECONCILE_ALL_CONCURRENCY)
            .collect()
            .await;
        for result in &results {
            tally.record(result);
        }
        Ok(tally)
    }

    fn store_report(&self, report: &ScanReport) {
        *self
            .last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(report.clone());
    }

    async fn run_scan(
        &self,
        options: ScanOptions,
        reconcile_touched: bool,
    ) -> Result<ScanReport, ScanError> {
        let claim = self.begin()?;
        self.run_claimed(claim, options, reconcile_touched).await
    }

    async fn run_claimed(
        &self,
        claim: ScanClaim,
        options: ScanOptions,
        reconcile_touched: bool,
    ) -> Result<ScanReport, ScanError> {
        let (scan_id, started_at) = (claim.scan_id, claim.started_at);
        let timer = Instant::now();
        info!(%scan_id, root = %self.root.display(), ?options, "Starting library scan");

        let mut report = ScanReport::new(scan_id, started_at);
        let mut pending = Vec::new();

        if let Err(e) = self
            .scan_root(options, reconcile_touched, &mut report, &mut pending)
            .await
        {
            metrics::SCANS_TOTAL.with_label_values(&["failed"]).inc();
            warn!(%scan_id, "Library scan failed: {}", e);
            return Err(e);
        }

        if options.await_reconciliation {
            for handle in pending {
                match handle.await {
                    Ok(result) => report.reconciliation.record(&result),
                    Err(e) => {
                        warn!(%scan_id, "Reconciliation task panicked: {}", e);
                        report.reconciliation.failed += 1;
                    }
                }
            }
        } else {
            report.reconciliation.detached = pending.len();
        }

        report.finished_at = Utc::now();
        self.store_report(&report);

        metrics::SCANS_TOTAL.with_label_values(&["completed"]).inc();
        metrics::SCAN_DURATION
            .with_label_values(&[])
            .observe(timer.elapsed().as_secs_f64());
        info!(
            %scan_id,
            manga_added = report.manga_added,
            manga_skipped = report.manga_skipped,
            chapters_added = report.chapters_added,
            failures = report.failures.len(),
            elapsed = %format_elapsed(timer.elapsed()),
            "Library scan finished"
        );

        Ok(report)
    }

    async fn scan_root(
        &self,
        options: ScanOptions,
        reconcile_touched: bool,
        report: &mut ScanReport,
        pending: &mut Vec<JoinHandle<Result<ReconcileOutcome, ReconcileError>>>,
    ) -> Result<(), ScanError> {
        let sources = read_subdirs(&self.root)
            .await
            .map_err(|source| ScanError::RootUnreadable {
                path: self.root.clone(),
                source,
            })?;

        for source in sources {
            report.sources += 1;
            if let Err(e) = self.catalog.add_source(&source) {
                warn!(source = %source, "Failed to register source: {}", e);
                report.failures.push(ScanFailure {
                    source: source.clone(),
                    path_name: String::new(),
                    error: e.to_string(),
                });
                continue;
            }

            let mangas = match read_subdirs(&self.root.join(&source)).await {
                Ok(mangas) => mangas,
                Err(e) => {
                    warn!(source = %source, "Failed to read source directory: {}", e);
                    report.failures.push(ScanFailure {
                        source: source.clone(),
                        path_name: String::new(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            for path_name in mangas {
                report.manga_examined += 1;
                match self.scan_manga(&source, &path_name, options, report).await {
                    Ok(MangaScan::Skipped) => {
                        report.manga_skipped += 1;
                        metrics::MANGA_SCANNED.with_label_values(&["skipped"]).inc();
                    }
                    Ok(MangaScan::Processed { manga_id, created }) => {
                        if created {
                            report.manga_added += 1;
                        }
                        metrics::MANGA_SCANNED
                            .with_label_values(&[if created { "added" } else { "rescanned" }])
                            .inc();
                        if reconcile_touched {
                            if let Some(handle) = self.spawn_reconciliation(manga_id) {
                                pending.push(handle);
                            }
                        }
                    }
                    Err(e) => {
                        warn!(source = %source, manga = %path_name, "Failed to scan manga: {}", e);
                        metrics::MANGA_SCANNED.with_label_values(&["failed"]).inc();
                        report.failures.push(ScanFailure {
                            source: source.clone(),
                            path_name: path_name.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    fn spawn_reconciliation(
        &self,
        manga_id: u64,
    ) -> Option<JoinHandle<Result<ReconcileOutcome, ReconcileError>>> {
        let reconciler = Arc::clone(self.reconciler.as_ref()?);
        Some(tokio::spawn(async move {
            reconciler.reconcile(manga_id).await
        }))
    }

    async fn scan_manga(
        &self,
        source: &str,
        path_name: &str,
        options: ScanOptions,
        report: &mut ScanReport,
    ) -> Result<MangaScan, ScanError> {
        let manga_dir = self.root.join(source).join(path_name);
        let listing = list_manga_dir(&manga_dir).await?;

        let existing = self.catalog.manga_by_path(path_name)?;
        if let Some(manga) = &existing {
            let cataloged = self.catalog.chapter_count(manga.id)?;
            let changed = cataloged != listing.archives.len();
            let needs_rescan =
                options.rescan_manga || (changed && manga.status != MangaStatus::Completed);
            if !needs_rescan {
                debug!(manga_id = manga.id, path_name, "Manga unchanged, skipping");
                return Ok(MangaScan::Skipped);
            }
        }

        let timer = Instant::now();
        let (manga_id, created) = match &existing {
            Some(manga) => (manga.id, false),
            None => (
                self.catalog
                    .allocate_manga(&MangaDraft::new(path_name, source))?,
                true,
            ),
        };

        if let Some(cover) = &listing.cover {
            if let Err(e) = self.catalog.set_cover(manga_id, cover) {
                warn!(manga_id, cover = %cover, "Failed to record cover: {}", e);
            }
        }

        let mut new_chapters = Vec::new();
        for archive_file in &listing.archives {
            let known = self.catalog.chapter(manga_id, &archive_file.stem)?;
            if known.is_some() && !options.rescan_chapters {
                continue;
            }

            let page_count = if options.deep_scan {
                count_pages(archive_file.path.clone()).await
            } else {
                1
            };

            match known {
                Some(chapter) => {
                    if options.deep_scan && chapter.page_count != page_count {
                        self.catalog
                            .modify_chapter(manga_id, &chapter.path_name, |c| {
                                c.page_count = page_count
                            })?;
                    }
                }
                None => {
                    let mut draft = ChapterDraft::new(&archive_file.stem, archive_file.upload_date);
                    draft.page_count = page_count;
                    new_chapters.push(draft);
                }
            }

            tokio::task::yield_now().await;
        }

        let (added, renumbered) = self.insert_chapters(manga_id, &listing, new_chapters)?;
        report.chapters_added += added;
        report.chapters_renumbered += renumbered;
        metrics::CHAPTERS_ADDED.inc_by(added as u64);

        info!(
            manga_id,
            path_name,
            chapters_added = added,
            elapsed = %format_elapsed(timer.elapsed()),
            "{} {}",
            if created { "Inserted" } else { "Updated" },
            path_name
        );

        Ok(MangaScan::Processed { manga_id, created })
    }

    /// Number and insert newly found chapters.
    ///
    /// Ranks cover on-disk and already-cataloged chapters together, so an
    /// existing chapter whose rank moves is renumbered before new chapters
    /// take their numbers.
    fn insert_chapters(
        &self,
        manga_id: u64,
        listing: &MangaListing,
        new_chapters: Vec<ChapterDraft>,
    ) -> Result<(usize, usize), ScanError> {
        if new_chapters.is_empty() {
            return Ok((0, 0));
        }

        let cataloged: Vec<Chapter> = self.catalog.manga_chapters(manga_id)?;
        let mut names: HashSet<&str> = cataloged.iter().map(|c| c.path_name.as_str()).collect();
        names.extend(listing.archives.iter().map(|a| a.stem.as_str()));
        let names: Vec<&str> = names.into_iter().collect();
        let ranks: HashMap<String, u32> = assign_chapter_numbers(&names).into_iter().collect();

        let moves: Vec<(String, u32)> = cataloged
            .iter()
            .filter_map(|c| {
                let rank = *ranks.get(&c.path_name)?;
                (rank != c.chapter_number).then(|| (c.path_name.clone(), rank))
            })
            .collect();
        let renumbered = if moves.is_empty() {
            0
        } else {
            self.catalog.renumber_chapters(manga_id, &moves)?
        };

        let mut added = 0;
        for draft in new_chapters {
            let rank = ranks.get(&draft.path_name).copied().ok_or_else(|| {
                CatalogError::InvalidRecord(format!("chapter {} was not ranked", draft.path_name))
            })?;
            if self
                .catalog
                .insert_chapter(manga_id, &draft.finalize(rank)?, false)?
            {
                added += 1;
            }
        }

        Ok((added, renumbered))
    }
}

/// Page count of an archive, 1 if it cannot be read.
async fn count_pages(path: PathBuf) -> u32 {
    let archive_path = path.display().to_string();
    match tokio::task::spawn_blocking(move || archive::count_pages(&path)).await {
        Ok(Ok(count)) => count,
        Ok(Err(e)) => {
            metrics::ARCHIVE_ERRORS.inc();
            warn!(archive = %archive_path, "Failed to count pages, assuming 1: {}", e);
            1
        }
        Err(e) => {
            metrics::ARCHIVE_ERRORS.inc();
            warn!(archive = %archive_path, "Page counting task failed, assuming 1: {}", e);
            1
        }
    }
}

/// Names of the immediate subdirectories of `dir`, sorted.
async fn read_subdirs(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => warn!(dir = %dir.display(), "Skipping non UTF-8 directory {:?}", raw),
        }
    }
    names.sort();
    Ok(names)
}

/// Read a manga directory once: its cover file and its chapter archives.
async fn list_manga_dir(dir: &Path) -> std::io::Result<MangaListing> {
    let mut listing = MangaListing::default();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            warn!(dir = %dir.display(), "Skipping non UTF-8 file name");
            continue;
        };

        let path = entry.path();
        if path.file_stem().and_then(|s| s.to_str()) == Some("cover") {
            if listing.cover.as_deref().map_or(true, |current| name.as_str() < current) {
                listing.cover = Some(name.clone());
            }
            continue;
        }

        if path.extension().and_then(|e| e.to_str()) != Some(CHAPTER_EXTENSION) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            continue;
        };

        let upload_date = metadata
            .created()
            .or_else(|_| metadata.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        listing.archives.push(ArchiveFile {
            stem,
            path,
            upload_date,
        });
    }

    listing.archives.sort_by(|a, b| a.stem.cmp(&b.stem));
    Ok(listing)
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}.{:03}s", secs, millis)
    }
}
