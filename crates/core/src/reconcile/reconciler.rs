//! The reconciliation engine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::slug::{chapter_slug, slugify_name};
use super::types::RemoteChapter;
use super::{MetadataProvider, ProviderError};
use crate::catalog::{Catalog, CatalogError, Manga, MangaStatus};
use crate::library::manga_dir;
use crate::metrics;
use crate::retry::{RetryError, RetryPolicy};

/// Result of one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The provider knows no such manga; nothing was changed.
    NoMatch,
    /// Metadata was merged from the first candidate.
    Updated {
        chapters_matched: usize,
        chapters_missed: usize,
        cover_downloaded: bool,
    },
}

/// Errors for reconciliation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Reconciliation of manga {manga_id} gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        manga_id: u64,
        attempts: u32,
        #[source]
        last: Box<ReconcileError>,
    },
}

impl ReconcileError {
    /// Whether another attempt could succeed.
    fn is_transient(&self) -> bool {
        match self {
            ReconcileError::Provider(_) | ReconcileError::Io(_) => true,
            ReconcileError::Catalog(CatalogError::Store(_)) => true,
            ReconcileError::Catalog(_) | ReconcileError::RetriesExhausted { .. } => false,
        }
    }
}

/// Merges provider metadata into the catalog, one manga at a time.
pub struct Reconciler {
    catalog: Arc<Catalog>,
    provider: Arc<dyn MetadataProvider>,
    library_root: PathBuf,
    retry: RetryPolicy,
}

impl Reconciler {
    pub fn new(
        catalog: Arc<Catalog>,
        provider: Arc<dyn MetadataProvider>,
        library_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            catalog,
            provider,
            library_root: library_root.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Reconcile one manga, retrying transient failures.
    ///
    /// Every attempt re-reads the catalog and re-fetches from the provider,
    /// so a retry after partial completion converges on the same result.
    pub async fn reconcile(&self, manga_id: u64) -> Result<ReconcileOutcome, ReconcileError> {
        let result = self
            .retry
            .run(
                |attempt| self.reconcile_once(manga_id, attempt),
                ReconcileError::is_transient,
            )
            .await
            .map_err(|e| match e {
                RetryError::Exhausted { attempts, last } => ReconcileError::RetriesExhausted {
                    manga_id,
                    attempts,
                    last: Box::new(last),
                },
                RetryError::Fatal(e) => e,
            });

        match &result {
            Ok(ReconcileOutcome::NoMatch) => {
                metrics::RECONCILIATIONS_TOTAL
                    .with_label_values(&["no_match"])
                    .inc();
                debug!(manga_id, "No provider match");
            }
            Ok(ReconcileOutcome::Updated {
                chapters_matched,
                chapters_missed,
                cover_downloaded,
            }) => {
                metrics::RECONCILIATIONS_TOTAL
                    .with_label_values(&["updated"])
                    .inc();
                info!(
                    manga_id,
                    chapters_matched, chapters_missed, cover_downloaded, "Reconciled manga"
                );
            }
            Err(e) => {
                metrics::RECONCILIATIONS_TOTAL
                    .with_label_values(&["failed"])
                    .inc();
                warn!(manga_id, "Reconciliation failed: {}", e);
            }
        }

        result
    }

    async fn reconcile_once(
        &self,
        manga_id: u64,
        attempt: u32,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let manga = self
            .catalog
            .manga(manga_id)?
            .ok_or_else(|| CatalogError::NotFound(format!("manga {}", manga_id)))?;

        debug!(
            manga_id,
            attempt,
            provider = self.provider.name(),
            "Searching provider for '{}'",
            manga.path_name
        );
        let candidates = self.provider.search_manga(&manga.path_name).await?;
        let Some(remote) = candidates.into_iter().next() else {
            return Ok(ReconcileOutcome::NoMatch);
        };

        let manga = self.catalog.modify_manga(manga_id, |m| {
            m.title = remote.title.clone();
            m.artist = remote.artist.clone();
            m.author = remote.author.clone();
            m.description = remote.description.clone();
            m.genres = Some(remote.genres.clone());
            m.status = remote
                .status
                .as_deref()
                .map(MangaStatus::from_remote)
                .unwrap_or_default();
        })?;

        let (chapters_matched, chapters_missed) = self.merge_chapters(&manga, &remote.chapters)?;

        let cover_downloaded = match remote.thumbnail_url.as_deref() {
            Some(url) => self.ensure_cover(&manga, url).await?,
            None => false,
        };

        Ok(ReconcileOutcome::Updated {
            chapters_matched,
            chapters_missed,
            cover_downloaded,
        })
    }

    /// Match local chapters to remote ones by slug and merge matched fields.
    fn merge_chapters(
        &self,
        manga: &Manga,
        remote_chapters: &[RemoteChapter],
    ) -> Result<(usize, usize), ReconcileError> {
        let mut remote_by_slug: HashMap<String, &RemoteChapter> = HashMap::new();
        for remote in remote_chapters {
            remote_by_slug
                .entry(slugify_name(&remote.name))
                .or_insert(remote);
        }

        let mut matched = 0;
        let mut missed = 0;
        for local in self.catalog.manga_chapters_sorted(manga.id)? {
            let Some(remote) = remote_by_slug.get(&chapter_slug(&local.path_name)) else {
                debug!(
                    manga_id = manga.id,
                    chapter = %local.path_name,
                    "No remote chapter matches local chapter"
                );
                metrics::RECONCILIATION_MISSES.inc();
                missed += 1;
                continue;
            };

            // Merged into the current record: a rescan may have renumbered
            // the chapter since it was listed.
            self.catalog
                .modify_chapter(manga.id, &local.path_name, |chapter| {
                    chapter.title = Some(remote.name.clone());
                    chapter.scanlator = remote.scanlator.clone();
                    if let Some(date) = remote.upload_date() {
                        chapter.upload_date = date;
                    }
                    if let Some(pages) = remote.positive_page_count() {
                        chapter.page_count = pages;
                    }
                })?;
            matched += 1;
        }

        Ok((matched, missed))
    }

    /// Download the provider thumbnail as `cover.<ext>` unless the manga
    /// directory already has a file with "cover" in its name.
    async fn ensure_cover(&self, manga: &Manga, thumbnail_url: &str) -> Result<bool, ReconcileError> {
        let dir = manga_dir(&self.library_root, manga);
        match has_cover_file(&dir).await {
            Ok(true) => return Ok(false),
            Ok(false) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(manga_id = manga.id, dir = %dir.display(), "Manga directory is missing, not fetching a cover");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }

        let thumbnail = self.provider.fetch_thumbnail(thumbnail_url).await?;
        let file_name = format!("cover.{}", thumbnail.extension());
        tokio::fs::write(dir.join(&file_name), &thumbnail.bytes).await?;
        self.catalog.set_cover(manga.id, &file_name)?;

        metrics::COVERS_DOWNLOADED.inc();
        debug!(manga_id = manga.id, file = %file_name, "Downloaded cover");
        Ok(true)
    }
}

async fn has_cover_file(dir: &Path) -> std::io::Result<bool> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name().to_string_lossy().contains("cover") {
            return Ok(true);
        }
    }
    Ok(false)
}
