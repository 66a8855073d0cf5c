//! Manga, chapter and page API handlers.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tankobon_core::{
    library::{archive, chapter_archive, cover_path, ArchiveError},
    media::mime_for_extension,
    CatalogError, Chapter, Manga, MangaStatus, ReconcileError, ReconcileOutcome,
};
use tracing::warn;

use super::handlers::{error, internal, not_found, ApiError};
use crate::state::AppState;

const OCTET_STREAM: &str = "application/octet-stream";

// ============================================================================
// Response types
// ============================================================================

/// Client-facing manga projection.
#[derive(Debug, Serialize)]
pub struct MangaResponse {
    pub id: u64,
    pub source: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub genres: Vec<String>,
    pub status: MangaStatus,
    pub thumbnail_url: String,
}

impl From<Manga> for MangaResponse {
    fn from(manga: Manga) -> Self {
        Self {
            thumbnail_url: format!("/api/v1/manga/{}/cover", manga.id),
            id: manga.id,
            source: manga.source,
            title: manga.title,
            artist: manga.artist,
            author: manga.author,
            description: manga.description,
            genres: manga.genres.unwrap_or_default(),
            status: manga.status,
        }
    }
}

/// Client-facing chapter projection.
#[derive(Debug, Serialize)]
pub struct ChapterResponse {
    pub chapter_number: u32,
    pub name: String,
    pub scanlator: Option<String>,
    pub page_count: u32,
    /// Epoch milliseconds.
    pub upload_date: i64,
    pub url: String,
}

impl ChapterResponse {
    fn new(manga_id: u64, chapter: Chapter) -> Self {
        Self {
            url: format!("/api/v1/manga/{}/chapters/{}", manga_id, chapter.chapter_number),
            chapter_number: chapter.chapter_number,
            name: chapter.title.unwrap_or(chapter.path_name),
            scanlator: chapter.scanlator,
            page_count: chapter.page_count,
            upload_date: chapter.upload_date.timestamp_millis(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PagesResponse {
    pub pages: Vec<String>,
}

// ============================================================================
// Lookups
// ============================================================================

fn find_manga(state: &AppState, id: u64) -> Result<Manga, ApiError> {
    state
        .catalog()
        .manga(id)
        .map_err(internal)?
        .ok_or_else(|| not_found(format!("Manga not found: {}", id)))
}

fn find_chapter(state: &AppState, manga: &Manga, number: u32) -> Result<Chapter, ApiError> {
    state
        .catalog()
        .chapter_by_number(manga.id, number)
        .map_err(internal)?
        .ok_or_else(|| {
            not_found(format!(
                "Chapter {} of manga {} not found",
                number, manga.id
            ))
        })
}

fn archive_error(e: ArchiveError) -> ApiError {
    match e {
        ArchiveError::PageOutOfRange { page, count } => {
            not_found(format!("Page {} not found, chapter has {} pages", page, count))
        }
        ArchiveError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
            not_found("Chapter archive is missing")
        }
        e => internal(e),
    }
}

async fn with_archive<T, F>(path: PathBuf, read: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&std::path::Path) -> Result<T, ArchiveError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || read(&path))
        .await
        .map_err(internal)?
        .map_err(archive_error)
}

fn image_response(name: &str, bytes: Vec<u8>) -> Response {
    let content_type = mime_for_extension(name).unwrap_or(OCTET_STREAM);
    ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/manga
pub async fn list_manga(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MangaResponse>>, ApiError> {
    let mangas = state.catalog().all_mangas().map_err(internal)?;
    Ok(Json(mangas.into_iter().map(MangaResponse::from).collect()))
}

/// GET /api/v1/manga/{id}
pub async fn get_manga(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<MangaResponse>, ApiError> {
    Ok(Json(find_manga(&state, id)?.into()))
}

/// GET /api/v1/manga/{id}/cover
pub async fn get_cover(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Response, ApiError> {
    let manga = find_manga(&state, id)?;
    let path = cover_path(state.library_root(), &manga)
        .ok_or_else(|| not_found(format!("Manga {} has no cover", id)))?;

    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(image_response(manga.cover.as_deref().unwrap_or_default(), bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(manga_id = id, path = %path.display(), "Cataloged cover is missing");
            Err(not_found(format!("Manga {} has no cover", id)))
        }
        Err(e) => Err(internal(e)),
    }
}

/// GET /api/v1/manga/{id}/chapters
pub async fn list_chapters(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Vec<ChapterResponse>>, ApiError> {
    let manga = find_manga(&state, id)?;
    let chapters = state
        .catalog()
        .manga_chapters_sorted(manga.id)
        .map_err(internal)?;
    Ok(Json(
        chapters
            .into_iter()
            .map(|c| ChapterResponse::new(manga.id, c))
            .collect(),
    ))
}

/// GET /api/v1/manga/{id}/chapters/{number}
pub async fn get_chapter(
    State(state): State<Arc<AppState>>,
    Path((id, number)): Path<(u64, u32)>,
) -> Result<Json<ChapterResponse>, ApiError> {
    let manga = find_manga(&state, id)?;
    let chapter = find_chapter(&state, &manga, number)?;
    Ok(Json(ChapterResponse::new(manga.id, chapter)))
}

/// GET /api/v1/manga/{id}/chapters/{number}/pages
pub async fn list_pages(
    State(state): State<Arc<AppState>>,
    Path((id, number)): Path<(u64, u32)>,
) -> Result<Json<PagesResponse>, ApiError> {
    let manga = find_manga(&state, id)?;
    let chapter = find_chapter(&state, &manga, number)?;
    let path = chapter_archive(state.library_root(), &manga, &chapter);

    let count = with_archive(path, archive::count_pages).await?;
    let pages = (1..=count)
        .map(|page| format!("/api/v1/manga/{}/chapters/{}/pages/{}", id, number, page))
        .collect();
    Ok(Json(PagesResponse { pages }))
}

/// GET /api/v1/manga/{id}/chapters/{number}/pages/{page}
pub async fn get_page(
    State(state): State<Arc<AppState>>,
    Path((id, number, page)): Path<(u64, u32, usize)>,
) -> Result<Response, ApiError> {
    let manga = find_manga(&state, id)?;
    let chapter = find_chapter(&state, &manga, number)?;
    let path = chapter_archive(state.library_root(), &manga, &chapter);

    let page = with_archive(path, move |p| archive::read_page(p, page)).await?;
    Ok(image_response(&page.name, page.data))
}

/// POST /api/v1/manga/{id}/reconcile
///
/// Run one reconciliation against the configured provider.
pub async fn reconcile_manga(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<ReconcileOutcome>, ApiError> {
    let reconciler = state.reconciler().ok_or_else(|| {
        error(
            StatusCode::SERVICE_UNAVAILABLE,
            "No metadata provider configured",
        )
    })?;
    find_manga(&state, id)?;

    match reconciler.reconcile(id).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(ReconcileError::Catalog(CatalogError::NotFound(what))) => {
            Err(not_found(format!("Not found: {}", what)))
        }
        Err(e @ (ReconcileError::Provider(_) | ReconcileError::RetriesExhausted { .. })) => {
            Err(error(StatusCode::BAD_GATEWAY, e.to_string()))
        }
        Err(e) => Err(internal(e)),
    }
}
