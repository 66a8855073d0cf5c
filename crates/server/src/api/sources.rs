//! Source API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use super::handlers::{internal, not_found, ApiError};
use super::manga::MangaResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SourceSummary {
    pub name: String,
    pub manga_url: String,
}

/// GET /api/v1/sources
pub async fn list_sources(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SourceSummary>>, ApiError> {
    let sources = state.catalog().sources().map_err(internal)?;
    Ok(Json(
        sources
            .into_iter()
            .map(|name| SourceSummary {
                manga_url: format!("/api/v1/sources/{}/manga", name),
                name,
            })
            .collect(),
    ))
}

/// GET /api/v1/sources/{name}/manga
pub async fn list_source_manga(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<MangaResponse>>, ApiError> {
    let sources = state.catalog().sources().map_err(internal)?;
    if !sources.contains(&name) {
        return Err(not_found(format!("Source not found: {}", name)));
    }

    let manga = state.catalog().mangas_in_source(&name).map_err(internal)?;
    Ok(Json(manga.into_iter().map(MangaResponse::from).collect()))
}
