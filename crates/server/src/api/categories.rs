//! Category API handlers.
//!
//! Categories are addressed by their 1-based position in name order.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tankobon_core::CatalogError;

use super::handlers::{error, internal, not_found, ApiError};
use super::manga::MangaResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CategorySummary {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct CategoryResponse {
    pub name: String,
    pub manga: Vec<MangaResponse>,
}

#[derive(Debug, Deserialize)]
pub struct AddMangaBody {
    pub manga_id: u64,
}

fn category_name(state: &AppState, index: usize) -> Result<String, ApiError> {
    let categories = state.catalog().categories().map_err(internal)?;
    index
        .checked_sub(1)
        .and_then(|i| categories.into_iter().nth(i))
        .ok_or_else(|| not_found(format!("Category not found: {}", index)))
}

fn category_response(state: &AppState, name: String) -> Result<CategoryResponse, ApiError> {
    let manga = state
        .catalog()
        .mangas_in_category(&name)
        .map_err(internal)?
        .into_iter()
        .map(MangaResponse::from)
        .collect();
    Ok(CategoryResponse { name, manga })
}

/// GET /api/v1/categories
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CategorySummary>>, ApiError> {
    let categories = state.catalog().categories().map_err(internal)?;
    Ok(Json(
        categories
            .into_iter()
            .enumerate()
            .map(|(i, name)| CategorySummary {
                name,
                url: format!("/api/v1/categories/{}", i + 1),
            })
            .collect(),
    ))
}

/// GET /api/v1/categories/{index}
pub async fn get_category(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
) -> Result<Json<CategoryResponse>, ApiError> {
    let name = category_name(&state, index)?;
    Ok(Json(category_response(&state, name)?))
}

/// POST /api/v1/categories/{index}
///
/// Add a manga to the category.
pub async fn add_to_category(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
    body: Result<Json<AddMangaBody>, JsonRejection>,
) -> Result<Json<CategoryResponse>, ApiError> {
    let Json(body) = body.map_err(|e| error(StatusCode::BAD_REQUEST, e.body_text()))?;
    let name = category_name(&state, index)?;

    match state.catalog().add_manga_to_category(body.manga_id, &name) {
        Ok(()) => Ok(Json(category_response(&state, name)?)),
        Err(CatalogError::NotFound(_)) => {
            Err(not_found(format!("Manga not found: {}", body.manga_id)))
        }
        Err(e) => Err(internal(e)),
    }
}
