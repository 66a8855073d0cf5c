use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{categories, handlers, library, manga, middleware::metrics_middleware, sources};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Manga
        .route("/manga", get(manga::list_manga))
        .route("/manga/{id}", get(manga::get_manga))
        .route("/manga/{id}/cover", get(manga::get_cover))
        .route("/manga/{id}/reconcile", post(manga::reconcile_manga))
        .route("/manga/{id}/chapters", get(manga::list_chapters))
        .route("/manga/{id}/chapters/{number}", get(manga::get_chapter))
        .route("/manga/{id}/chapters/{number}/pages", get(manga::list_pages))
        .route(
            "/manga/{id}/chapters/{number}/pages/{page}",
            get(manga::get_page),
        )
        // Categories
        .route("/categories", get(categories::list_categories))
        .route(
            "/categories/{index}",
            get(categories::get_category).post(categories::add_to_category),
        )
        // Sources
        .route("/sources", get(sources::list_sources))
        .route("/sources/{name}/manga", get(sources::list_source_manga))
        // Library
        .route("/library/scan", post(library::start_scan))
        .route("/library/status", get(library::get_status))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::get_metrics))
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
