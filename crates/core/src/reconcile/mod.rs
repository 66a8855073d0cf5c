//! Metadata reconciliation against an external provider.
//!
//! A reconciliation looks a cataloged manga up by its pathName, merges the
//! first candidate's metadata into the catalog, matches local chapters to
//! remote chapters by slug, and downloads a cover when the manga directory
//! has none.

mod reconciler;
mod slug;
mod tachidesk;
mod types;

pub use reconciler::{ReconcileError, ReconcileOutcome, Reconciler};
pub use slug::{chapter_slug, slugify_name, strip_scanlator};
pub use tachidesk::{TachideskClient, TachideskConfig};
pub use types::*;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur when talking to a metadata provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP request failed (connection, timeout, body read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Provider answered with GraphQL errors.
    #[error("GraphQL error: {0}")]
    GraphQl(String),

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// The configured endpoint is not a usable URL.
    #[error("Invalid provider URL: {0}")]
    InvalidUrl(String),
}

/// Trait for metadata providers.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Short provider name for logs and metrics.
    fn name(&self) -> &str;

    /// Case-insensitive title search. Candidates are ordered by relevance.
    async fn search_manga(&self, title: &str) -> Result<Vec<RemoteManga>, ProviderError>;

    /// Fetch a thumbnail referenced by [`RemoteManga::thumbnail_url`].
    async fn fetch_thumbnail(&self, url: &str) -> Result<Thumbnail, ProviderError>;
}
