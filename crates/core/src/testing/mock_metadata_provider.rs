//! Mock metadata provider for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::reconcile::{MetadataProvider, ProviderError, RemoteManga, Thumbnail};

/// Builds the error returned by an injected failure.
pub type ErrorFactory = fn() -> ProviderError;

/// Mock implementation of the MetadataProvider trait.
///
/// Provides controllable behavior for testing:
/// - Return configurable search results and thumbnail
/// - Track searches and thumbnail fetches for assertions
/// - Simulate a number of consecutive failures
///
/// # Example
///
/// ```rust,ignore
/// use tankobon_core::testing::{MockMetadataProvider, fixtures};
///
/// let provider = MockMetadataProvider::new();
/// provider.set_search_results(vec![fixtures::remote_manga("Manga X")]).await;
///
/// let results = provider.search_manga("MangaX").await?;
/// assert_eq!(results.len(), 1);
/// ```
#[derive(Debug)]
pub struct MockMetadataProvider {
    /// Candidates returned by every search.
    results: Arc<RwLock<Vec<RemoteManga>>>,
    /// Thumbnail returned by every fetch.
    thumbnail: Arc<RwLock<Thumbnail>>,
    /// Recorded search titles.
    searches: Arc<RwLock<Vec<String>>>,
    /// Recorded thumbnail URLs.
    thumbnails: Arc<RwLock<Vec<String>>>,
    /// Remaining searches that fail, and how.
    failures: Arc<RwLock<Option<(u32, ErrorFactory)>>>,
    /// Titles whose searches always fail.
    failing_titles: Arc<RwLock<HashMap<String, ErrorFactory>>>,
    /// How long every search takes.
    search_delay: Arc<RwLock<Option<Duration>>>,
}

impl Default for MockMetadataProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMetadataProvider {
    /// Create a mock provider that knows no manga.
    pub fn new() -> Self {
        Self {
            results: Arc::new(RwLock::new(Vec::new())),
            thumbnail: Arc::new(RwLock::new(Thumbnail {
                content_type: Some("image/jpeg".to_string()),
                bytes: b"mock-cover".to_vec(),
            })),
            searches: Arc::new(RwLock::new(Vec::new())),
            thumbnails: Arc::new(RwLock::new(Vec::new())),
            failures: Arc::new(RwLock::new(None)),
            failing_titles: Arc::new(RwLock::new(HashMap::new())),
            search_delay: Arc::new(RwLock::new(None)),
        }
    }

    /// Set the candidates returned by searches.
    pub async fn set_search_results(&self, results: Vec<RemoteManga>) {
        *self.results.write().await = results;
    }

    /// Set the thumbnail returned by fetches.
    pub async fn set_thumbnail(&self, thumbnail: Thumbnail) {
        *self.thumbnail.write().await = thumbnail;
    }

    /// Make the next `count` searches fail with errors built by `error`.
    pub async fn fail_next_searches(&self, count: u32, error: ErrorFactory) {
        *self.failures.write().await = Some((count, error));
    }

    /// Make every search for `title` fail with errors built by `error`.
    pub async fn fail_searches_for(&self, title: &str, error: ErrorFactory) {
        self.failing_titles
            .write()
            .await
            .insert(title.to_string(), error);
    }

    /// Make every search wait for `delay` before answering.
    pub async fn set_search_delay(&self, delay: Duration) {
        *self.search_delay.write().await = Some(delay);
    }

    /// Titles searched so far.
    pub async fn recorded_searches(&self) -> Vec<String> {
        self.searches.read().await.clone()
    }

    /// Thumbnail URLs fetched so far.
    pub async fn recorded_thumbnails(&self) -> Vec<String> {
        self.thumbnails.read().await.clone()
    }

    async fn take_failure(&self) -> Option<ProviderError> {
        let mut failures = self.failures.write().await;
        match failures.as_mut() {
            Some((remaining, error)) if *remaining > 0 => {
                *remaining -= 1;
                Some(error())
            }
            _ => None,
        }
    }
}

#[async_trait]
impl MetadataProvider for MockMetadataProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search_manga(&self, title: &str) -> Result<Vec<RemoteManga>, ProviderError> {
        self.searches.write().await.push(title.to_string());

        let delay = *self.search_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.failing_titles.read().await.get(title) {
            return Err(error());
        }
        if let Some(error) = self.take_failure().await {
            return Err(error);
        }

        Ok(self.results.read().await.clone())
    }

    async fn fetch_thumbnail(&self, url: &str) -> Result<Thumbnail, ProviderError> {
        self.thumbnails.write().await.push(url.to_string());
        Ok(self.thumbnail.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::remote_manga;

    #[tokio::test]
    async fn test_returns_configured_results() {
        let provider = MockMetadataProvider::new();
        assert!(provider.search_manga("x").await.unwrap().is_empty());

        provider
            .set_search_results(vec![remote_manga("Manga X")])
            .await;
        let results = provider.search_manga("MangaX").await.unwrap();
        assert_eq!(results[0].title.as_deref(), Some("Manga X"));
        assert_eq!(provider.recorded_searches().await, vec!["x", "MangaX"]);
    }

    #[tokio::test]
    async fn test_injected_failures_run_out() {
        let provider = MockMetadataProvider::new();
        provider
            .fail_next_searches(1, || ProviderError::Parse("bad".to_string()))
            .await;

        assert!(provider.search_manga("a").await.is_err());
        assert!(provider.search_manga("a").await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_title_only_affects_that_title() {
        let provider = MockMetadataProvider::new();
        provider
            .fail_searches_for("Broken", || ProviderError::Parse("bad".to_string()))
            .await;

        assert!(provider.search_manga("Broken").await.is_err());
        assert!(provider.search_manga("Broken").await.is_err());
        assert!(provider.search_manga("Fine").await.is_ok());
    }
}
