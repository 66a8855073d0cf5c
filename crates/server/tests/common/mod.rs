//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! over a temporary library tree with a mock metadata provider injected,
//! enabling E2E testing without a running Tachidesk instance.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use tankobon_core::{
    testing::{fixtures::LibraryFixture, MockMetadataProvider},
    Catalog, Config, DatabaseConfig, LibraryConfig, LibraryScanner, Reconciler, RetryPolicy,
    ScanOptions, SqliteKv, DEFAULT_CATEGORY,
};
use tankobon_server::state::AppState;

/// Re-export fixtures for test convenience
pub use tankobon_core::testing::fixtures;

/// Test fixture for E2E testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_manga_listing() {
///     let fixture = TestFixture::new().await;
///     fixture.library.add_chapter("SourceA", "MangaX", "Chapter 1", 3).unwrap();
///     fixture.scan().await;
///
///     let response = fixture.get("/api/v1/manga").await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Library tree writer
    pub library: LibraryFixture,
    /// The catalog behind the router
    pub catalog: Arc<Catalog>,
    /// Mock provider - configure search results
    pub provider: Arc<MockMetadataProvider>,
    /// Scanner shared with the router
    pub scanner: Arc<LibraryScanner>,
    /// Temporary directory for the database and library
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub body: Value,
}

impl TestFixture {
    /// Create a fixture with a mock provider attached.
    pub async fn new() -> Self {
        Self::build(true).await
    }

    /// Create a fixture with reconciliation disabled.
    pub async fn without_provider() -> Self {
        Self::build(false).await
    }

    async fn build(with_provider: bool) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        let library =
            LibraryFixture::new(temp_dir.path().join("mangas")).expect("Failed to create library");

        let config = Config {
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            library: LibraryConfig {
                root: library.root().to_path_buf(),
                scan_on_startup: false,
                ..Default::default()
            },
            ..Default::default()
        };

        let store = SqliteKv::new(&db_path).expect("Failed to create store");
        let catalog = Arc::new(Catalog::new(Arc::new(store)));
        catalog
            .add_category(DEFAULT_CATEGORY)
            .expect("Failed to create default category");

        let provider = Arc::new(MockMetadataProvider::new());
        let options = ScanOptions {
            await_reconciliation: true,
            ..Default::default()
        };
        let mut scanner = LibraryScanner::new(library.root(), Arc::clone(&catalog), options);
        if with_provider {
            let reconciler = Reconciler::new(
                Arc::clone(&catalog),
                Arc::clone(&provider) as Arc<dyn tankobon_core::MetadataProvider>,
                library.root(),
            )
            .with_retry_policy(RetryPolicy::immediate(2));
            scanner = scanner.with_reconciler(Arc::new(reconciler));
        }
        let scanner = Arc::new(scanner);

        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&catalog),
            Arc::clone(&scanner),
            None,
        ));
        let router = tankobon_server::api::create_router(state);

        Self {
            router,
            library,
            catalog,
            provider,
            scanner,
            temp_dir,
        }
    }

    /// Run a scan directly, bypassing the API.
    pub async fn scan(&self) {
        self.scanner.scan().await.expect("Scan failed");
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes()
            .to_vec();

        let body: Value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            content_type,
            bytes,
            body,
        }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
