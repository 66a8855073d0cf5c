//! Tachidesk (Suwayomi) GraphQL metadata provider.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::types::{RemoteChapter, RemoteManga, Thumbnail};
use super::{MetadataProvider, ProviderError};
use crate::metrics;
use crate::retry::RetryPolicy;

const SERVICE: &str = "tachidesk";

const SEARCH_IN_LIBRARY_QUERY: &str = r#"
query mangas($title: String) {
  mangas(filter: {title: {includesInsensitive: $title}, inLibrary: {equalTo: true}}) {
    nodes {
      title artist author description genre status thumbnailUrl
      chapters { nodes { name uploadDate scanlator pageCount } }
    }
  }
}
"#;

const SEARCH_ALL_QUERY: &str = r#"
query mangas($title: String) {
  mangas(filter: {title: {includesInsensitive: $title}}) {
    nodes {
      title artist author description genre status thumbnailUrl
      chapters { nodes { name uploadDate scanlator pageCount } }
    }
  }
}
"#;

/// Tachidesk client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TachideskConfig {
    /// GraphQL endpoint URL.
    #[serde(default = "default_url")]
    pub url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Attempts per reconciliation before giving up on a manga.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Only match manga that are in the Tachidesk library.
    #[serde(default = "default_in_library_only")]
    pub in_library_only: bool,
}

fn default_url() -> String {
    "http://localhost:4567/api/graphql".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    20
}

fn default_in_library_only() -> bool {
    true
}

impl Default for TachideskConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            in_library_only: default_in_library_only(),
        }
    }
}

impl TachideskConfig {
    /// Retry policy for reconciliations against this provider.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::immediate(self.max_attempts)
    }
}

// GraphQL wire format

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct MangasData {
    mangas: NodeList<MangaNode>,
}

#[derive(Debug, Deserialize)]
struct NodeList<T> {
    nodes: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MangaNode {
    title: Option<String>,
    artist: Option<String>,
    author: Option<String>,
    description: Option<String>,
    #[serde(default)]
    genre: Vec<String>,
    status: Option<String>,
    thumbnail_url: Option<String>,
    chapters: Option<NodeList<ChapterNode>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChapterNode {
    name: String,
    /// A numeric string in practice; numbers are accepted too.
    upload_date: Option<Value>,
    scanlator: Option<String>,
    page_count: Option<i64>,
}

impl From<ChapterNode> for RemoteChapter {
    fn from(node: ChapterNode) -> Self {
        let upload_date = match node.upload_date {
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        RemoteChapter {
            name: node.name,
            upload_date,
            scanlator: node.scanlator,
            page_count: node.page_count,
        }
    }
}

impl From<MangaNode> for RemoteManga {
    fn from(node: MangaNode) -> Self {
        RemoteManga {
            title: node.title,
            artist: node.artist,
            author: node.author,
            description: node.description,
            genres: node.genre,
            status: node.status,
            thumbnail_url: node.thumbnail_url,
            chapters: node
                .chapters
                .map(|c| c.nodes.into_iter().map(RemoteChapter::from).collect())
                .unwrap_or_default(),
        }
    }
}

/// Tachidesk GraphQL client.
pub struct TachideskClient {
    client: Client,
    endpoint: Url,
    origin: String,
    in_library_only: bool,
}

impl TachideskClient {
    /// Create a new Tachidesk client.
    pub fn new(config: &TachideskConfig) -> Result<Self, ProviderError> {
        let endpoint = Url::parse(&config.url)
            .map_err(|e| ProviderError::InvalidUrl(format!("{}: {}", config.url, e)))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ProviderError::InvalidUrl(format!(
                "{}: unsupported scheme {}",
                config.url,
                endpoint.scheme()
            )));
        }
        let origin = endpoint.origin().ascii_serialization();

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            origin,
            in_library_only: config.in_library_only,
        })
    }

    /// Resolve a thumbnail URL against the endpoint's origin.
    pub fn resolve_thumbnail_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if url.starts_with('/') {
            format!("{}{}", self.origin, url)
        } else {
            format!("{}/{}", self.origin, url)
        }
    }

    fn parse_search_response(body: &str) -> Result<Vec<RemoteManga>, ProviderError> {
        let response: GraphQlResponse<MangasData> = serde_json::from_str(body).map_err(|e| {
            ProviderError::Parse(format!("Failed to parse manga search response: {}", e))
        })?;

        if !response.errors.is_empty() {
            let messages: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
            return Err(ProviderError::GraphQl(messages.join("; ")));
        }

        let data = response
            .data
            .ok_or_else(|| ProviderError::Parse("Response has no data".to_string()))?;

        Ok(data.mangas.nodes.into_iter().map(RemoteManga::from).collect())
    }

    fn record(operation: &str, started: Instant, ok: bool) {
        metrics::EXTERNAL_SERVICE_DURATION
            .with_label_values(&[SERVICE, operation])
            .observe(started.elapsed().as_secs_f64());
        metrics::EXTERNAL_SERVICE_REQUESTS
            .with_label_values(&[SERVICE, operation, if ok { "success" } else { "error" }])
            .inc();
    }

    async fn post_search(&self, title: &str) -> Result<Vec<RemoteManga>, ProviderError> {
        let query = if self.in_library_only {
            SEARCH_IN_LIBRARY_QUERY
        } else {
            SEARCH_ALL_QUERY
        };
        let payload = json!({
            "query": query,
            "variables": { "title": title },
        });

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = response.text().await?;
        Self::parse_search_response(&body)
    }

    async fn get_thumbnail(&self, url: &str) -> Result<Thumbnail, ProviderError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: format!("Failed to fetch {}", url),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?.to_vec();

        Ok(Thumbnail {
            content_type,
            bytes,
        })
    }
}

#[async_trait]
impl MetadataProvider for TachideskClient {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn search_manga(&self, title: &str) -> Result<Vec<RemoteManga>, ProviderError> {
        debug!("Tachidesk manga search: title='{}'", title);

        let started = Instant::now();
        let result = self.post_search(title).await;
        Self::record("search", started, result.is_ok());
        result
    }

    async fn fetch_thumbnail(&self, url: &str) -> Result<Thumbnail, ProviderError> {
        let url = self.resolve_thumbnail_url(url);
        debug!("Tachidesk thumbnail fetch: url='{}'", url);

        let started = Instant::now();
        let result = self.get_thumbnail(&url).await;
        Self::record("thumbnail", started, result.is_ok());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str) -> TachideskClient {
        TachideskClient::new(&TachideskConfig {
            url: url.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = TachideskConfig::default();
        assert_eq!(config.url, "http://localhost:4567/api/graphql");
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.max_attempts, 20);
        assert!(config.in_library_only);
        assert_eq!(config.retry_policy(), RetryPolicy::immediate(20));
    }

    #[test]
    fn test_config_partial_toml() {
        let config: TachideskConfig = toml::from_str(r#"url = "http://tachi:4567/api/graphql""#).unwrap();
        assert_eq!(config.url, "http://tachi:4567/api/graphql");
        assert_eq!(config.max_attempts, 20);
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let result = TachideskClient::new(&TachideskConfig {
            url: "not a url".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(ProviderError::InvalidUrl(_))));

        let result = TachideskClient::new(&TachideskConfig {
            url: "ftp://host/api/graphql".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(ProviderError::InvalidUrl(_))));
    }

    #[test]
    fn test_thumbnail_url_uses_endpoint_origin() {
        let c = client("http://localhost:4567/api/graphql");
        assert_eq!(
            c.resolve_thumbnail_url("/api/v1/manga/3/thumbnail"),
            "http://localhost:4567/api/v1/manga/3/thumbnail"
        );
        assert_eq!(
            c.resolve_thumbnail_url("api/v1/manga/3/thumbnail"),
            "http://localhost:4567/api/v1/manga/3/thumbnail"
        );
        assert_eq!(
            c.resolve_thumbnail_url("https://cdn.example.com/x.png"),
            "https://cdn.example.com/x.png"
        );
    }

    #[test]
    fn test_parse_search_response() {
        let body = r#"{
            "data": {
                "mangas": {
                    "nodes": [{
                        "title": "Manga X",
                        "artist": "Artist",
                        "author": "Author",
                        "description": "A story",
                        "genre": ["Action", "Drama"],
                        "status": "ONGOING",
                        "thumbnailUrl": "/api/v1/manga/1/thumbnail",
                        "chapters": {
                            "nodes": [
                                {"name": "Chapter 1", "uploadDate": "1700000000000", "scanlator": "Group", "pageCount": 20},
                                {"name": "Chapter 2", "uploadDate": 1700000100000, "scanlator": null, "pageCount": -1}
                            ]
                        }
                    }]
                }
            }
        }"#;

        let mangas = TachideskClient::parse_search_response(body).unwrap();
        assert_eq!(mangas.len(), 1);
        let manga = &mangas[0];
        assert_eq!(manga.title.as_deref(), Some("Manga X"));
        assert_eq!(manga.genres, vec!["Action", "Drama"]);
        assert_eq!(manga.thumbnail_url.as_deref(), Some("/api/v1/manga/1/thumbnail"));
        assert_eq!(manga.chapters.len(), 2);
        assert_eq!(manga.chapters[0].upload_date.as_deref(), Some("1700000000000"));
        assert_eq!(manga.chapters[0].page_count, Some(20));
        assert_eq!(manga.chapters[1].upload_date.as_deref(), Some("1700000100000"));
        assert!(manga.chapters[1].scanlator.is_none());
    }

    #[test]
    fn test_parse_empty_result() {
        let body = r#"{"data": {"mangas": {"nodes": []}}}"#;
        assert!(TachideskClient::parse_search_response(body).unwrap().is_empty());
    }

    #[test]
    fn test_parse_graphql_errors() {
        let body = r#"{"data": null, "errors": [{"message": "boom"}, {"message": "bang"}]}"#;
        match TachideskClient::parse_search_response(body) {
            Err(ProviderError::GraphQl(msg)) => assert_eq!(msg, "boom; bang"),
            other => panic!("expected GraphQl error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_malformed_body() {
        assert!(matches!(
            TachideskClient::parse_search_response("<html>"),
            Err(ProviderError::Parse(_))
        ));
    }
}
