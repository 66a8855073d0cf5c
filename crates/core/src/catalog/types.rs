//! Types for the manga catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

/// Publication status of a manga.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MangaStatus {
    Ongoing,
    Completed,
    Hiatus,
    Dropped,
    #[default]
    Unknown,
}

impl MangaStatus {
    /// Map a provider status string (any case) onto the enumeration.
    pub fn from_remote(status: &str) -> Self {
        match status.trim().to_ascii_uppercase().as_str() {
            "ONGOING" => MangaStatus::Ongoing,
            "COMPLETED" => MangaStatus::Completed,
            "HIATUS" | "ON_HIATUS" => MangaStatus::Hiatus,
            "DROPPED" | "CANCELLED" => MangaStatus::Dropped,
            _ => MangaStatus::Unknown,
        }
    }
}

/// A cataloged manga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manga {
    /// Numeric id, assigned once and never reused.
    pub id: u64,
    /// On-disk directory name; unique across the catalog.
    pub path_name: String,
    /// Owning source directory name.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genres: Option<Vec<String>>,
    /// Cover filename inside the manga directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    #[serde(default)]
    pub status: MangaStatus,
}

/// A manga that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MangaDraft {
    pub path_name: String,
    pub source: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub genres: Option<Vec<String>>,
    pub cover: Option<String>,
    pub status: MangaStatus,
}

impl MangaDraft {
    pub fn new(path_name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            path_name: path_name.into(),
            source: source.into(),
            ..Default::default()
        }
    }

    /// Turn the draft into a record once an id has been assigned.
    pub fn finalize(self, id: u64) -> Result<Manga, CatalogError> {
        if id == 0 {
            return Err(CatalogError::InvalidRecord(
                "manga id must be positive".to_string(),
            ));
        }
        if self.path_name.is_empty() {
            return Err(CatalogError::InvalidRecord(
                "manga path name is empty".to_string(),
            ));
        }
        if self.source.is_empty() {
            return Err(CatalogError::InvalidRecord(format!(
                "manga {} has no source",
                self.path_name
            )));
        }

        Ok(Manga {
            id,
            path_name: self.path_name,
            source: self.source,
            title: self.title,
            artist: self.artist,
            author: self.author,
            description: self.description,
            genres: self.genres,
            cover: self.cover,
            status: self.status,
        })
    }
}

/// A cataloged chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    /// Archive filename without extension; unique within its manga.
    pub path_name: String,
    /// Dense 1-based position in natural filename order.
    pub chapter_number: u32,
    /// Viewable pages in the archive (1 until a deep scan counts them).
    pub page_count: u32,
    pub upload_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scanlator: Option<String>,
}

/// A chapter discovered on disk that has not been numbered yet.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterDraft {
    pub path_name: String,
    pub page_count: u32,
    pub upload_date: DateTime<Utc>,
    pub title: Option<String>,
    pub scanlator: Option<String>,
}

impl ChapterDraft {
    pub fn new(path_name: impl Into<String>, upload_date: DateTime<Utc>) -> Self {
        Self {
            path_name: path_name.into(),
            page_count: 1,
            upload_date,
            title: None,
            scanlator: None,
        }
    }

    /// Turn the draft into a record with its assigned chapter number.
    pub fn finalize(self, chapter_number: u32) -> Result<Chapter, CatalogError> {
        if chapter_number == 0 {
            return Err(CatalogError::InvalidRecord(format!(
                "chapter {} has number 0 (numbers are 1-based)",
                self.path_name
            )));
        }
        if self.path_name.is_empty() {
            return Err(CatalogError::InvalidRecord(
                "chapter path name is empty".to_string(),
            ));
        }

        Ok(Chapter {
            path_name: self.path_name,
            chapter_number,
            page_count: self.page_count,
            upload_date: self.upload_date,
            title: self.title,
            scanlator: self.scanlator,
        })
    }
}

/// Errors for catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Could not allocate an id for {path_name} after {attempts} attempts")]
    IdAllocationExhausted { path_name: String, attempts: u32 },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}
