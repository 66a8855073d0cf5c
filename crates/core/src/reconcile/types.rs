//! Records returned by a metadata provider.

use chrono::{DateTime, TimeZone, Utc};

use crate::media;

/// A manga as described by the metadata provider.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemoteManga {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub genres: Vec<String>,
    /// Provider status string (e.g. "ONGOING").
    pub status: Option<String>,
    /// Thumbnail URL, usually relative to the provider's origin.
    pub thumbnail_url: Option<String>,
    pub chapters: Vec<RemoteChapter>,
}

/// A chapter as described by the metadata provider.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemoteChapter {
    pub name: String,
    /// Milliseconds since the epoch, as a decimal string.
    pub upload_date: Option<String>,
    pub scanlator: Option<String>,
    pub page_count: Option<i64>,
}

impl RemoteChapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parsed upload date; `None` when absent or not a millisecond timestamp.
    pub fn upload_date(&self) -> Option<DateTime<Utc>> {
        let millis: i64 = self.upload_date.as_deref()?.trim().parse().ok()?;
        Utc.timestamp_millis_opt(millis).single()
    }

    /// Page count, only when the provider reports a positive one.
    pub fn positive_page_count(&self) -> Option<u32> {
        self.page_count
            .filter(|n| *n > 0)
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
    }
}

/// Cover image bytes fetched from the provider.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Thumbnail {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Thumbnail {
    /// File extension derived from the declared content type.
    pub fn extension(&self) -> &'static str {
        media::extension_for_mime(self.content_type.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_date_parses_millis() {
        let chapter = RemoteChapter {
            upload_date: Some("1700000000000".to_string()),
            ..RemoteChapter::new("Chapter 1")
        };
        assert_eq!(
            chapter.upload_date(),
            Some(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap())
        );
    }

    #[test]
    fn test_upload_date_rejects_garbage() {
        let chapter = RemoteChapter {
            upload_date: Some("yesterday".to_string()),
            ..RemoteChapter::new("Chapter 1")
        };
        assert_eq!(chapter.upload_date(), None);
        assert_eq!(RemoteChapter::new("Chapter 1").upload_date(), None);
    }

    #[test]
    fn test_positive_page_count() {
        let mut chapter = RemoteChapter::new("Chapter 1");
        assert_eq!(chapter.positive_page_count(), None);
        chapter.page_count = Some(0);
        assert_eq!(chapter.positive_page_count(), None);
        chapter.page_count = Some(-1);
        assert_eq!(chapter.positive_page_count(), None);
        chapter.page_count = Some(24);
        assert_eq!(chapter.positive_page_count(), Some(24));
    }

    #[test]
    fn test_thumbnail_extension() {
        let thumb = Thumbnail {
            content_type: Some("image/png".to_string()),
            bytes: vec![],
        };
        assert_eq!(thumb.extension(), "png");
        assert_eq!(Thumbnail::default().extension(), "jpg");
    }
}
