//! Testing utilities and mock implementations.
//!
//! This module provides a mock metadata provider and fixtures that build
//! real library trees on disk, allowing end-to-end tests without a running
//! metadata server.
//!
//! # Example
//!
//! ```rust,ignore
//! use tankobon_core::testing::{fixtures::LibraryFixture, MockMetadataProvider};
//!
//! let dir = tempfile::TempDir::new()?;
//! let library = LibraryFixture::new(dir.path())?;
//! library.add_chapter("SourceA", "MangaX", "Chapter_1", 3)?;
//!
//! let provider = MockMetadataProvider::new();
//! // Use with a Reconciler...
//! ```

mod hooked_kv;
mod mock_metadata_provider;

pub use hooked_kv::{HookedKv, StoreHook};
pub use mock_metadata_provider::{ErrorFactory, MockMetadataProvider};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::fs::{self, File};
    use std::io::{self, Write};
    use std::path::{Path, PathBuf};

    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    use crate::library::archive::COMIC_INFO_ENTRY;
    use crate::reconcile::{RemoteChapter, RemoteManga};

    /// Create a remote manga with a title and no chapters.
    pub fn remote_manga(title: &str) -> RemoteManga {
        RemoteManga {
            title: Some(title.to_string()),
            artist: Some("Test Artist".to_string()),
            author: Some("Test Author".to_string()),
            description: Some(format!("A story about {}.", title.to_lowercase())),
            genres: vec!["Action".to_string()],
            status: Some("ONGOING".to_string()),
            thumbnail_url: None,
            chapters: Vec::new(),
        }
    }

    /// Create a remote chapter uploaded at `upload_millis`.
    pub fn remote_chapter(name: &str, upload_millis: i64) -> RemoteChapter {
        RemoteChapter {
            name: name.to_string(),
            upload_date: Some(upload_millis.to_string()),
            scanlator: None,
            page_count: None,
        }
    }

    /// Write a zip archive with the given entries.
    ///
    /// Each file entry contains its own name as bytes; names ending in `/`
    /// become directory entries.
    pub fn write_cbz(path: &Path, entries: &[&str]) -> io::Result<()> {
        let mut zip = ZipWriter::new(File::create(path)?);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        for name in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, options).map_err(io::Error::other)?;
            } else {
                zip.start_file(*name, options).map_err(io::Error::other)?;
                zip.write_all(name.as_bytes())?;
            }
        }

        zip.finish().map_err(io::Error::other)?;
        Ok(())
    }

    /// Builds a `<root>/<source>/<manga>/<chapter>.cbz` tree.
    #[derive(Debug, Clone)]
    pub struct LibraryFixture {
        root: PathBuf,
    }

    impl LibraryFixture {
        pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
            let root = root.into();
            fs::create_dir_all(&root)?;
            Ok(Self { root })
        }

        pub fn root(&self) -> &Path {
            &self.root
        }

        pub fn manga_dir(&self, source: &str, manga: &str) -> PathBuf {
            self.root.join(source).join(manga)
        }

        /// Create an (empty) manga directory.
        pub fn add_manga(&self, source: &str, manga: &str) -> io::Result<PathBuf> {
            let dir = self.manga_dir(source, manga);
            fs::create_dir_all(&dir)?;
            Ok(dir)
        }

        /// Add `<chapter>.cbz` with `pages` images plus a `ComicInfo.xml`.
        pub fn add_chapter(
            &self,
            source: &str,
            manga: &str,
            chapter: &str,
            pages: usize,
        ) -> io::Result<PathBuf> {
            let dir = self.add_manga(source, manga)?;
            let path = dir.join(format!("{}.cbz", chapter));

            let names: Vec<String> = (1..=pages).map(|i| format!("{:03}.jpg", i)).collect();
            let mut entries: Vec<&str> = names.iter().map(String::as_str).collect();
            entries.push(COMIC_INFO_ENTRY);
            write_cbz(&path, &entries)?;

            Ok(path)
        }

        /// Add an arbitrary file to a manga directory.
        pub fn add_file(
            &self,
            source: &str,
            manga: &str,
            name: &str,
            contents: &[u8],
        ) -> io::Result<PathBuf> {
            let dir = self.add_manga(source, manga)?;
            let path = dir.join(name);
            fs::write(&path, contents)?;
            Ok(path)
        }

        /// Add a cover image file.
        pub fn add_cover(&self, source: &str, manga: &str, name: &str) -> io::Result<PathBuf> {
            self.add_file(source, manga, name, b"cover-bytes")
        }
    }
}
