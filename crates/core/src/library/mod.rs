//! Library scanning: filesystem tree to catalog.
//!
//! The library root is laid out as `<root>/<source>/<manga>/<chapter>.cbz`,
//! with an optional `cover.<ext>` file in each manga directory.

pub mod archive;
mod natural;
mod scanner;
mod scheduler;

pub use archive::ArchiveError;
pub use natural::{assign_chapter_numbers, first_number, natural_cmp};
pub use scanner::{
    LibraryScanner, ReconciliationTally, ScanError, ScanFailure, ScanOptions, ScanReport, ScanState,
};
pub use scheduler::{ScanScheduler, SchedulerStatus};

use std::path::{Path, PathBuf};

use crate::catalog::{Chapter, Manga};

/// Extension of chapter archives.
pub const CHAPTER_EXTENSION: &str = "cbz";

/// Directory holding a manga's chapters and cover.
pub fn manga_dir(root: &Path, manga: &Manga) -> PathBuf {
    root.join(&manga.source).join(&manga.path_name)
}

/// Archive file of a chapter.
pub fn chapter_archive(root: &Path, manga: &Manga, chapter: &Chapter) -> PathBuf {
    manga_dir(root, manga).join(format!("{}.{}", chapter.path_name, CHAPTER_EXTENSION))
}

/// Cover file of a manga, if one is cataloged.
pub fn cover_path(root: &Path, manga: &Manga) -> Option<PathBuf> {
    manga
        .cover
        .as_ref()
        .map(|cover| manga_dir(root, manga).join(cover))
}
