//! Chapter archive (cbz) access.
//!
//! All functions here do blocking I/O; async callers run them on the
//! blocking pool.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use thiserror::Error;
use zip::ZipArchive;

use super::natural::natural_cmp;

/// Archive entry that holds metadata, never a page.
pub const COMIC_INFO_ENTRY: &str = "ComicInfo.xml";

/// Errors for archive access.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Page {page} out of range (archive has {count} pages)")]
    PageOutOfRange { page: usize, count: usize },
}

/// A page extracted from an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Entry name inside the archive.
    pub name: String,
    pub data: Vec<u8>,
}

fn open(path: &Path) -> Result<ZipArchive<File>, ArchiveError> {
    Ok(ZipArchive::new(File::open(path)?)?)
}

/// Names of the viewable pages in natural order.
///
/// Directory entries and `ComicInfo.xml` are not pages.
pub fn page_names(path: &Path) -> Result<Vec<String>, ArchiveError> {
    let mut archive = open(path)?;
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if entry.is_dir() || entry.name() == COMIC_INFO_ENTRY {
            continue;
        }
        names.push(entry.name().to_string());
    }
    names.sort_by(|a, b| natural_cmp(a, b));
    Ok(names)
}

/// Number of viewable pages in the archive.
pub fn count_pages(path: &Path) -> Result<u32, ArchiveError> {
    Ok(u32::try_from(page_names(path)?.len()).unwrap_or(u32::MAX))
}

/// Read a page by its 1-based position in [`page_names`] order.
pub fn read_page(path: &Path, page: usize) -> Result<Page, ArchiveError> {
    let names = page_names(path)?;
    let name = page
        .checked_sub(1)
        .and_then(|i| names.get(i))
        .ok_or(ArchiveError::PageOutOfRange {
            page,
            count: names.len(),
        })?;

    let mut archive = open(path)?;
    let mut entry = archive.by_name(name)?;
    let mut data = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
    entry.read_to_end(&mut data)?;

    Ok(Page {
        name: name.clone(),
        data,
    })
}
