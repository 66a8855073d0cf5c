//! Key layout of the catalog inside the key-value store.

use crate::key;
use crate::store::Key;

/// Next manga id to hand out (absent means 1).
pub(super) fn manga_counter() -> Key {
    key!["manga_count"]
}

pub(super) fn sources() -> Key {
    key!["sources"]
}

pub(super) fn source(name: &str) -> Key {
    key!["sources", name]
}

pub(super) fn categories() -> Key {
    key!["categories"]
}

pub(super) fn category(name: &str) -> Key {
    key!["categories", name]
}

/// category -> manga ids
pub(super) fn category_members(category: &str) -> Key {
    key!["category_manga", category]
}

pub(super) fn category_member(category: &str, manga_id: u64) -> Key {
    key!["category_manga", category, manga_id]
}

/// manga id -> category names
pub(super) fn manga_categories(manga_id: u64) -> Key {
    key!["manga_category", manga_id]
}

pub(super) fn manga_category(manga_id: u64, category: &str) -> Key {
    key!["manga_category", manga_id, category]
}

/// source -> manga ids
pub(super) fn source_members(source: &str) -> Key {
    key!["manga_source", source]
}

pub(super) fn source_member(source: &str, manga_id: u64) -> Key {
    key!["manga_source", source, manga_id]
}

pub(super) fn mangas() -> Key {
    key!["mangas"]
}

pub(super) fn manga(id: u64) -> Key {
    key!["mangas", id]
}

/// pathName -> manga id
pub(super) fn manga_by_path(path_name: &str) -> Key {
    key!["mangas_by_path", path_name]
}

pub(super) fn chapters(manga_id: u64) -> Key {
    key!["chapters", manga_id]
}

pub(super) fn chapter(manga_id: u64, path_name: &str) -> Key {
    key!["chapters", manga_id, path_name]
}

/// chapterNumber -> chapter pathName
pub(super) fn chapter_number(manga_id: u64, number: u32) -> Key {
    key!["chapter_number", manga_id, number]
}
