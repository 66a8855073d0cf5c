//! Typed catalog operations on top of the key-value store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::keys;
use super::types::{CatalogError, Chapter, Manga, MangaDraft};
use crate::metrics;
use crate::retry::{RetryError, RetryPolicy};
use crate::store::{AtomicWrite, Key, KvEntry, KvStore, SqliteKv, StoreError, Versionstamp};

/// Category every newly cataloged manga is placed in.
pub const DEFAULT_CATEGORY: &str = "Default";

/// The manga catalog.
///
/// Cheap to share behind an `Arc`; all state lives in the underlying store.
pub struct Catalog {
    store: Arc<dyn KvStore>,
    retry: RetryPolicy,
}

impl Catalog {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    /// Create a catalog backed by an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, CatalogError> {
        Ok(Self::new(Arc::new(SqliteKv::in_memory()?)))
    }

    /// Policy for optimistic-concurrency retries (id allocation, field merges).
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn is_conflict(e: &CatalogError) -> bool {
        matches!(e, CatalogError::Store(StoreError::PreconditionFailed))
    }

    fn get_value<T: DeserializeOwned>(&self, key: &Key) -> Result<Option<T>, CatalogError> {
        Ok(self.store.get(key)?.map(|e| e.decode()).transpose()?)
    }

    fn list_values<T: DeserializeOwned>(&self, prefix: &Key) -> Result<Vec<T>, CatalogError> {
        self.store
            .list(prefix)?
            .iter()
            .map(|e| e.decode().map_err(CatalogError::from))
            .collect()
    }

    /// Write a name row unless it already exists. Returns whether it was created.
    fn insert_name_if_absent(&self, key: Key, name: &str) -> Result<bool, CatalogError> {
        let write = AtomicWrite::new().check(key.clone(), None).set(key, name)?;
        match self.store.commit(write) {
            Ok(_) => Ok(true),
            Err(StoreError::PreconditionFailed) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn require_manga(&self, id: u64) -> Result<Manga, CatalogError> {
        self.manga(id)?
            .ok_or_else(|| CatalogError::NotFound(format!("manga {}", id)))
    }

    fn lookup_mangas(&self, ids: Vec<u64>) -> Result<Vec<Manga>, CatalogError> {
        let mut mangas = Vec::with_capacity(ids.len());
        for id in ids {
            match self.manga(id)? {
                Some(manga) => mangas.push(manga),
                None => warn!(manga_id = id, "Index refers to a missing manga"),
            }
        }
        Ok(mangas)
    }

    // =========================================================================
    // Sources
    // =========================================================================

    /// Register a source. Re-registering is a no-op; returns whether it was new.
    pub fn add_source(&self, name: &str) -> Result<bool, CatalogError> {
        self.insert_name_if_absent(keys::source(name), name)
    }

    /// All source names in key order.
    pub fn sources(&self) -> Result<Vec<String>, CatalogError> {
        self.list_values(&keys::sources())
    }

    pub fn mangas_in_source(&self, source: &str) -> Result<Vec<Manga>, CatalogError> {
        let ids = self.list_values(&keys::source_members(source))?;
        self.lookup_mangas(ids)
    }

    // =========================================================================
    // Categories
    // =========================================================================

    /// Create a category. Re-creating is a no-op; returns whether it was new.
    pub fn add_category(&self, name: &str) -> Result<bool, CatalogError> {
        self.insert_name_if_absent(keys::category(name), name)
    }

    /// All category names in key order.
    pub fn categories(&self) -> Result<Vec<String>, CatalogError> {
        self.list_values(&keys::categories())
    }

    /// Put a manga in a category, creating the category if needed.
    ///
    /// The category row and both directions of the membership index are
    /// written in one atomic commit.
    pub fn add_manga_to_category(&self, manga_id: u64, category: &str) -> Result<(), CatalogError> {
        self.require_manga(manga_id)?;

        let write = AtomicWrite::new()
            .set(keys::category(category), category)?
            .set(keys::category_member(category, manga_id), &manga_id)?
            .set(keys::manga_category(manga_id, category), category)?;
        self.store.commit(write)?;

        debug!(manga_id, category, "Added manga to category");
        Ok(())
    }

    pub fn categories_of_manga(&self, manga_id: u64) -> Result<Vec<String>, CatalogError> {
        self.list_values(&keys::manga_categories(manga_id))
    }

    pub fn mangas_in_category(&self, category: &str) -> Result<Vec<Manga>, CatalogError> {
        let ids = self.list_values(&keys::category_members(category))?;
        self.lookup_mangas(ids)
    }

    // =========================================================================
    // Manga
    // =========================================================================

    /// Assign the next manga id to `draft` and write it with its indexes.
    ///
    /// The record, the pathName index, the source membership, the
    /// [`DEFAULT_CATEGORY`] membership and the id counter are written in one
    /// commit conditioned on the counter being unchanged since it was read
    /// and the pathName being unindexed. A lost race is retried from the
    /// read. If the pathName turns out to be cataloged already, its existing
    /// id is returned.
    pub fn allocate_manga(&self, draft: &MangaDraft) -> Result<u64, CatalogError> {
        self.retry
            .run_blocking(|_| self.try_allocate_manga(draft), Self::is_conflict)
            .map_err(|e| match e {
                RetryError::Exhausted { attempts, .. } => CatalogError::IdAllocationExhausted {
                    path_name: draft.path_name.clone(),
                    attempts,
                },
                RetryError::Fatal(e) => e,
            })
    }

    fn try_allocate_manga(&self, draft: &MangaDraft) -> Result<u64, CatalogError> {
        if let Some(id) = self.manga_id_for_path(&draft.path_name)? {
            return Ok(id);
        }

        let counter = self.store.get(&keys::manga_counter())?;
        let (id, counter_stamp) = match &counter {
            Some(entry) => (entry.decode::<u64>()?, Some(entry.versionstamp)),
            None => (1, None),
        };

        let manga = draft.clone().finalize(id)?;
        let write = AtomicWrite::new()
            .check(keys::manga_counter(), counter_stamp)
            .check(keys::manga_by_path(&manga.path_name), None)
            .set(keys::manga(id), &manga)?
            .set(keys::manga_by_path(&manga.path_name), &id)?
            .set(keys::source_member(&manga.source, id), &id)?
            .set(keys::source(&manga.source), &manga.source)?
            .set(keys::category(DEFAULT_CATEGORY), DEFAULT_CATEGORY)?
            .set(keys::category_member(DEFAULT_CATEGORY, id), &id)?
            .set(keys::manga_category(id, DEFAULT_CATEGORY), DEFAULT_CATEGORY)?
            .set(keys::manga_counter(), &(id + 1))?;

        match self.store.commit(write) {
            Ok(_) => {
                debug!(manga_id = id, path_name = %manga.path_name, "Allocated manga id");
                Ok(id)
            }
            Err(StoreError::PreconditionFailed) => {
                metrics::ID_ALLOCATION_CONFLICTS.inc();
                Err(StoreError::PreconditionFailed.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn manga(&self, id: u64) -> Result<Option<Manga>, CatalogError> {
        self.get_value(&keys::manga(id))
    }

    pub fn manga_id_for_path(&self, path_name: &str) -> Result<Option<u64>, CatalogError> {
        self.get_value(&keys::manga_by_path(path_name))
    }

    pub fn manga_by_path(&self, path_name: &str) -> Result<Option<Manga>, CatalogError> {
        match self.manga_id_for_path(path_name)? {
            Some(id) => self.manga(id),
            None => Ok(None),
        }
    }

    /// All manga in id order.
    pub fn all_mangas(&self) -> Result<Vec<Manga>, CatalogError> {
        self.list_values(&keys::mangas())
    }

    pub fn is_manga_added(&self, path_name: &str) -> Result<bool, CatalogError> {
        Ok(self.manga_id_for_path(path_name)?.is_some())
    }

    /// Overwrite an existing manga record.
    ///
    /// The id, pathName and source are identity and must match the stored record.
    pub fn update_manga(&self, manga: &Manga) -> Result<(), CatalogError> {
        let existing = self.require_manga(manga.id)?;
        if existing.path_name != manga.path_name || existing.source != manga.source {
            return Err(CatalogError::InvalidRecord(format!(
                "manga {} cannot change its path or source",
                manga.id
            )));
        }

        self.store
            .commit(AtomicWrite::new().set(keys::manga(manga.id), manga)?)?;
        Ok(())
    }

    /// Read-modify-write a manga record, retrying if it changed underneath.
    ///
    /// Identity fields are restored after `modify` runs.
    pub fn modify_manga<F>(&self, id: u64, mut modify: F) -> Result<Manga, CatalogError>
    where
        F: FnMut(&mut Manga),
    {
        self.retry
            .run_blocking(
                |_| -> Result<Manga, CatalogError> {
                    let entry = self
                        .store
                        .get(&keys::manga(id))?
                        .ok_or_else(|| CatalogError::NotFound(format!("manga {}", id)))?;
                    let current: Manga = entry.decode()?;

                    let mut updated = current.clone();
                    modify(&mut updated);
                    updated.id = current.id;
                    updated.path_name = current.path_name.clone();
                    updated.source = current.source.clone();
                    if updated == current {
                        return Ok(current);
                    }

                    let write = AtomicWrite::new()
                        .check(keys::manga(id), Some(entry.versionstamp))
                        .set(keys::manga(id), &updated)?;
                    self.store.commit(write)?;
                    Ok(updated)
                },
                Self::is_conflict,
            )
            .map_err(RetryError::into_inner)
    }

    /// Record the cover filename of a manga.
    pub fn set_cover(&self, id: u64, cover: &str) -> Result<(), CatalogError> {
        self.modify_manga(id, |manga| manga.cover = Some(cover.to_string()))?;
        Ok(())
    }

    // =========================================================================
    // Chapters
    // =========================================================================

    /// Insert a chapter and its number index.
    ///
    /// Without `replace` the write is conditioned on the chapter being absent
    /// and an existing chapter is left untouched (returns `false`). With
    /// `replace` an existing chapter is overwritten.
    pub fn insert_chapter(
        &self,
        manga_id: u64,
        chapter: &Chapter,
        replace: bool,
    ) -> Result<bool, CatalogError> {
        self.require_manga(manga_id)?;

        let chapter_key = keys::chapter(manga_id, &chapter.path_name);
        let existing = self.store.get(&chapter_key)?;
        if existing.is_some() && !replace {
            return Ok(false);
        }

        let number_key = keys::chapter_number(manga_id, chapter.chapter_number);
        let number_entry = self.store.get(&number_key)?;
        if let Some(entry) = &number_entry {
            let holder: String = entry.decode()?;
            if holder != chapter.path_name {
                return Err(CatalogError::InvalidRecord(format!(
                    "chapter number {} of manga {} already belongs to {}",
                    chapter.chapter_number, manga_id, holder
                )));
            }
        }

        let mut write = AtomicWrite::new()
            .check(chapter_key.clone(), existing.as_ref().map(|e| e.versionstamp))
            .check(number_key.clone(), number_entry.as_ref().map(|e| e.versionstamp));

        if let Some(entry) = &existing {
            let old: Chapter = entry.decode()?;
            if old.chapter_number != chapter.chapter_number {
                let old_key = keys::chapter_number(manga_id, old.chapter_number);
                if let Some(old_index) = self.store.get(&old_key)? {
                    if old_index.decode::<String>()? == chapter.path_name {
                        write = write
                            .check(old_key.clone(), Some(old_index.versionstamp))
                            .delete(old_key);
                    }
                }
            }
        }

        let write = write
            .set(chapter_key, chapter)?
            .set(number_key, &chapter.path_name)?;

        match self.store.commit(write) {
            Ok(_) => Ok(true),
            Err(StoreError::PreconditionFailed)
                if !replace && self.is_chapter_added(manga_id, &chapter.path_name)? =>
            {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Move already-cataloged chapters to new numbers in one atomic commit.
    ///
    /// Every target number must be free once the batch is applied: it may be
    /// held only by chapters that are themselves moving. Returns how many
    /// chapters actually changed number.
    pub fn renumber_chapters(
        &self,
        manga_id: u64,
        assignments: &[(String, u32)],
    ) -> Result<usize, CatalogError> {
        let current: HashMap<String, (Chapter, Versionstamp)> = self
            .store
            .list(&keys::chapters(manga_id))?
            .iter()
            .map(|entry: &KvEntry| -> Result<(String, (Chapter, Versionstamp)), CatalogError> {
                let chapter: Chapter = entry.decode()?;
                Ok((chapter.path_name.clone(), (chapter, entry.versionstamp)))
            })
            .collect::<Result<_, CatalogError>>()?;

        let mut moving = Vec::new();
        for (path_name, number) in assignments {
            let (chapter, stamp) = current.get(path_name).ok_or_else(|| {
                CatalogError::NotFound(format!("chapter {} of manga {}", path_name, manga_id))
            })?;
            if chapter.chapter_number != *number {
                moving.push((chapter.clone(), *stamp, *number));
            }
        }
        if moving.is_empty() {
            return Ok(0);
        }

        let moving_paths: HashSet<&str> = moving.iter().map(|(c, _, _)| c.path_name.as_str()).collect();
        let fixed_numbers: HashSet<u32> = current
            .values()
            .filter(|(c, _)| !moving_paths.contains(c.path_name.as_str()))
            .map(|(c, _)| c.chapter_number)
            .collect();
        let mut targets = HashSet::new();
        for (chapter, _, number) in &moving {
            if *number == 0 || fixed_numbers.contains(number) || !targets.insert(*number) {
                return Err(CatalogError::InvalidRecord(format!(
                    "cannot move chapter {} of manga {} to number {}",
                    chapter.path_name, manga_id, number
                )));
            }
        }

        // Old index entries go first so a number can pass from one chapter to another.
        let mut write = AtomicWrite::new();
        for (chapter, stamp, _) in &moving {
            write = write
                .check(keys::chapter(manga_id, &chapter.path_name), Some(*stamp))
                .delete(keys::chapter_number(manga_id, chapter.chapter_number));
        }
        let count = moving.len();
        for (mut chapter, _, number) in moving {
            chapter.chapter_number = number;
            write = write
                .set(keys::chapter_number(manga_id, number), &chapter.path_name)?
                .set(keys::chapter(manga_id, &chapter.path_name), &chapter)?;
        }
        self.store.commit(write)?;

        debug!(manga_id, count, "Renumbered chapters");
        Ok(count)
    }

    /// Move a single chapter to a new number. Returns whether it changed.
    pub fn renumber_chapter(
        &self,
        manga_id: u64,
        path_name: &str,
        number: u32,
    ) -> Result<bool, CatalogError> {
        Ok(self.renumber_chapters(manga_id, &[(path_name.to_string(), number)])? > 0)
    }

    pub fn chapter(&self, manga_id: u64, path_name: &str) -> Result<Option<Chapter>, CatalogError> {
        self.get_value(&keys::chapter(manga_id, path_name))
    }

    pub fn chapter_path_for_number(
        &self,
        manga_id: u64,
        number: u32,
    ) -> Result<Option<String>, CatalogError> {
        self.get_value(&keys::chapter_number(manga_id, number))
    }

    pub fn chapter_by_number(
        &self,
        manga_id: u64,
        number: u32,
    ) -> Result<Option<Chapter>, CatalogError> {
        match self.chapter_path_for_number(manga_id, number)? {
            Some(path_name) => self.chapter(manga_id, &path_name),
            None => Ok(None),
        }
    }

    /// Chapters of a manga in storage (pathName) order.
    pub fn manga_chapters(&self, manga_id: u64) -> Result<Vec<Chapter>, CatalogError> {
        self.list_values(&keys::chapters(manga_id))
    }

    /// Chapters of a manga ordered by chapter number.
    pub fn manga_chapters_sorted(&self, manga_id: u64) -> Result<Vec<Chapter>, CatalogError> {
        let mut chapters = self.manga_chapters(manga_id)?;
        chapters.sort_by_key(|c| c.chapter_number);
        Ok(chapters)
    }

    pub fn chapter_count(&self, manga_id: u64) -> Result<usize, CatalogError> {
        Ok(self.store.list(&keys::chapters(manga_id))?.len())
    }

    pub fn is_chapter_added(&self, manga_id: u64, path_name: &str) -> Result<bool, CatalogError> {
        Ok(self
            .store
            .get(&keys::chapter(manga_id, path_name))?
            .is_some())
    }

    /// Overwrite an existing chapter record, keeping its stored number.
    ///
    /// Numbers only move through [`renumber_chapters`](Self::renumber_chapters);
    /// the `chapter_number` carried by `chapter` is ignored.
    pub fn update_chapter(&self, manga_id: u64, chapter: &Chapter) -> Result<(), CatalogError> {
        self.modify_chapter(manga_id, &chapter.path_name, |current| {
            *current = chapter.clone();
        })?;
        Ok(())
    }

    /// Read-modify-write a chapter record, retrying if it changed underneath.
    ///
    /// The write is conditioned on the versionstamp that was read, so a
    /// concurrent renumber is never overwritten. The pathName and chapter
    /// number are restored after `modify` runs.
    pub fn modify_chapter<F>(
        &self,
        manga_id: u64,
        path_name: &str,
        mut modify: F,
    ) -> Result<Chapter, CatalogError>
    where
        F: FnMut(&mut Chapter),
    {
        let key = keys::chapter(manga_id, path_name);
        self.retry
            .run_blocking(
                |_| -> Result<Chapter, CatalogError> {
                    let entry = self.store.get(&key)?.ok_or_else(|| {
                        CatalogError::NotFound(format!(
                            "chapter {} of manga {}",
                            path_name, manga_id
                        ))
                    })?;
                    let current: Chapter = entry.decode()?;

                    let mut updated = current.clone();
                    modify(&mut updated);
                    updated.path_name = current.path_name.clone();
                    updated.chapter_number = current.chapter_number;
                    if updated == current {
                        return Ok(current);
                    }

                    let write = AtomicWrite::new()
                        .check(key.clone(), Some(entry.versionstamp))
                        .set(key.clone(), &updated)?;
                    self.store.commit(write)?;
                    Ok(updated)
                },
                Self::is_conflict,
            )
            .map_err(RetryError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ChapterDraft, MangaStatus};
    use crate::testing::HookedKv;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn create_test_catalog() -> Catalog {
        Catalog::in_memory().unwrap()
    }

    fn chapter(path_name: &str, number: u32) -> Chapter {
        ChapterDraft::new(path_name, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
            .finalize(number)
            .unwrap()
    }

    /// Store whose commits always fail with the given error.
    struct FailingKv {
        inner: SqliteKv,
        error: fn() -> StoreError,
        commits: AtomicU32,
    }

    impl FailingKv {
        fn new(error: fn() -> StoreError) -> Self {
            Self {
                inner: SqliteKv::in_memory().unwrap(),
                error,
                commits: AtomicU32::new(0),
            }
        }
    }

    impl KvStore for FailingKv {
        fn get(&self, key: &Key) -> Result<Option<KvEntry>, StoreError> {
            self.inner.get(key)
        }

        fn list(&self, prefix: &Key) -> Result<Vec<KvEntry>, StoreError> {
            self.inner.list(prefix)
        }

        fn commit(&self, _write: AtomicWrite) -> Result<Versionstamp, StoreError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            Err((self.error)())
        }
    }

    #[test]
    fn test_add_source_is_idempotent() {
        let catalog = create_test_catalog();
        assert!(catalog.add_source("SourceA").unwrap());
        assert!(!catalog.add_source("SourceA").unwrap());
        catalog.add_source("Alpha").unwrap();
        assert_eq!(catalog.sources().unwrap(), vec!["Alpha", "SourceA"]);
    }

    #[test]
    fn test_allocate_assigns_sequential_ids_from_one() {
        let catalog = create_test_catalog();
        let a = catalog.allocate_manga(&MangaDraft::new("MangaA", "S")).unwrap();
        let b = catalog.allocate_manga(&MangaDraft::new("MangaB", "S")).unwrap();
        assert_eq!((a, b), (1, 2));

        let manga = catalog.manga(2).unwrap().unwrap();
        assert_eq!(manga.path_name, "MangaB");
        assert_eq!(manga.status, MangaStatus::Unknown);
    }

    #[test]
    fn test_allocate_writes_indexes() {
        let catalog = create_test_catalog();
        let id = catalog
            .allocate_manga(&MangaDraft::new("MangaX", "SourceA"))
            .unwrap();

        assert_eq!(catalog.manga_id_for_path("MangaX").unwrap(), Some(id));
        assert!(catalog.is_manga_added("MangaX").unwrap());
        assert_eq!(catalog.sources().unwrap(), vec!["SourceA"]);
        let in_source = catalog.mangas_in_source("SourceA").unwrap();
        assert_eq!(in_source.len(), 1);
        assert_eq!(in_source[0].id, id);

        assert_eq!(catalog.categories().unwrap(), vec![DEFAULT_CATEGORY]);
        assert_eq!(catalog.categories_of_manga(id).unwrap(), vec![DEFAULT_CATEGORY]);
        let members = catalog.mangas_in_category(DEFAULT_CATEGORY).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, id);
    }

    #[test]
    fn test_allocate_same_path_returns_existing_id() {
        let catalog = create_test_catalog();
        let first = catalog.allocate_manga(&MangaDraft::new("MangaX", "S")).unwrap();
        let second = catalog.allocate_manga(&MangaDraft::new("MangaX", "S")).unwrap();
        assert_eq!(first, second);
        assert_eq!(catalog.all_mangas().unwrap().len(), 1);

        let next = catalog.allocate_manga(&MangaDraft::new("MangaY", "S")).unwrap();
        assert_eq!(next, 2);
    }

    #[test]
    fn test_allocate_gives_up_after_bounded_conflicts() {
        let kv = Arc::new(FailingKv::new(|| StoreError::PreconditionFailed));
        let catalog = Catalog::new(kv.clone()).with_retry_policy(RetryPolicy::immediate(20));

        let result = catalog.allocate_manga(&MangaDraft::new("MangaX", "S"));
        match result {
            Err(CatalogError::IdAllocationExhausted {
                path_name,
                attempts,
            }) => {
                assert_eq!(path_name, "MangaX");
                assert_eq!(attempts, 20);
            }
            other => panic!("expected IdAllocationExhausted, got {:?}", other),
        }
        assert_eq!(kv.commits.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn test_allocate_does_not_retry_unavailable_store() {
        let kv = Arc::new(FailingKv::new(|| {
            StoreError::Unavailable("disk gone".to_string())
        }));
        let catalog = Catalog::new(kv.clone());

        let result = catalog.allocate_manga(&MangaDraft::new("MangaX", "S"));
        assert!(matches!(
            result,
            Err(CatalogError::Store(StoreError::Unavailable(_)))
        ));
        assert_eq!(kv.commits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_allocation_yields_distinct_sequential_ids() {
        let catalog = Arc::new(create_test_catalog());
        let handles: Vec<_> = (0..10)
            .map(|i| {
                let catalog = Arc::clone(&catalog);
                std::thread::spawn(move || {
                    catalog
                        .allocate_manga(&MangaDraft::new(format!("Manga{}", i), "S"))
                        .unwrap()
                })
            })
            .collect();

        let mut ids: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=10).collect::<Vec<u64>>());

        for i in 0..10 {
            let path = format!("Manga{}", i);
            let manga = catalog.manga_by_path(&path).unwrap().unwrap();
            assert_eq!(manga.path_name, path);
        }
    }

    #[test]
    fn test_add_manga_to_category() {
        let catalog = create_test_catalog();
        let id = catalog.allocate_manga(&MangaDraft::new("MangaX", "S")).unwrap();

        catalog.add_manga_to_category(id, DEFAULT_CATEGORY).unwrap();
        catalog.add_manga_to_category(id, DEFAULT_CATEGORY).unwrap();
        catalog.add_manga_to_category(id, "Favorites").unwrap();

        assert_eq!(catalog.categories().unwrap(), vec!["Default", "Favorites"]);
        assert_eq!(
            catalog.categories_of_manga(id).unwrap(),
            vec!["Default", "Favorites"]
        );
        let members = catalog.mangas_in_category(DEFAULT_CATEGORY).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, id);
    }

    #[test]
    fn test_add_unknown_manga_to_category_is_not_found() {
        let catalog = create_test_catalog();
        assert!(matches!(
            catalog.add_manga_to_category(42, DEFAULT_CATEGORY),
            Err(CatalogError::NotFound(_))
        ));
        assert!(catalog.categories().unwrap().is_empty());
    }

    #[test]
    fn test_update_manga() {
        let catalog = create_test_catalog();
        let id = catalog.allocate_manga(&MangaDraft::new("MangaX", "S")).unwrap();

        let mut manga = catalog.manga(id).unwrap().unwrap();
        manga.title = Some("Manga X".to_string());
        manga.status = MangaStatus::Completed;
        catalog.update_manga(&manga).unwrap();
        assert_eq!(catalog.manga(id).unwrap().unwrap(), manga);

        manga.path_name = "Elsewhere".to_string();
        assert!(matches!(
            catalog.update_manga(&manga),
            Err(CatalogError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_update_missing_manga_is_not_found() {
        let catalog = create_test_catalog();
        let manga = MangaDraft::new("Ghost", "S").finalize(9).unwrap();
        assert!(matches!(
            catalog.update_manga(&manga),
            Err(CatalogError::NotFound(_))
        ));
    }

    #[test]
    fn test_set_cover_and_modify_keep_identity() {
        let catalog = create_test_catalog();
        let id = catalog.allocate_manga(&MangaDraft::new("MangaX", "S")).unwrap();

        catalog.set_cover(id, "cover.png").unwrap();
        let manga = catalog
            .modify_manga(id, |m| {
                m.path_name = "hijacked".to_string();
                m.author = Some("Someone".to_string());
            })
            .unwrap();
        assert_eq!(manga.path_name, "MangaX");
        assert_eq!(manga.cover.as_deref(), Some("cover.png"));
        assert_eq!(manga.author.as_deref(), Some("Someone"));
    }

    #[test]
    fn test_insert_chapter_if_absent() {
        let catalog = create_test_catalog();
        let id = catalog.allocate_manga(&MangaDraft::new("MangaX", "S")).unwrap();

        assert!(catalog.insert_chapter(id, &chapter("Chapter 1", 1), false).unwrap());
        let mut changed = chapter("Chapter 1", 1);
        changed.page_count = 40;
        assert!(!catalog.insert_chapter(id, &changed, false).unwrap());
        assert_eq!(catalog.chapter(id, "Chapter 1").unwrap().unwrap().page_count, 1);

        assert!(catalog.insert_chapter(id, &changed, true).unwrap());
        assert_eq!(catalog.chapter(id, "Chapter 1").unwrap().unwrap().page_count, 40);
    }

    #[test]
    fn test_insert_chapter_for_unknown_manga_is_not_found() {
        let catalog = create_test_catalog();
        assert!(matches!(
            catalog.insert_chapter(3, &chapter("Chapter 1", 1), false),
            Err(CatalogError::NotFound(_))
        ));
    }

    #[test]
    fn test_insert_chapter_rejects_taken_number() {
        let catalog = create_test_catalog();
        let id = catalog.allocate_manga(&MangaDraft::new("MangaX", "S")).unwrap();
        catalog.insert_chapter(id, &chapter("Chapter 1", 1), false).unwrap();

        assert!(matches!(
            catalog.insert_chapter(id, &chapter("Chapter 0", 1), false),
            Err(CatalogError::InvalidRecord(_))
        ));
        assert_eq!(catalog.chapter_count(id).unwrap(), 1);
    }

    #[test]
    fn test_chapter_number_index_resolves_both_ways() {
        let catalog = create_test_catalog();
        let id = catalog.allocate_manga(&MangaDraft::new("MangaX", "S")).unwrap();
        catalog.insert_chapter(id, &chapter("Chapter 10", 2), false).unwrap();
        catalog.insert_chapter(id, &chapter("Chapter 9", 1), false).unwrap();

        assert_eq!(
            catalog.chapter_path_for_number(id, 2).unwrap().as_deref(),
            Some("Chapter 10")
        );
        assert_eq!(
            catalog.chapter_by_number(id, 1).unwrap().unwrap().path_name,
            "Chapter 9"
        );
        assert!(catalog.chapter_by_number(id, 3).unwrap().is_none());

        let stored: Vec<String> = catalog
            .manga_chapters(id)
            .unwrap()
            .into_iter()
            .map(|c| c.path_name)
            .collect();
        assert_eq!(stored, vec!["Chapter 10", "Chapter 9"]);

        let sorted: Vec<u32> = catalog
            .manga_chapters_sorted(id)
            .unwrap()
            .into_iter()
            .map(|c| c.chapter_number)
            .collect();
        assert_eq!(sorted, vec![1, 2]);
    }

    #[test]
    fn test_renumber_chapters_shifts_numbers() {
        let catalog = create_test_catalog();
        let id = catalog.allocate_manga(&MangaDraft::new("MangaX", "S")).unwrap();
        catalog.insert_chapter(id, &chapter("Chapter 2", 1), false).unwrap();
        catalog.insert_chapter(id, &chapter("Chapter 3", 2), false).unwrap();

        // "Chapter 1" arrives later; the existing chapters move up by one.
        let moved = catalog
            .renumber_chapters(
                id,
                &[("Chapter 2".to_string(), 2), ("Chapter 3".to_string(), 3)],
            )
            .unwrap();
        assert_eq!(moved, 2);
        catalog.insert_chapter(id, &chapter("Chapter 1", 1), false).unwrap();

        for (number, path) in [(1, "Chapter 1"), (2, "Chapter 2"), (3, "Chapter 3")] {
            assert_eq!(
                catalog.chapter_path_for_number(id, number).unwrap().as_deref(),
                Some(path)
            );
            assert_eq!(
                catalog.chapter(id, path).unwrap().unwrap().chapter_number,
                number
            );
        }
    }

    #[test]
    fn test_renumber_rejects_collision_with_fixed_chapter() {
        let catalog = create_test_catalog();
        let id = catalog.allocate_manga(&MangaDraft::new("MangaX", "S")).unwrap();
        catalog.insert_chapter(id, &chapter("A", 1), false).unwrap();
        catalog.insert_chapter(id, &chapter("B", 2), false).unwrap();

        assert!(matches!(
            catalog.renumber_chapter(id, "A", 2),
            Err(CatalogError::InvalidRecord(_))
        ));
        assert!(!catalog.renumber_chapter(id, "A", 1).unwrap());
        assert!(catalog.renumber_chapter(id, "A", 3).unwrap());
        assert!(catalog.chapter_path_for_number(id, 1).unwrap().is_none());
    }

    #[test]
    fn test_update_chapter_keeps_number() {
        let catalog = create_test_catalog();
        let id = catalog.allocate_manga(&MangaDraft::new("MangaX", "S")).unwrap();
        catalog.insert_chapter(id, &chapter("Chapter 1", 1), false).unwrap();

        let mut updated = catalog.chapter(id, "Chapter 1").unwrap().unwrap();
        updated.title = Some("Chapter 1: Start".to_string());
        updated.scanlator = Some("Group".to_string());
        catalog.update_chapter(id, &updated).unwrap();
        assert_eq!(catalog.chapter(id, "Chapter 1").unwrap().unwrap(), updated);

        updated.chapter_number = 5;
        catalog.update_chapter(id, &updated).unwrap();
        assert_eq!(catalog.chapter(id, "Chapter 1").unwrap().unwrap().chapter_number, 1);
        assert!(catalog.chapter_by_number(id, 5).unwrap().is_none());
        assert!(matches!(
            catalog.update_chapter(id, &chapter("Missing", 2)),
            Err(CatalogError::NotFound(_))
        ));
    }

    #[test]
    fn test_update_chapter_does_not_undo_concurrent_renumber() {
        let store = Arc::new(HookedKv::new().unwrap());
        let catalog = Catalog::new(store.clone());
        let id = catalog.allocate_manga(&MangaDraft::new("MangaX", "S")).unwrap();
        catalog.insert_chapter(id, &chapter("Chapter 2", 1), false).unwrap();

        let mut updated = catalog.chapter(id, "Chapter 2").unwrap().unwrap();
        updated.title = Some("Chapter 2: Middle".to_string());

        // A rescan moves the chapter right after the update read it.
        store.after_get(
            keys::chapter(id, "Chapter 2"),
            Box::new(move |inner| {
                Catalog::new(inner)
                    .renumber_chapter(id, "Chapter 2", 2)
                    .unwrap();
            }),
        );
        catalog.update_chapter(id, &updated).unwrap();

        let stored = catalog.chapter(id, "Chapter 2").unwrap().unwrap();
        assert_eq!(stored.chapter_number, 2);
        assert_eq!(stored.title.as_deref(), Some("Chapter 2: Middle"));
        assert_eq!(
            catalog.chapter_path_for_number(id, 2).unwrap().as_deref(),
            Some("Chapter 2")
        );
        assert!(catalog.chapter_path_for_number(id, 1).unwrap().is_none());
    }

    #[test]
    fn test_modify_chapter_keeps_identity() {
        let catalog = create_test_catalog();
        let id = catalog.allocate_manga(&MangaDraft::new("MangaX", "S")).unwrap();
        catalog.insert_chapter(id, &chapter("Chapter 1", 1), false).unwrap();

        let modified = catalog
            .modify_chapter(id, "Chapter 1", |c| {
                c.path_name = "Other".to_string();
                c.chapter_number = 9;
                c.page_count = 20;
            })
            .unwrap();
        assert_eq!(modified.path_name, "Chapter 1");
        assert_eq!(modified.chapter_number, 1);
        assert_eq!(catalog.chapter(id, "Chapter 1").unwrap().unwrap().page_count, 20);

        assert!(matches!(
            catalog.modify_chapter(id, "Missing", |_| {}),
            Err(CatalogError::NotFound(_))
        ));
    }
}
