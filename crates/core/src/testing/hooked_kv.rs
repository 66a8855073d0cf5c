//! Key-value store wrapper that injects failures and interleaved writes.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::store::{
    AtomicWrite, Key, KvEntry, KvStore, Mutation, SqliteKv, StoreError, Versionstamp,
};

/// One-shot callback run against the wrapped store.
pub type StoreHook = Box<dyn FnOnce(Arc<dyn KvStore>) + Send>;

/// In-memory store that lets a test step in between catalog operations.
///
/// - `after_list` / `after_get` run a hook once, right after a matching read
///   returned, to simulate a concurrent writer landing in that gap.
/// - `fail_commits_under` makes commits touching a key prefix fail with
///   [`StoreError::Unavailable`].
///
/// # Example
///
/// ```rust,ignore
/// use tankobon_core::{key, testing::HookedKv, Catalog};
///
/// let store = Arc::new(HookedKv::new()?);
/// store.fail_commits_under(key!["chapters"], 1);
/// let catalog = Catalog::new(store.clone());
/// ```
pub struct HookedKv {
    inner: Arc<SqliteKv>,
    after_list: Mutex<Vec<(Key, StoreHook)>>,
    after_get: Mutex<Vec<(Key, StoreHook)>>,
    commit_failures: Mutex<Vec<(Key, u32)>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn take_hook(
    hooks: &Mutex<Vec<(Key, StoreHook)>>,
    matches: impl Fn(&Key) -> bool,
) -> Option<StoreHook> {
    let mut hooks = lock(hooks);
    let index = hooks.iter().position(|(key, _)| matches(key))?;
    Some(hooks.remove(index).1)
}

impl HookedKv {
    pub fn new() -> Result<Self, StoreError> {
        Ok(Self {
            inner: Arc::new(SqliteKv::in_memory()?),
            after_list: Mutex::new(Vec::new()),
            after_get: Mutex::new(Vec::new()),
            commit_failures: Mutex::new(Vec::new()),
        })
    }

    /// The wrapped store, bypassing every injection.
    pub fn inner(&self) -> Arc<dyn KvStore> {
        self.inner.clone()
    }

    /// Run `hook` once after the first `list` whose prefix starts with `prefix`.
    pub fn after_list(&self, prefix: Key, hook: StoreHook) {
        lock(&self.after_list).push((prefix, hook));
    }

    /// Run `hook` once after the first `get` of exactly `key`.
    pub fn after_get(&self, key: Key, hook: StoreHook) {
        lock(&self.after_get).push((key, hook));
    }

    /// Fail the next `count` commits that mutate a key under `prefix`.
    pub fn fail_commits_under(&self, prefix: Key, count: u32) {
        lock(&self.commit_failures).push((prefix, count));
    }

    fn take_commit_failure(&self, write: &AtomicWrite) -> bool {
        let mut failures = lock(&self.commit_failures);
        for (prefix, remaining) in failures.iter_mut() {
            let touches = write
                .mutations()
                .iter()
                .any(|m| mutation_key(m).starts_with(prefix));
            if *remaining > 0 && touches {
                *remaining -= 1;
                return true;
            }
        }
        false
    }
}

fn mutation_key(mutation: &Mutation) -> &Key {
    match mutation {
        Mutation::Set(key, _) | Mutation::Sum(key, _) | Mutation::Delete(key) => key,
    }
}

impl KvStore for HookedKv {
    fn get(&self, key: &Key) -> Result<Option<KvEntry>, StoreError> {
        let entry = self.inner.get(key)?;
        if let Some(hook) = take_hook(&self.after_get, |k| k == key) {
            hook(self.inner());
        }
        Ok(entry)
    }

    fn list(&self, prefix: &Key) -> Result<Vec<KvEntry>, StoreError> {
        let entries = self.inner.list(prefix)?;
        if let Some(hook) = take_hook(&self.after_list, |p| prefix.starts_with(p)) {
            hook(self.inner());
        }
        Ok(entries)
    }

    fn commit(&self, write: AtomicWrite) -> Result<Versionstamp, StoreError> {
        if self.take_commit_failure(&write) {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        self.inner.commit(write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_commit_failures_are_scoped_and_counted() {
        let store = HookedKv::new().unwrap();
        store.fail_commits_under(key!["chapters"], 1);

        assert!(store.set(key!["mangas", 1u64], serde_json::json!(1)).is_ok());
        assert!(matches!(
            store.set(key!["chapters", 1u64, "a"], serde_json::json!(1)),
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.set(key!["chapters", 1u64, "a"], serde_json::json!(1)).is_ok());
    }

    #[test]
    fn test_list_hook_runs_once_after_read() {
        let store = HookedKv::new().unwrap();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        store.after_list(
            key!["chapters"],
            Box::new(move |inner| {
                inner
                    .set(key!["chapters", 1u64, "late"], serde_json::json!(1))
                    .unwrap();
                flag.store(true, Ordering::SeqCst);
            }),
        );

        assert!(store.list(&key!["mangas"]).unwrap().is_empty());
        assert!(!ran.load(Ordering::SeqCst));

        // The read that triggers the hook does not see the hook's write.
        assert!(store.list(&key!["chapters", 1u64]).unwrap().is_empty());
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(store.list(&key!["chapters", 1u64]).unwrap().len(), 1);
    }
}
