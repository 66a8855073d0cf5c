//! SQLite-backed key-value store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde_json::Value;

use super::key::prefix_upper_bound;
use super::{AtomicWrite, Key, KvEntry, KvStore, Mutation, StoreError, Versionstamp};

/// SQLite-backed key-value store.
pub struct SqliteKv {
    conn: Mutex<Connection>,
}

impl SqliteKv {
    /// Open (or create) the store at `path`.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            -- One row per key; keys are order-preserving encoded tuples
            CREATE TABLE IF NOT EXISTS kv (
                key BLOB PRIMARY KEY,
                value TEXT NOT NULL,
                versionstamp INTEGER NOT NULL
            );

            -- Commit sequence used to stamp rows
            CREATE TABLE IF NOT EXISTS kv_sequence (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                value INTEGER NOT NULL
            );

            INSERT OR IGNORE INTO kv_sequence (id, value) VALUES (1, 0);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("store connection lock poisoned".to_string()))
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<(Vec<u8>, String, i64)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    }

    fn to_entry(raw: (Vec<u8>, String, i64)) -> Result<KvEntry, StoreError> {
        let (key_bytes, value, versionstamp) = raw;
        let key = Key::decode(&key_bytes)
            .ok_or_else(|| StoreError::Codec("undecodable key in store".to_string()))?;
        Ok(KvEntry {
            key,
            value: serde_json::from_str(&value)?,
            versionstamp,
        })
    }

    fn current_versionstamp(
        tx: &rusqlite::Transaction,
        key: &[u8],
    ) -> Result<Option<Versionstamp>, StoreError> {
        Ok(tx
            .query_row(
                "SELECT versionstamp FROM kv WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn upsert(
        tx: &rusqlite::Transaction,
        key: &[u8],
        value: &Value,
        versionstamp: Versionstamp,
    ) -> Result<(), StoreError> {
        tx.execute(
            "INSERT INTO kv (key, value, versionstamp) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                versionstamp = excluded.versionstamp",
            params![key, serde_json::to_string(value)?, versionstamp],
        )?;
        Ok(())
    }
}

impl KvStore for SqliteKv {
    fn get(&self, key: &Key) -> Result<Option<KvEntry>, StoreError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT key, value, versionstamp FROM kv WHERE key = ?",
                params![key.encode()],
                Self::row_to_entry,
            )
            .optional()?;
        raw.map(Self::to_entry).transpose()
    }

    fn list(&self, prefix: &Key) -> Result<Vec<KvEntry>, StoreError> {
        let conn = self.lock()?;
        let lower = prefix.encode();

        let raw_rows = match prefix_upper_bound(&lower) {
            Some(upper) => {
                let mut stmt = conn.prepare(
                    "SELECT key, value, versionstamp FROM kv
                     WHERE key >= ?1 AND key < ?2 ORDER BY key",
                )?;
                let rows = stmt.query_map(params![lower, upper], Self::row_to_entry)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT key, value, versionstamp FROM kv WHERE key >= ?1 ORDER BY key",
                )?;
                let rows = stmt.query_map(params![lower], Self::row_to_entry)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };

        raw_rows.into_iter().map(Self::to_entry).collect()
    }

    fn commit(&self, write: AtomicWrite) -> Result<Versionstamp, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        for check in write.checks() {
            let current = Self::current_versionstamp(&tx, &check.key.encode())?;
            if current != check.versionstamp {
                // Dropping the transaction rolls it back.
                return Err(StoreError::PreconditionFailed);
            }
        }

        let versionstamp: Versionstamp = tx.query_row(
            "UPDATE kv_sequence SET value = value + 1 WHERE id = 1 RETURNING value",
            [],
            |row| row.get(0),
        )?;

        for mutation in write.mutations() {
            match mutation {
                Mutation::Set(key, value) => {
                    Self::upsert(&tx, &key.encode(), value, versionstamp)?;
                }
                Mutation::Sum(key, delta) => {
                    let encoded = key.encode();
                    let current: Option<String> = tx
                        .query_row(
                            "SELECT value FROM kv WHERE key = ?",
                            params![encoded],
                            |row| row.get(0),
                        )
                        .optional()?;
                    let base = match current {
                        Some(raw) => serde_json::from_str::<u64>(&raw).map_err(|e| {
                            StoreError::Codec(format!("sum on non-integer value at {}: {}", key, e))
                        })?,
                        None => 0,
                    };
                    Self::upsert(
                        &tx,
                        &encoded,
                        &Value::from(base.saturating_add(*delta)),
                        versionstamp,
                    )?;
                }
                Mutation::Delete(key) => {
                    tx.execute("DELETE FROM kv WHERE key = ?", params![key.encode()])?;
                }
            }
        }

        tx.commit()?;
        Ok(versionstamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key;
    use serde_json::json;

    fn create_test_store() -> SqliteKv {
        SqliteKv::in_memory().unwrap()
    }

    #[test]
    fn test_set_and_get() {
        let kv = create_test_store();
        let stamp = kv.set(key!["sources", "Alpha"], json!("Alpha")).unwrap();

        let entry = kv.get(&key!["sources", "Alpha"]).unwrap().unwrap();
        assert_eq!(entry.value, json!("Alpha"));
        assert_eq!(entry.versionstamp, stamp);
        assert_eq!(entry.key, key!["sources", "Alpha"]);
    }

    #[test]
    fn test_get_missing_returns_none() {
        let kv = create_test_store();
        assert!(kv.get(&key!["sources", "Nope"]).unwrap().is_none());
    }

    #[test]
    fn test_versionstamps_increase() {
        let kv = create_test_store();
        let a = kv.set(key!["a"], json!(1)).unwrap();
        let b = kv.set(key!["a"], json!(2)).unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_list_is_prefix_bounded_and_ordered() {
        let kv = create_test_store();
        kv.set(key!["chapter_number", 1i64, 10i64], json!("c10")).unwrap();
        kv.set(key!["chapter_number", 1i64, 2i64], json!("c2")).unwrap();
        kv.set(key!["chapter_number", 1i64, 1i64], json!("c1")).unwrap();
        kv.set(key!["chapter_number", 2i64, 1i64], json!("other")).unwrap();
        kv.set(key!["chapters", 1i64, "x"], json!("unrelated")).unwrap();

        let values: Vec<Value> = kv
            .list(&key!["chapter_number", 1i64])
            .unwrap()
            .into_iter()
            .map(|e| e.value)
            .collect();
        assert_eq!(values, vec![json!("c1"), json!("c2"), json!("c10")]);
    }

    #[test]
    fn test_check_absent_fails_when_present() {
        let kv = create_test_store();
        kv.set(key!["chapters", 1i64, "Chapter 1"], json!({"n": 1}))
            .unwrap();

        let write = AtomicWrite::new()
            .check(key!["chapters", 1i64, "Chapter 1"], None)
            .set(key!["chapters", 1i64, "Chapter 1"], &json!({"n": 2}))
            .unwrap();
        let result = kv.commit(write);
        assert!(matches!(result, Err(StoreError::PreconditionFailed)));

        let entry = kv.get(&key!["chapters", 1i64, "Chapter 1"]).unwrap().unwrap();
        assert_eq!(entry.value, json!({"n": 1}));
    }

    #[test]
    fn test_failed_check_writes_nothing() {
        let kv = create_test_store();
        let stamp = kv.set(key!["counter"], json!(1)).unwrap();
        kv.set(key!["counter"], json!(5)).unwrap();

        let write = AtomicWrite::new()
            .check(key!["counter"], Some(stamp))
            .set(key!["other"], &json!("should not exist"))
            .unwrap()
            .sum(key!["counter"], 1);
        assert!(matches!(
            kv.commit(write),
            Err(StoreError::PreconditionFailed)
        ));

        assert!(kv.get(&key!["other"]).unwrap().is_none());
        assert_eq!(kv.get(&key!["counter"]).unwrap().unwrap().value, json!(5));
    }

    #[test]
    fn test_check_with_current_versionstamp_succeeds() {
        let kv = create_test_store();
        let stamp = kv.set(key!["counter"], json!(1)).unwrap();

        let write = AtomicWrite::new()
            .check(key!["counter"], Some(stamp))
            .sum(key!["counter"], 1);
        kv.commit(write).unwrap();

        assert_eq!(kv.get(&key!["counter"]).unwrap().unwrap().value, json!(2));
    }

    #[test]
    fn test_sum_on_absent_key_starts_at_zero() {
        let kv = create_test_store();
        kv.commit(AtomicWrite::new().sum(key!["n"], 3)).unwrap();
        assert_eq!(kv.get(&key!["n"]).unwrap().unwrap().value, json!(3));
    }

    #[test]
    fn test_sum_on_non_integer_is_codec_error() {
        let kv = create_test_store();
        kv.set(key!["n"], json!("text")).unwrap();
        let result = kv.commit(AtomicWrite::new().sum(key!["n"], 1));
        assert!(matches!(result, Err(StoreError::Codec(_))));
    }

    #[test]
    fn test_delete() {
        let kv = create_test_store();
        kv.set(key!["a"], json!(1)).unwrap();
        kv.commit(AtomicWrite::new().delete(key!["a"])).unwrap();
        assert!(kv.get(&key!["a"]).unwrap().is_none());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("kv.db");
        {
            let kv = SqliteKv::new(&path).unwrap();
            kv.set(key!["sources", "Alpha"], json!("Alpha")).unwrap();
        }
        let kv = SqliteKv::new(&path).unwrap();
        assert!(kv.get(&key!["sources", "Alpha"]).unwrap().is_some());
    }
}
