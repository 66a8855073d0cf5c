//! Transactional key-value store underneath the catalog.
//!
//! Every stored row carries a versionstamp assigned at commit time. Callers
//! build an [`AtomicWrite`] out of checks ("this key still has versionstamp
//! V" / "this key is absent") and mutations; the whole batch commits in one
//! transaction or not at all.

mod key;
mod sqlite;

pub use key::{Key, KeyPart};
pub use sqlite::SqliteKv;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Commit sequence number of the write that last touched a row.
pub type Versionstamp = i64;

/// Errors for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing database could not be reached or failed mid-operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// An atomic write's check did not hold; nothing was written.
    #[error("Precondition failed")]
    PreconditionFailed,

    /// A value could not be (de)serialized.
    #[error("Codec error: {0}")]
    Codec(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Codec(e.to_string())
    }
}

/// A stored row.
#[derive(Debug, Clone, PartialEq)]
pub struct KvEntry {
    pub key: Key,
    pub value: Value,
    pub versionstamp: Versionstamp,
}

impl KvEntry {
    /// Deserialize the stored value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(self.value.clone())?)
    }
}

/// Condition attached to an atomic write.
#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    pub key: Key,
    /// `None` requires the key to be absent.
    pub versionstamp: Option<Versionstamp>,
}

/// A single write inside an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Set(Key, Value),
    /// Add to an unsigned integer value (absent counts as 0).
    Sum(Key, u64),
    Delete(Key),
}

/// A batch of checks and mutations committed together.
#[derive(Debug, Clone, Default)]
pub struct AtomicWrite {
    checks: Vec<Check>,
    mutations: Vec<Mutation>,
}

impl AtomicWrite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` to still carry `versionstamp` (or be absent for `None`).
    pub fn check(mut self, key: Key, versionstamp: Option<Versionstamp>) -> Self {
        self.checks.push(Check { key, versionstamp });
        self
    }

    pub fn set<T: Serialize + ?Sized>(mut self, key: Key, value: &T) -> Result<Self, StoreError> {
        self.mutations
            .push(Mutation::Set(key, serde_json::to_value(value)?));
        Ok(self)
    }

    pub fn sum(mut self, key: Key, delta: u64) -> Self {
        self.mutations.push(Mutation::Sum(key, delta));
        self
    }

    pub fn delete(mut self, key: Key) -> Self {
        self.mutations.push(Mutation::Delete(key));
        self
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }
}

/// Trait for the raw transactional key-value layer.
pub trait KvStore: Send + Sync {
    /// Get a single row.
    fn get(&self, key: &Key) -> Result<Option<KvEntry>, StoreError>;

    /// All rows whose key starts with `prefix`, in key order.
    fn list(&self, prefix: &Key) -> Result<Vec<KvEntry>, StoreError>;

    /// Commit an atomic batch, returning the new versionstamp.
    ///
    /// Returns [`StoreError::PreconditionFailed`] when any check fails, in
    /// which case no mutation was applied.
    fn commit(&self, write: AtomicWrite) -> Result<Versionstamp, StoreError>;

    /// Unconditional single-key write.
    fn set(&self, key: Key, value: Value) -> Result<Versionstamp, StoreError> {
        self.commit(AtomicWrite {
            checks: Vec::new(),
            mutations: vec![Mutation::Set(key, value)],
        })
    }
}
