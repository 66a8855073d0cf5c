//! Manga catalog - typed access to sources, categories, manga and chapters.
//!
//! The catalog keeps its records and derived indexes in a
//! [`KvStore`](crate::store::KvStore). Every write that touches an index goes through
//! an atomic write so that records and indexes never disagree.

mod keys;
mod store;
mod types;

pub use store::{Catalog, DEFAULT_CATEGORY};
pub use types::*;
