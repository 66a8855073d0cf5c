pub mod catalog;
pub mod config;
pub mod library;
pub mod media;
pub mod metrics;
pub mod reconcile;
pub mod retry;
pub mod store;
pub mod testing;

pub use catalog::{
    Catalog, CatalogError, Chapter, ChapterDraft, Manga, MangaDraft, MangaStatus, DEFAULT_CATEGORY,
};
pub use config::{
    config_path_from_env, load_config, load_config_from_str, validate_config, Config, ConfigError,
    DatabaseConfig, LibraryConfig, ServerConfig,
};
pub use library::{
    LibraryScanner, ReconciliationTally, ScanError, ScanFailure, ScanOptions, ScanReport,
    ScanScheduler, ScanState, SchedulerStatus,
};
pub use reconcile::{
    MetadataProvider, ProviderError, ReconcileError, ReconcileOutcome, Reconciler,
    TachideskClient, TachideskConfig,
};
pub use retry::{RetryError, RetryPolicy};
pub use store::{KvStore, SqliteKv, StoreError};
