use std::path::Path;
use std::sync::Arc;

use tankobon_core::{Catalog, Config, LibraryScanner, Reconciler, ScanScheduler};

/// Shared application state
pub struct AppState {
    config: Config,
    catalog: Arc<Catalog>,
    scanner: Arc<LibraryScanner>,
    reconciler: Option<Arc<Reconciler>>,
    scheduler: Option<Arc<ScanScheduler>>,
}

impl AppState {
    pub fn new(
        config: Config,
        catalog: Arc<Catalog>,
        scanner: Arc<LibraryScanner>,
        scheduler: Option<Arc<ScanScheduler>>,
    ) -> Self {
        let reconciler = scanner.reconciler().cloned();
        Self {
            config,
            catalog,
            scanner,
            reconciler,
            scheduler,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn scanner(&self) -> &Arc<LibraryScanner> {
        &self.scanner
    }

    pub fn reconciler(&self) -> Option<&Arc<Reconciler>> {
        self.reconciler.as_ref()
    }

    pub fn scheduler(&self) -> Option<&Arc<ScanScheduler>> {
        self.scheduler.as_ref()
    }

    pub fn library_root(&self) -> &Path {
        self.scanner.root()
    }
}
