use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tankobon_core::{
    config_path_from_env, load_config, validate_config, Catalog, LibraryScanner, MetadataProvider,
    Reconciler, ScanScheduler, SqliteKv, TachideskClient, DEFAULT_CATEGORY,
};
use tankobon_server::api::create_router;
use tankobon_server::state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = config_path_from_env();

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);
    info!("Library root: {:?}", config.library.root);

    // Open the catalog
    let store = SqliteKv::new(&config.database.path).context("Failed to open catalog store")?;
    let catalog = Arc::new(Catalog::new(Arc::new(store)));
    catalog
        .add_category(DEFAULT_CATEGORY)
        .context("Failed to create default category")?;
    info!("Catalog initialized");

    // Create the scanner, with a reconciler if a provider is configured
    let mut scanner = LibraryScanner::new(
        &config.library.root,
        Arc::clone(&catalog),
        config.library.scan_options(),
    );
    match &config.provider {
        Some(provider_config) => {
            info!("Initializing Tachidesk provider at {}", provider_config.url);
            let client = TachideskClient::new(provider_config)
                .context("Failed to create Tachidesk client")?;
            let provider: Arc<dyn MetadataProvider> = Arc::new(client);
            let reconciler = Reconciler::new(
                Arc::clone(&catalog),
                provider,
                &config.library.root,
            )
            .with_retry_policy(provider_config.retry_policy());
            scanner = scanner.with_reconciler(Arc::new(reconciler));
        }
        None => {
            warn!("No metadata provider configured, reconciliation disabled");
        }
    }
    let scanner = Arc::new(scanner);

    // Start periodic scans
    let scheduler = Arc::new(ScanScheduler::new(
        Arc::clone(&scanner),
        config.library.scan_interval(),
        config.library.scan_on_startup,
    ));
    scheduler.start();

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        catalog,
        scanner,
        Some(Arc::clone(&scheduler)),
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    scheduler.stop();

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
