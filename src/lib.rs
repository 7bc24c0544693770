// Multi-instance PostgreSQL diagnostics registry
// Bootstraps the metadata store, instance registry, query router, HTTP API and MCP server

pub mod api;
pub mod db;
pub mod manager;
pub mod mcp;
pub mod settings;
pub mod storage;

use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use api::AppState;
use db::{InstanceRegistry, PgClientFactory};
use manager::InstanceManager;
use settings::{AppConfig, AppConfigError};
use storage::{DatabaseManager, StorageError};

pub const DEFAULT_LOG_FILTER: &str = "info,psql_registry=debug";

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] AppConfigError),
    #[error("metadata store error: {0}")]
    Storage(#[from] StorageError),
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Console logging; `RUST_LOG` overrides the default filter
pub fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

/// Wire store, registry and manager together
pub async fn bootstrap(config: &AppConfig) -> Result<Arc<InstanceManager>, StartupError> {
    tracing::info!("[Startup] Metadata store: {}", config.db_path.display());
    let store = Arc::new(DatabaseManager::new(config.db_path.clone())?);

    let instances = store.list_instances()?;
    tracing::info!("[Startup] {} active instances registered", instances.len());

    let factory = Arc::new(PgClientFactory::default());
    let registry = Arc::new(InstanceRegistry::build(&instances, factory).await);

    Ok(Arc::new(InstanceManager::new(store, registry)))
}

/// Entry point for the binary: load config, connect instances, serve HTTP and MCP
pub async fn run() -> Result<(), StartupError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let manager = bootstrap(&config).await?;

    let api_listener = TcpListener::bind(config.listen_addr()).await?;
    let mcp_listener = TcpListener::bind(config.mcp_listen_addr()).await?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    tokio::try_join!(
        api::serve(
            api_listener,
            AppState::new(Arc::clone(&manager)),
            shutdown.clone().cancelled_owned()
        ),
        mcp::serve(mcp_listener, manager, shutdown.clone()),
    )?;

    tracing::info!("[Startup] Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("[Startup] Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("[Startup] Failed to listen for SIGTERM: {}", e);
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

    tracing::info!("[Startup] Shutdown signal received");
}
