//! nemu-server - REST API server binary.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use nemu_core::config::KnowledgeConfig;
use nemu_core::{KnowledgeEngine, NemuConfig, NemuError, SqliteInteractionStats, SqliteKnowledgeStorage};
use nemu_server::{create_server, AppState};
use tokio::signal;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
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

/// Open the knowledge storage, retrying while it is not ready, then attach it.
async fn connect_storage(engine: Arc<KnowledgeEngine>, config: KnowledgeConfig) {
    let open_once = || {
        let config = config.clone();
        async move {
            tokio::task::spawn_blocking(move || SqliteKnowledgeStorage::from_config(&config))
                .await
                .map_err(|e| NemuError::Internal(format!("storage task failed: {}", e)))?
        }
    };

    let storage = open_once
        .retry(
            ExponentialBuilder::default()
                .with_max_times(10)
                .with_min_delay(Duration::from_millis(500))
                .with_max_delay(Duration::from_secs(30)),
        )
        .when(|e| e.is_storage() || matches!(e, NemuError::Io(_)))
        .notify(|err, dur| {
            warn!(error = %err, retry_in = ?dur, "Knowledge storage not ready");
        })
        .await;

    match storage {
        Ok(storage) => engine.attach_storage(Arc::new(storage)).await,
        Err(e) => error!(error = %e, "Giving up on knowledge storage; answers will ask to be taught"),
    }
}

fn load_config() -> Result<NemuConfig, NemuError> {
    match std::env::var("NEMU_CONFIG") {
        Ok(path) => {
            info!(path = %path, "Loading configuration file");
            NemuConfig::from_file(path)
        }
        Err(_) => {
            let config = NemuConfig::from_env();
            config.validate()?;
            Ok(config)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
                .add_directive("nemu_server=debug".parse()?),
        )
        .init();

    let host = std::env::var("NEMU_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("NEMU_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .map_err(|e| format!("NEMU_PORT must be a valid port number: {}", e))?;

    let config = load_config()?;
    info!(sharing = ?config.knowledge.sharing, db_path = %config.knowledge.db_path.display(), "Configuration loaded");

    // Statistics share the knowledge database file but are optional.
    let stats = match SqliteInteractionStats::open(&config.knowledge.db_path) {
        Ok(stats) => Some(Arc::new(stats)),
        Err(e) => {
            warn!(error = %e, "Interaction statistics disabled");
            None
        }
    };

    let mut engine = KnowledgeEngine::new(&config, None)?;
    if let Some(stats) = &stats {
        engine = engine.with_stats(stats.clone());
    }
    let engine = Arc::new(engine);

    tokio::spawn(connect_storage(engine.clone(), config.knowledge.clone()));

    let mut state = AppState::new(engine);
    if let Some(stats) = stats {
        state = state.with_stats(stats);
    }
    let app = create_server(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting nemu-server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            info!("Shutdown signal received");
        })
        .await?;

    info!("Server stopped cleanly");
    Ok(())
}
