//! pulse-reports - Report cache & orchestration microservice
//!
//! Startup order:
//! 1. Parse CLI, load TOML bootstrap config (missing file → defaults)
//! 2. Initialize tracing (RUST_LOG overrides the configured level)
//! 3. Resolve storage root, create `reports/` and `scraped-data/`
//! 4. Build producers and orchestrator, serve HTTP until Ctrl+C / SIGTERM

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pulse_common::config::{default_config_path, resolve_root_folder, TomlConfig, ROOT_FOLDER_ENV};
use pulse_reports::producer::ProducerSet;
use pulse_reports::{build_router, cors_layer, AppState, ArtifactStore, CacheOrchestrator, FsArtifactStore};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for pulse-reports
#[derive(Parser, Debug)]
#[command(name = "pulse-reports")]
#[command(about = "Report cache & orchestration service")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "PULSE_CONFIG")]
    config: Option<PathBuf>,

    /// Storage root (overrides PULSE_ROOT_FOLDER and the config file)
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "PULSE_PORT")]
    port: Option<u16>,

    /// Interface to bind to
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let config_found = config_path.exists();
    let config = TomlConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},tower_http=info", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting pulse-reports v{}", env!("CARGO_PKG_VERSION"));
    if config_found {
        info!("Configuration: {}", config_path.display());
    } else {
        warn!(
            "Config file {} not found, using built-in defaults",
            config_path.display()
        );
    }

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV, &config);
    info!("Storage root: {}", root_folder.display());

    let fs_store = FsArtifactStore::new(root_folder);
    fs_store
        .ensure_layout()
        .await
        .context("Failed to initialize storage root")?;
    let store: Arc<dyn ArtifactStore> = Arc::new(fs_store);

    let producers =
        ProducerSet::from_config(&config.producers).context("Failed to configure producers")?;
    let timeout = Duration::from_secs(config.production_timeout_secs);
    info!("Production timeout: {:?}", timeout);

    let orchestrator = Arc::new(CacheOrchestrator::new(store, producers).with_production_timeout(timeout));
    let state = AppState::new(orchestrator, config.comparison_baseline.clone());

    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(&config.allowed_origins)),
    );

    let bind = args.bind.unwrap_or(config.bind);
    let port = args.port.unwrap_or(config.port);
    let addr = format!("{}:{}", bind, port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
