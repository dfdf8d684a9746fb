//! scoreshare-ingest - Chunked upload service
//!
//! Receives sheet-music PDFs as sequences of chunks, assembles and validates
//! them, and publishes the result to permanent storage.
//!
//! Default port: 5780

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scoreshare_ingest::config::IngestConfig;
use scoreshare_ingest::services::{StaleSessionSweeper, UploadCoordinator};
use scoreshare_ingest::storage::FilesystemBlobStore;
use scoreshare_ingest::AppState;

/// Command-line arguments for scoreshare-ingest
#[derive(Parser, Debug)]
#[command(name = "scoreshare-ingest")]
#[command(about = "Chunked upload service for ScoreShare")]
#[command(version)]
struct Args {
    /// Root folder holding staging (temp/) and public storage (public/)
    #[arg(short, long, env = "SCORESHARE_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Address to bind
    #[arg(short, long, env = "SCORESHARE_BIND")]
    bind: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "SCORESHARE_PORT")]
    port: Option<u16>,

    /// TOML configuration file
    #[arg(short, long, env = "SCORESHARE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = scoreshare_common::config::load_toml_config(args.config.as_deref())
        .context("Failed to load configuration file")?;

    let config = IngestConfig::resolve(
        &toml_config,
        args.root_folder.as_deref(),
        args.bind.as_deref(),
        args.port,
    );

    // Initialize tracing; RUST_LOG overrides the configured level
    let default_filter = format!("scoreshare_ingest={},tower_http=info", config.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting scoreshare-ingest v{}", env!("CARGO_PKG_VERSION"));
    info!("Root folder: {}", config.root_folder.display());
    info!("Staging: {}", config.upload.staging_dir.display());
    info!("Public storage: {}", config.upload.public_dir.display());

    tokio::fs::create_dir_all(&config.upload.staging_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create staging directory {}",
                config.upload.staging_dir.display()
            )
        })?;
    tokio::fs::create_dir_all(&config.upload.public_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create public storage directory {}",
                config.upload.public_dir.display()
            )
        })?;

    let blob_store = Arc::new(FilesystemBlobStore::new(config.upload.public_dir.clone()));
    let coordinator = Arc::new(UploadCoordinator::new(config.upload.clone(), blob_store));

    let shutdown = CancellationToken::new();
    let sweeper = StaleSessionSweeper::new(
        coordinator.clone(),
        config.upload.stale_session_ttl,
        config.upload.sweep_interval,
    )
    .spawn(shutdown.clone());
    info!(
        ttl_secs = config.upload.stale_session_ttl.as_secs(),
        interval_secs = config.upload.sweep_interval.as_secs(),
        "Stale session sweeper started"
    );

    let app = scoreshare_ingest::build_router(AppState::with_coordinator(coordinator));

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("Server error")?;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        tracing::warn!("Stale session sweeper ended abnormally: {}", e);
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then cancel `token`
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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

    token.cancel();
}
