//! simcat-catalog - Similarity Catalog service
//!
//! Stores listened tracks and books with their embeddings and answers
//! "more like this" queries over HTTP.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use simcat_catalog::services::{OpenAiEmbedder, TextEmbedder};
use simcat_catalog::AppState;
use simcat_common::config::{database_path, resolve_root_folder, CatalogConfig, ConfigSource};

/// Command-line arguments for simcat-catalog
#[derive(Parser, Debug)]
#[command(name = "simcat-catalog")]
#[command(about = "Similarity catalog for tracks and books")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, env = "SIMCAT_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding the catalog database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Address to listen on, overrides `bind_address` from the config file
    #[arg(short, long, env = "SIMCAT_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (config, config_source) = CatalogConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting simcat-catalog");
    info!(
        "Version: {} ({}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );
    match &config_source {
        ConfigSource::File(path) => info!("Loaded configuration from {}", path.display()),
        ConfigSource::Missing(path) => warn!(
            "Config file {} not found, using compiled defaults",
            path.display()
        ),
        ConfigSource::Defaults => warn!("No config file found, using compiled defaults"),
    }

    config.validate().context("Invalid configuration")?;

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
    let db_path = database_path(&root_folder);
    info!("Database: {}", db_path.display());

    let db_pool = simcat_catalog::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    let embedder: Option<Arc<dyn TextEmbedder>> =
        match simcat_catalog::config::resolve_text_api_key(&config.text) {
            Some(key) => {
                let embedder = OpenAiEmbedder::new(&config.text, key)
                    .context("Failed to create text embedding client")?;
                info!(model = embedder.model(), "Text embedding provider ready");
                Some(Arc::new(embedder))
            }
            None => None,
        };

    let bind = args.bind.unwrap_or_else(|| config.bind_address.clone());
    let state = AppState::new(db_pool, &config, embedder).context("Failed to build services")?;
    let app = simcat_catalog::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    info!("Listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

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
            warn!("Failed to install Ctrl+C handler: {}", e);
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
                warn!("Failed to install signal handler: {}", e);
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
