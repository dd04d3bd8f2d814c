//! multirank-api - Main entry point
//!
//! HTTP JSON API for multi-evaluator ranking: evaluators rank the
//! categories and items of an instrument, admins aggregate the submitted
//! results with role-weighted averages.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use multirank_api::{build_router, AppState};
use multirank_common::config::{database_path, resolve_data_dir, ServiceConfig};
use multirank_common::db::init_database;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for multirank-api
#[derive(Parser, Debug)]
#[command(name = "multirank-api")]
#[command(about = "Multi-evaluator ranking API service")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5730", env = "MULTIRANK_PORT")]
    port: u16,

    /// Data folder holding multirank.db (falls back to MULTIRANK_DATA_DIR,
    /// then the config file, then the OS data dir)
    #[arg(short, long)]
    data_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "multirank_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!(
        "Starting multirank-api v{} on port {}",
        env!("CARGO_PKG_VERSION"),
        args.port
    );

    let data_dir = resolve_data_dir(args.data_dir.as_deref(), "MULTIRANK_DATA_DIR");
    let db_path = database_path(&data_dir).context("Failed to prepare data folder")?;
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .context("Failed to initialize database")?;
    info!("✓ Database initialized");

    let config = ServiceConfig::load();
    let state = AppState::new(pool, config);
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("multirank-api listening on http://{}", addr);
    info!("Health check: http://127.0.0.1:{}/health", args.port);

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
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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
