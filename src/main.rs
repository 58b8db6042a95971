//! Survival Game Server - authoritative multiplayer gameplay server
//!
//! This is the main entry point for the game server. It handles:
//! - The fixed-rate session loop that owns all gameplay state
//! - WebSocket connections for real-time gameplay
//! - A small HTTP surface for health and catalog lookups

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use survival_server::app::AppState;
use survival_server::config::Config;
use survival_server::game::catalog::Catalog;
use survival_server::game::GameSession;
use survival_server::http::build_router;
use survival_server::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting Survival Game Server");
    info!("Server address: {}", config.server_addr);

    let catalog = match &config.catalog_path {
        Some(path) => {
            info!(path = %path.display(), "Loading catalog");
            Catalog::load(path)?
        }
        None => Catalog::builtin()?,
    };
    let catalog = Arc::new(catalog);
    info!(item_classes = catalog.item_count(), seed = config.world_seed, "Catalog ready");

    // Spawn the session loop
    let (session, handle) = GameSession::new(catalog.clone(), config.tuning.clone(), config.world_seed);
    tokio::spawn(session.run());

    // Create application state and router
    let state = AppState::new(config.clone(), catalog, handle);
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
