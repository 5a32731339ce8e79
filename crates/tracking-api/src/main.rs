//! # Device Tracking API Server
//!
//! Main entry point for the device location tracking service.
//! Accepts location reports, evaluates geofences and serves alert
//! queries over a JSON REST API.

mod config;
mod error;
mod handlers;
mod routes;
mod state;

use crate::config::ApiConfig;
use crate::routes::create_router;
use crate::state::AppState;

use std::net::SocketAddr;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    init_logging();

    info!("Starting Device Tracking Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = ApiConfig::from_env();
    info!("Configuration loaded");
    info!("   API Port: {}", config.api_port);
    info!("   ScyllaDB Hosts: {:?}", config.db.hosts);
    info!("   Geofence radius: {} km", config.tracker.geofence_radius_km);

    // Initialize application state
    info!("Initializing application state...");
    let state = match AppState::new(config.clone()).await {
        Ok(state) => {
            info!("Application state initialized");
            state
        }
        Err(e) => {
            error!("Failed to initialize application state: {}", e);
            warn!("Running in degraded mode (in-memory storage, data is not persisted)");
            AppState::new_without_db(config.clone())?
        }
    };

    // Create router
    let app = create_router(state);
    info!("Routes configured");

    // Start API server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    info!("API server listening on http://{}", addr);
    info!("Metrics available at http://{}/metrics", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize logging with tracing. `LOG_FORMAT=json` switches to JSON lines.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tracking_api=debug,tracking_engine=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

/// Graceful shutdown handler
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
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        }
    }
}
