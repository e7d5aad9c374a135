//! # agora-server
//!
//! Real-time private messaging for the Agora forum.
//!
//! This binary provides:
//! - **Chat WebSocket** at `/ws`, admitted by the forum's session cookie
//! - **Hub** routing direct messages, typing indicators and presence between
//!   connected users
//! - **Message history** persisted in the forum's SQLite database
//! - **REST API** (axum) for health checks and the online-user list

mod agent;
mod api;
mod auth;
mod config;
mod connection;
mod error;
mod hub;
mod mailbox;
mod store;

use agora_store::{Database, SharedDatabase};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,agora_server=debug")),
        )
        .init();

    info!("Starting Agora chat server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the forum database (runs migrations)
    // -----------------------------------------------------------------------
    let db = Database::open_at(&config.database_path)?;
    let db = SharedDatabase::new(db);

    let http_addr = config.http_addr;
    let app_state = AppState::new(db, config);

    // -----------------------------------------------------------------------
    // 4. Run the HTTP server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
