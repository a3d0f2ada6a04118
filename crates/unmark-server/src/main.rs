//! # unmark-server
//!
//! Server-authoritative mode of Unmark.
//!
//! This binary provides:
//! - **REST API** (axum) for sessions, processing, history, sharing and the
//!   public feed
//! - **Quota enforcement** per anonymous identity, reset lazily each UTC day
//! - **Object hosting** for processed images under `/objects`

mod api;
mod config;
mod error;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use unmark_core::ReplicateTransformer;
use unmark_shared::SystemClock;
use unmark_store::{Database, ObjectStore, ServerBackend};

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
                .unwrap_or_else(|_| EnvFilter::new("info,unmark_server=debug")),
        )
        .init();

    info!("Starting Unmark server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    if config.replicate.api_token.is_none() {
        tracing::warn!("REPLICATE_API_TOKEN is not set; every transformation will fail");
    }

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let db = Database::open_at(&config.database_path)?;
    let objects = ObjectStore::new(config.object_storage_path.clone(), &config.site_url).await?;
    let backend = Arc::new(ServerBackend::new(db, objects));

    let transformer = Arc::new(ReplicateTransformer::new(config.replicate.clone()));
    let http_addr = config.http_addr;

    let app_state = AppState::new(backend, transformer, Arc::new(SystemClock), config);

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
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
