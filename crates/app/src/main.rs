//! Lantern - headless room server for storyteller-led deduction games
//!
//! Binds a TCP listener, loads the script catalog, and serves rooms until
//! interrupted. Usage: `lantern [config.toml]`.

use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lantern_core::ScriptRegistry;
use lantern_net::RoomServer;

mod config;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting Lantern");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match config::Config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    let addr = match config.listen_addr() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    // Script catalog: the embedded default plus anything in the scripts dir.
    let mut registry = match ScriptRegistry::builtin() {
        Ok(registry) => registry,
        Err(e) => {
            tracing::error!("Built-in script failed to load: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(dir) = &config.scripts_dir {
        registry.scan_dir(dir);
        for (path, error) in registry.load_errors() {
            tracing::warn!(path = %path.display(), %error, "Script skipped");
        }
    }
    tracing::info!(scripts = registry.len(), "Script catalog ready");

    let server = match RoomServer::start(addr, Arc::new(registry)).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %server.addr(), "Serving rooms");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
    server.shutdown().await;
}
