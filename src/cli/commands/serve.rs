//! Relay server command handler.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::net::TcpListener;

use crate::config::{ConfigManager, ResolveOptions, resolve_config};
use crate::server::RelayServer;
use crate::translation::build_translator;

/// Options for running the relay server.
#[derive(Debug, Default)]
pub struct ServeOptions {
    pub config: Option<PathBuf>,
    pub resolve: ResolveOptions,
}

/// Returns the config manager for an explicit path or the default location.
pub fn config_manager(path: Option<PathBuf>) -> Result<ConfigManager> {
    match path {
        Some(path) => Ok(ConfigManager::with_path(path)),
        None => ConfigManager::new(),
    }
}

/// Loads configuration, binds the listener and serves until Ctrl-C.
pub async fn run_serve(options: ServeOptions) -> Result<()> {
    let manager = config_manager(options.config)?;
    let config_file = manager.load_or_default()?;
    let resolved = resolve_config(&options.resolve, &config_file)?;

    let translator = build_translator(&resolved.translation)?;
    let bind = resolved.server.bind;
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;

    let server = RelayServer::new(resolved.server, translator);
    server
        .run(listener, shutdown_signal())
        .await
        .context("Relay server failed")?;

    tracing::info!(
        open_connections = server.connection_count(),
        "relay server stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C, shutting down");
    }
}
