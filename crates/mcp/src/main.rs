//! MCP tool server for service-graph topology and span-metric queries

use anyhow::{Context, Result};
use detector_lib::source::MimirClient;
use spanmetrics_mcp::{config::McpConfig, server, McpServer};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = McpConfig::load()?;
    info!(mimir_url = %config.mimir_url, "MCP server configured");

    let backend = MimirClient::new(&config.mimir_url, config.request_timeout())
        .context("Failed to create metrics backend client")?;
    let mcp = Arc::new(McpServer::new(Arc::new(backend)));

    let server_handle = tokio::spawn(server::serve(config.listen_addr.clone(), mcp));

    tokio::select! {
        result = server_handle => {
            result.context("MCP server task failed")??;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("shutting down");
        }
    }

    Ok(())
}
