//! Dynamics 365 CRM MCP Server
//!
//! Bridges the Dynamics 365 (Dataverse) Web API to the Model Context Protocol.

mod api;
mod auth;
mod config;
mod error;
mod odata;
mod server;
#[cfg(test)]
mod testing;
mod trace;
mod transport;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rmcp::{transport::stdio, ServiceExt};
use tracing_subscriber::EnvFilter;

use crate::api::CrmClients;
use crate::auth::TokenManager;
use crate::config::Config;
use crate::odata::ODataClient;
use crate::server::DynamicsServer;
use crate::trace::TraceLog;
use crate::transport::ReqwestTransport;

#[derive(Parser, Debug)]
#[command(name = "dynamics-crm-mcp")]
#[command(author, version, about = "Dynamics 365 CRM MCP Server", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.json")]
    config: String,

    /// Enable debug logging and the tool-call trace file
    #[arg(short, long)]
    debug: bool,
}

/// Logs go to stderr; stdout carries the MCP protocol. `RUST_LOG` wins.
fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config))?;
    let debug_enabled = args.debug || config.debug;
    init_logging(debug_enabled);

    tracing::info!(
        config = %args.config,
        environment = %config.environment_root(),
        api_version = %config.api_version,
        "Dynamics 365 MCP Server starting"
    );

    let trace = Arc::new(TraceLog::new(debug_enabled));
    if let Some(path) = trace.path() {
        tracing::info!(path = %path.display(), "writing tool trace");
    }

    let transport = Arc::new(ReqwestTransport::new(config.timeout())?);
    let tokens = TokenManager::new(config.to_credentials(), transport.clone())
        .with_authority_host(config.authority_host.clone())
        .with_safety_margin(config.token_buffer());
    let odata = ODataClient::new(config.api_base_url(), tokens, transport);

    let server = DynamicsServer::new(CrmClients::new(odata), trace);

    tracing::debug!("starting MCP server on stdio transport");
    let service = server.serve(stdio()).await?;
    service.waiting().await?;
    tracing::info!("MCP server shutting down");

    Ok(())
}
