//! Connects to the MCP servers described in a JSON file and reports their
//! status and tools.
//!
//! Usage:
//!
//! ```text
//! mcp_probe <servers-path>
//! ```
//!
//! The file must hold a JSON array of server records. A representative
//! payload is:
//!
//! ```json
//! [
//!   {
//!     "server_id": "files",
//!     "name": "Workspace files",
//!     "transport_type": "stdio",
//!     "command": "mcp-server-filesystem",
//!     "args": ["/srv/workspace"]
//!   },
//!   {
//!     "server_id": "search",
//!     "name": "Web search",
//!     "transport_type": "http",
//!     "url": "https://search.example.com/mcp",
//!     "auth_type": "bearer",
//!     "auth_token": "..."
//!   }
//! ]
//! ```
//!
//! The report is written to stdout as JSON. Logs go to stderr as JSON lines,
//! filtered by `RUST_LOG` (default `info`).

use mockable::DefaultClock;
use pilotis::tool_registry::{
    adapters::{memory::InMemoryMcpServerRegistry, rmcp_client::RmcpClientFactory},
    domain::{McpServerRecord, McpServerStatusSnapshot, McpToolDefinition, ServerScoped},
    services::{McpConnectionManager, McpManagerError},
};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Builder;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Boxed error type for the main result.
type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
enum ProbeError {
    #[error("usage: mcp_probe <servers-path>")]
    Usage,
    #[error("failed to read server records: {0}")]
    ConfigRead(#[source] io::Error),
    #[error("failed to parse server records: {0}")]
    ConfigParse(#[source] serde_json::Error),
    #[error("runtime init failed: {0}")]
    RuntimeInit(#[source] io::Error),
    #[error(transparent)]
    Manager(#[from] McpManagerError),
    #[error("failed to write report: {0}")]
    Output(#[source] serde_json::Error),
}

#[derive(Debug, Serialize)]
struct ProbeReport {
    servers: Vec<McpServerStatusSnapshot>,
    tools: Vec<ServerScoped<McpToolDefinition>>,
}

fn main() -> Result<(), BoxError> {
    init_tracing();
    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .ok_or(ProbeError::Usage)?;
    let records = load_records(&path)?;

    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(ProbeError::RuntimeInit)?;
    let report = runtime.block_on(probe(records))?;

    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &report).map_err(ProbeError::Output)?;
    writeln!(stdout)?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_records(path: &Path) -> Result<Vec<McpServerRecord>, ProbeError> {
    let raw = std::fs::read_to_string(path).map_err(ProbeError::ConfigRead)?;
    serde_json::from_str(&raw).map_err(ProbeError::ConfigParse)
}

async fn probe(records: Vec<McpServerRecord>) -> Result<ProbeReport, ProbeError> {
    let manager = McpConnectionManager::new(
        Arc::new(InMemoryMcpServerRegistry::new()),
        Arc::new(RmcpClientFactory::new()),
        Arc::new(DefaultClock),
    );

    for record in records {
        let server_id = record.server_id.clone();
        match manager.register_record(record).await {
            Ok(_) => {}
            Err(McpManagerError::Domain(err)) => {
                warn!(server_id = %server_id, error = %err, "skipping invalid MCP server record");
            }
            Err(err) => return Err(err.into()),
        }
    }

    let servers = manager.list_servers().await?;
    for snapshot in &servers {
        manager.connect_server(&snapshot.server_id).await?;
    }

    let report = ProbeReport {
        servers: manager.list_servers().await?,
        tools: manager.get_tools(None).await?,
    };
    manager.shutdown().await;
    Ok(report)
}
