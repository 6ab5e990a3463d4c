//! Port contracts for MCP server registry storage and protocol clients.

mod client;
mod repository;

pub use client::{
    McpClientError, McpClientFactory, McpClientResult, McpConnector, McpSession, RemotePlan,
    StdioPlan, TransportPlan,
};
pub use repository::{
    McpServerRegistryError, McpServerRegistryRepository, McpServerRegistryResult,
};
