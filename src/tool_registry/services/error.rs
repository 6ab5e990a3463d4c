//! Errors surfaced by the connection manager.

use crate::tool_registry::{
    domain::{FailureKind, McpServerId, ToolRegistryDomainError},
    ports::{McpClientError, McpServerRegistryError},
};
use thiserror::Error;

/// Result type for connection manager operations.
pub type McpManagerResult<T> = Result<T, McpManagerError>;

/// Service-level errors for MCP connection management and invocation.
#[derive(Debug, Error)]
pub enum McpManagerError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] ToolRegistryDomainError),

    /// Repository operation failed.
    #[error(transparent)]
    Repository(#[from] McpServerRegistryError),

    /// No server is registered under the identifier.
    #[error("MCP server '{0}' is not registered")]
    NotRegistered(McpServerId),

    /// No connection could be established.
    #[error("MCP server '{server_name}' ({server_id}) is not connected: {reason}")]
    NotConnected {
        /// Server identifier.
        server_id: McpServerId,
        /// Server display name.
        server_name: String,
        /// Latest connection error, if any.
        reason: String,
    },

    /// The tool failed too often recently and is not being called.
    #[error(
        "tool '{tool}' on MCP server '{server_name}' failed {failures} times in a row and is temporarily disabled; try a different approach"
    )]
    CircuitOpen {
        /// Server identifier.
        server_id: McpServerId,
        /// Server display name.
        server_name: String,
        /// Tool name.
        tool: String,
        /// Consecutive failures recorded.
        failures: u32,
    },

    /// Credentials were rejected.
    #[error(
        "MCP server '{server_name}' rejected the credentials for '{operation}'; check the configured auth token and provider quota ({source})"
    )]
    Unauthorized {
        /// Server identifier.
        server_id: McpServerId,
        /// Server display name.
        server_name: String,
        /// Tool, resource, or prompt being accessed.
        operation: String,
        /// Underlying client error.
        source: Box<McpClientError>,
    },

    /// The requested tool, resource, or prompt does not exist.
    #[error("'{operation}' was not found on MCP server '{server_name}' ({source})")]
    NotFound {
        /// Server identifier.
        server_id: McpServerId,
        /// Server display name.
        server_name: String,
        /// Tool, resource, or prompt being accessed.
        operation: String,
        /// Underlying client error.
        source: Box<McpClientError>,
    },

    /// The tool ran and reported a failure.
    #[error("tool '{tool}' on MCP server '{server_name}' failed: {source}")]
    ToolFailed {
        /// Server identifier.
        server_id: McpServerId,
        /// Server display name.
        server_name: String,
        /// Tool name.
        tool: String,
        /// Underlying client error.
        source: Box<McpClientError>,
    },

    /// Retryable failures persisted through every attempt.
    #[error(
        "'{operation}' on MCP server '{server_name}' failed after {attempts} attempts ({kind}); try again later: {source}"
    )]
    RetriesExhausted {
        /// Server identifier.
        server_id: McpServerId,
        /// Server display name.
        server_name: String,
        /// Tool name.
        operation: String,
        /// Classification of the last failure.
        kind: FailureKind,
        /// Attempts made.
        attempts: u32,
        /// Last client error.
        source: Box<McpClientError>,
    },

    /// An unclassified failure.
    #[error("'{operation}' on MCP server '{server_name}' failed: {source}")]
    Failed {
        /// Server identifier.
        server_id: McpServerId,
        /// Server display name.
        server_name: String,
        /// Tool, resource, or prompt being accessed.
        operation: String,
        /// Underlying client error.
        source: Box<McpClientError>,
    },

    /// A qualified tool name did not match any discovered tool.
    #[error("no discovered tool is named '{0}'")]
    UnknownQualifiedTool(String),
}

impl McpManagerError {
    /// Returns the failure kind for errors raised by a protocol call.
    #[must_use]
    pub const fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Unauthorized { .. } => Some(FailureKind::Authentication),
            Self::NotFound { .. } => Some(FailureKind::NotFound),
            Self::ToolFailed { .. } => Some(FailureKind::ToolLogic),
            Self::RetriesExhausted { kind, .. } => Some(*kind),
            Self::Failed { .. } => Some(FailureKind::Generic),
            Self::Domain(_)
            | Self::Repository(_)
            | Self::NotRegistered(_)
            | Self::NotConnected { .. }
            | Self::CircuitOpen { .. }
            | Self::UnknownQualifiedTool(_) => None,
        }
    }
}
