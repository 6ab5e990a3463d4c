//! Domain model for MCP server connections and capability discovery.
//!
//! The tool registry domain models MCP server identity, transport and
//! credential configuration, connection status, discovered capabilities,
//! and the failure taxonomy used to drive retries. Infrastructure concerns
//! remain outside this boundary.

mod auth;
mod capability;
mod error;
mod failure;
mod ids;
mod invocation;
mod server;
mod status;
mod transport;

pub use auth::{
    AUTHORIZATION_HEADER, AuthAdvisory, AuthHeaderAdapter, AuthScheme, DEFAULT_API_KEY_HEADER,
    MIN_TOKEN_LENGTH, McpAuth,
};
pub use capability::{
    CapabilitySet, McpPromptArgument, McpPromptDefinition, McpResourceDefinition,
    McpToolDefinition, NamedCapability, QUALIFIED_NAME_SEPARATOR, ServerScoped, qualified_name,
};
pub use error::{ParseMcpServerStatusError, ToolRegistryDomainError};
pub use failure::{ConnectionFailure, FailureClass, FailureKind, parse_retry_after};
pub use ids::McpServerId;
pub use invocation::{PromptOutput, ResourceReadOutput, ToolArguments, ToolCallOutput};
pub use server::{McpServerConfig, McpServerRecord};
pub use status::{CapabilityCounts, McpServerStatus, McpServerStatusSnapshot};
pub use transport::{HttpTransportConfig, McpTransport, McpTransportKind, StdioTransportConfig};
