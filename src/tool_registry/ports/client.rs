//! Protocol client port for talking to MCP servers.
//!
//! Building a client is split from opening it: [`McpClientFactory::build`]
//! validates a [`TransportPlan`] without any I/O and returns an
//! [`McpConnector`]; [`McpConnector::connect`] performs the handshake and
//! yields a live [`McpSession`].

use crate::tool_registry::domain::{
    FailureClass, McpPromptDefinition, McpResourceDefinition, McpServerId, McpToolDefinition,
    PromptOutput, ResourceReadOutput, ToolArguments, ToolCallOutput, parse_retry_after,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for protocol client operations.
pub type McpClientResult<T> = Result<T, McpClientError>;

/// Fully resolved connection parameters for a remote server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePlan {
    /// Endpoint URL.
    pub url: String,
    /// Request headers, credentials included.
    pub headers: BTreeMap<String, String>,
    /// Per-read timeout for long-lived streams.
    pub read_timeout: Option<Duration>,
}

/// Fully resolved launch parameters for a STDIO server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdioPlan {
    /// Absolute path of the executable.
    pub program: PathBuf,
    /// Command-line arguments.
    pub args: Vec<String>,
    /// Complete child environment.
    pub env: BTreeMap<String, String>,
    /// Optional working directory.
    pub working_directory: Option<PathBuf>,
}

/// Transport selected for a connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportPlan {
    /// Streamable HTTP.
    Http(RemotePlan),
    /// Server-sent events.
    Sse(RemotePlan),
    /// Child process over STDIO.
    Stdio(StdioPlan),
}

/// Creates connectors from transport plans.
pub trait McpClientFactory: Send + Sync {
    /// Builds a connector for `server_id`. Must not perform I/O.
    ///
    /// # Errors
    ///
    /// Returns [`McpClientError::InvalidConfiguration`] when the plan cannot
    /// be turned into a client.
    fn build(
        &self,
        server_id: &McpServerId,
        plan: TransportPlan,
    ) -> McpClientResult<Box<dyn McpConnector>>;
}

/// Opens a session with a single server.
#[async_trait]
pub trait McpConnector: Send {
    /// Performs the protocol handshake.
    async fn connect(self: Box<Self>) -> McpClientResult<Arc<dyn McpSession>>;
}

/// Live protocol session with one server.
#[async_trait]
pub trait McpSession: Send + Sync {
    /// Sends a protocol ping.
    async fn ping(&self) -> McpClientResult<()>;

    /// Lists every tool the server exposes.
    async fn list_tools(&self) -> McpClientResult<Vec<McpToolDefinition>>;

    /// Lists every resource the server exposes.
    async fn list_resources(&self) -> McpClientResult<Vec<McpResourceDefinition>>;

    /// Lists every prompt the server exposes.
    async fn list_prompts(&self) -> McpClientResult<Vec<McpPromptDefinition>>;

    /// Invokes a tool.
    async fn call_tool(&self, name: &str, arguments: ToolArguments)
    -> McpClientResult<ToolCallOutput>;

    /// Reads a resource.
    async fn read_resource(&self, uri: &str) -> McpClientResult<ResourceReadOutput>;

    /// Renders a prompt.
    async fn get_prompt(
        &self,
        name: &str,
        arguments: ToolArguments,
    ) -> McpClientResult<PromptOutput>;

    /// Closes the session. Closing twice is a no-op.
    async fn close(&self);
}

/// Errors returned by protocol client adapters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum McpClientError {
    /// The server answered with an HTTP error status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response detail.
        message: String,
        /// Parsed `Retry-After` header.
        retry_after: Option<Duration>,
    },

    /// The operation exceeded its deadline.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The connection could not be opened or broke.
    #[error("connection error: {0}")]
    Connection(String),

    /// The server answered with a protocol error.
    #[error("server error {code}: {message}")]
    Server {
        /// Protocol error code.
        code: i32,
        /// Error message.
        message: String,
    },

    /// The tool ran and flagged its result as an error.
    #[error("tool reported an error: {message}")]
    ToolReported {
        /// Text content of the failed result.
        message: String,
    },

    /// The transport plan could not be turned into a client.
    #[error("invalid client configuration: {0}")]
    InvalidConfiguration(String),

    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

impl McpClientError {
    /// Classifies the error for retry handling.
    ///
    /// Structured data is consulted first: HTTP status codes map directly,
    /// tool-reported results are tool-logic failures, and protocol errors
    /// without a recognised marker are tool-logic failures as well.
    #[must_use]
    pub fn classify(&self) -> FailureClass {
        match self {
            Self::Http {
                status,
                message,
                retry_after,
            } => match status {
                401 | 403 => FailureClass::Authentication,
                404 => FailureClass::NotFound,
                429 => FailureClass::RateLimited {
                    retry_after: retry_after.or_else(|| parse_retry_after(message)),
                },
                408 | 504 => FailureClass::Timeout,
                500..=599 => FailureClass::Transport,
                _ => FailureClass::from_message(message),
            },
            Self::Timeout(_) => FailureClass::Timeout,
            Self::Connection(_) => FailureClass::Transport,
            Self::ToolReported { .. } => FailureClass::ToolLogic,
            Self::Server { message, .. } => match FailureClass::from_message(message) {
                FailureClass::Generic => FailureClass::ToolLogic,
                classified => classified,
            },
            Self::InvalidConfiguration(_) => FailureClass::Generic,
            Self::Other(message) => FailureClass::from_message(message),
        }
    }
}
