//! Error types for MCP server domain validation and parsing.

use thiserror::Error;

/// Errors returned while constructing tool registry domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolRegistryDomainError {
    /// The server identifier is empty after trimming.
    #[error("MCP server identifier must not be empty")]
    EmptyServerId,

    /// The server identifier contains characters outside `[A-Za-z0-9_.-]`.
    #[error(
        "MCP server identifier '{0}' contains invalid characters (only alphanumeric, '.', '-' and '_' allowed)"
    )]
    InvalidServerId(String),

    /// The server identifier exceeds the 100-character limit.
    #[error("MCP server identifier exceeds 100 character limit: {0}")]
    ServerIdTooLong(String),

    /// The server display name is empty after trimming.
    #[error("MCP server name must not be empty")]
    EmptyServerName,

    /// The transport type string is not one of `http`, `sse`, or `stdio`.
    #[error("unknown MCP transport type '{0}' (expected 'http', 'sse', or 'stdio')")]
    UnknownTransportType(String),

    /// The auth type string is not recognised.
    #[error("unknown MCP auth type '{0}' (expected 'none', 'bearer', or 'api_key')")]
    UnknownAuthType(String),

    /// The STDIO command is empty.
    #[error("STDIO command must not be empty")]
    EmptyStdioCommand,

    /// The STDIO command could not be resolved to an executable.
    #[error("STDIO command '{0}' could not be resolved to an executable path")]
    CommandNotFound(String),

    /// The STDIO working directory is empty after trimming.
    #[error("STDIO working directory must not be empty when provided")]
    EmptyWorkingDirectory,

    /// A remote transport was configured without a URL.
    #[error("remote MCP transport requires a URL")]
    MissingUrl,

    /// The remote URL does not have an `http://` or `https://` prefix.
    #[error("remote MCP URL '{0}' must start with 'http://' or 'https://'")]
    InvalidUrl(String),

    /// A structured field arrived in a shape that cannot be normalised.
    #[error("field '{field}' is malformed: {reason}")]
    MalformedField {
        /// Name of the offending record field.
        field: &'static str,
        /// Why normalisation failed.
        reason: String,
    },

    /// A capability name is empty after trimming.
    #[error("{kind} name must not be empty")]
    EmptyCapabilityName {
        /// Capability kind (`tool`, `resource`, or `prompt`).
        kind: &'static str,
    },

    /// Transitioning between two connection states is invalid.
    #[error("invalid MCP server status transition: {from} -> {to}")]
    InvalidStatusTransition {
        /// Current status.
        from: String,
        /// Requested target status.
        to: String,
    },
}

/// Error returned while parsing a server status from its string form.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown MCP server status: {0}")]
pub struct ParseMcpServerStatusError(pub String);
