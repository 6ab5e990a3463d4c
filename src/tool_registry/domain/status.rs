//! MCP server connection status domain types.

use super::{McpServerId, McpTransportKind, ParseMcpServerStatusError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection status of a registered MCP server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpServerStatus {
    /// Registered without a live connection.
    #[default]
    Inactive,
    /// Connected and answering requests.
    Active,
    /// The last connection attempt or health check failed.
    Error,
    /// A connection attempt is in progress.
    Connecting,
}

impl McpServerStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Error => "error",
            Self::Connecting => "connecting",
        }
    }

    /// Returns whether transition to `target` is allowed.
    ///
    /// Every state may move to `connecting` or `inactive`. An inactive server
    /// must pass through `connecting` before it can become `active` or
    /// `error`.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (_, Self::Connecting | Self::Inactive)
                | (
                    Self::Connecting | Self::Active | Self::Error,
                    Self::Active | Self::Error
                )
        )
    }
}

impl fmt::Display for McpServerStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for McpServerStatus {
    type Error = ParseMcpServerStatusError;

    fn try_from(value: &str) -> Result<Self, <Self as TryFrom<&str>>::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "inactive" => Ok(Self::Inactive),
            "active" => Ok(Self::Active),
            "error" => Ok(Self::Error),
            "connecting" => Ok(Self::Connecting),
            _ => Err(ParseMcpServerStatusError(value.to_owned())),
        }
    }
}

/// Number of capabilities discovered on a server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityCounts {
    /// Discovered tools.
    pub tools: usize,
    /// Discovered resources.
    pub resources: usize,
    /// Discovered prompts.
    pub prompts: usize,
}

/// Read-only projection of a server's connection state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct McpServerStatusSnapshot {
    /// Server identifier.
    pub server_id: McpServerId,
    /// Display name.
    pub name: String,
    /// Configured transport.
    pub transport: McpTransportKind,
    /// Current status.
    pub status: McpServerStatus,
    /// Capability counts from the latest discovery.
    pub counts: CapabilityCounts,
    /// Latest connection or health-check error.
    pub last_error: Option<String>,
    /// When the server last connected successfully.
    pub last_connected: Option<DateTime<Utc>>,
    /// Whether the manager holds a live connection.
    pub connected: bool,
}
