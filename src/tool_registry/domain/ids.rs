//! Identifier type for MCP servers.

use super::ToolRegistryDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length for an MCP server identifier.
const MAX_SERVER_ID_LENGTH: usize = 100;

/// Validated identifier of a registered MCP server.
///
/// Identifiers are assigned by the owning persistence layer, so they are
/// opaque strings rather than generated UUIDs. The input is trimmed and
/// restricted to `[A-Za-z0-9_.-]` so it can be embedded in qualified
/// capability names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct McpServerId(String);

impl McpServerId {
    /// Creates a validated MCP server identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError`] when validation fails.
    pub fn new(value: impl Into<String>) -> Result<Self, ToolRegistryDomainError> {
        let normalized = value.into().trim().to_owned();

        if normalized.is_empty() {
            return Err(ToolRegistryDomainError::EmptyServerId);
        }

        let is_valid = normalized.chars().all(|character| {
            character.is_ascii_alphanumeric() || matches!(character, '_' | '-' | '.')
        });
        if !is_valid {
            return Err(ToolRegistryDomainError::InvalidServerId(normalized));
        }

        if normalized.len() > MAX_SERVER_ID_LENGTH {
            return Err(ToolRegistryDomainError::ServerIdTooLong(normalized));
        }

        Ok(Self(normalized))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for McpServerId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for McpServerId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<String> for McpServerId {
    type Error = ToolRegistryDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for McpServerId {
    type Error = ToolRegistryDomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<McpServerId> for String {
    fn from(value: McpServerId) -> Self {
        value.0
    }
}
