//! Capability value objects discovered from MCP servers.
//!
//! A server exposes three capability kinds: tools, resources, and prompts.
//! Discovery replaces a server's [`CapabilitySet`] wholesale; callers see
//! capabilities wrapped in [`ServerScoped`] so entries from different
//! servers never collide.

use super::{CapabilityCounts, McpServerId, ToolRegistryDomainError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Separator between server identifier and capability name in qualified
/// names.
pub const QUALIFIED_NAME_SEPARATOR: &str = "__";

/// Canonical metadata for a tool exposed by an MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpToolDefinition {
    name: String,
    description: String,
    input_schema: Value,
}

impl McpToolDefinition {
    /// Creates a tool definition. Servers may omit descriptions, so an empty
    /// description is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::EmptyCapabilityName`] when `name` is
    /// empty after trimming.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Result<Self, ToolRegistryDomainError> {
        let normalized_name = name.into().trim().to_owned();
        if normalized_name.is_empty() {
            return Err(ToolRegistryDomainError::EmptyCapabilityName { kind: "tool" });
        }

        Ok(Self {
            name: normalized_name,
            description: description.into().trim().to_owned(),
            input_schema,
        })
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the tool description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the input JSON schema.
    #[must_use]
    pub const fn input_schema(&self) -> &Value {
        &self.input_schema
    }
}

/// Metadata for a resource exposed by an MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpResourceDefinition {
    uri: String,
    name: String,
    description: Option<String>,
    mime_type: Option<String>,
}

impl McpResourceDefinition {
    /// Creates a resource definition; a blank `name` falls back to the URI.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::EmptyCapabilityName`] when `uri` is
    /// empty after trimming.
    pub fn new(
        uri: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, ToolRegistryDomainError> {
        let normalized_uri = uri.into().trim().to_owned();
        if normalized_uri.is_empty() {
            return Err(ToolRegistryDomainError::EmptyCapabilityName { kind: "resource" });
        }

        let trimmed_name = name.into().trim().to_owned();
        let resolved_name = if trimmed_name.is_empty() {
            normalized_uri.clone()
        } else {
            trimmed_name
        };

        Ok(Self {
            uri: normalized_uri,
            name: resolved_name,
            description: None,
            mime_type: None,
        })
    }

    /// Sets the optional description.
    #[must_use]
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description.filter(|text| !text.trim().is_empty());
        self
    }

    /// Sets the optional MIME type.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: Option<String>) -> Self {
        self.mime_type = mime_type.filter(|text| !text.trim().is_empty());
        self
    }

    /// Returns the resource URI.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Returns the resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the optional MIME type.
    #[must_use]
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }
}

/// Argument accepted by a prompt template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpPromptArgument {
    /// Argument name.
    pub name: String,
    /// Optional human-readable description.
    pub description: Option<String>,
    /// Whether the argument must be supplied.
    pub required: bool,
}

/// Metadata for a prompt template exposed by an MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpPromptDefinition {
    name: String,
    description: Option<String>,
    arguments: Vec<McpPromptArgument>,
}

impl McpPromptDefinition {
    /// Creates a prompt definition.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::EmptyCapabilityName`] when `name` is
    /// empty after trimming.
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        arguments: Vec<McpPromptArgument>,
    ) -> Result<Self, ToolRegistryDomainError> {
        let normalized_name = name.into().trim().to_owned();
        if normalized_name.is_empty() {
            return Err(ToolRegistryDomainError::EmptyCapabilityName { kind: "prompt" });
        }

        Ok(Self {
            name: normalized_name,
            description: description.filter(|text| !text.trim().is_empty()),
            arguments,
        })
    }

    /// Returns the prompt name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the declared arguments.
    #[must_use]
    pub fn arguments(&self) -> &[McpPromptArgument] {
        &self.arguments
    }
}

/// Capabilities with a name that is unique within one server.
pub trait NamedCapability {
    /// Returns the name used to build a qualified name.
    fn capability_name(&self) -> &str;
}

impl NamedCapability for McpToolDefinition {
    fn capability_name(&self) -> &str {
        self.name()
    }
}

impl NamedCapability for McpResourceDefinition {
    fn capability_name(&self) -> &str {
        self.name()
    }
}

impl NamedCapability for McpPromptDefinition {
    fn capability_name(&self) -> &str {
        self.name()
    }
}

/// Everything discovered on one server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    /// Discovered tools.
    pub tools: Vec<McpToolDefinition>,
    /// Discovered resources.
    pub resources: Vec<McpResourceDefinition>,
    /// Discovered prompts.
    pub prompts: Vec<McpPromptDefinition>,
}

impl CapabilitySet {
    /// Returns per-kind counts.
    #[must_use]
    pub const fn counts(&self) -> CapabilityCounts {
        CapabilityCounts {
            tools: self.tools.len(),
            resources: self.resources.len(),
            prompts: self.prompts.len(),
        }
    }

    /// Returns whether nothing was discovered.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.tools.is_empty() && self.resources.is_empty() && self.prompts.is_empty()
    }
}

/// A capability tagged with the server that exposes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerScoped<T> {
    /// Owning server.
    pub server_id: McpServerId,
    /// `"{server_id}__{name}"`, unique across servers.
    pub qualified_name: String,
    /// The capability itself.
    #[serde(flatten)]
    pub item: T,
}

impl<T: NamedCapability> ServerScoped<T> {
    /// Wraps `item` for `server_id`.
    #[must_use]
    pub fn new(server_id: McpServerId, item: T) -> Self {
        let qualified_name = qualified_name(&server_id, item.capability_name());
        Self {
            server_id,
            qualified_name,
            item,
        }
    }
}

/// Builds the qualified name of a capability.
#[must_use]
pub fn qualified_name(server_id: &McpServerId, name: &str) -> String {
    format!("{server_id}{QUALIFIED_NAME_SEPARATOR}{name}")
}
