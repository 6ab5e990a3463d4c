//! MCP server transport configuration value objects.

use super::{McpAuth, ToolRegistryDomainError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Transport settings for an MCP server hosted over STDIO.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdioTransportConfig {
    command: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_directory: Option<String>,
}

impl StdioTransportConfig {
    /// Creates a new STDIO transport configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::EmptyStdioCommand`] when `command`
    /// is empty after trimming.
    pub fn new(command: impl Into<String>) -> Result<Self, ToolRegistryDomainError> {
        let normalized_command = command.into().trim().to_owned();
        if normalized_command.is_empty() {
            return Err(ToolRegistryDomainError::EmptyStdioCommand);
        }

        Ok(Self {
            command: normalized_command,
            args: Vec::new(),
            env: BTreeMap::new(),
            working_directory: None,
        })
    }

    /// Replaces command-line arguments.
    #[must_use]
    pub fn with_args(mut self, values: impl IntoIterator<Item = String>) -> Self {
        self.args = values.into_iter().collect();
        self
    }

    /// Replaces the environment overlay applied on top of the parent process.
    #[must_use]
    pub fn with_env(mut self, values: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env = values.into_iter().collect();
        self
    }

    /// Sets an explicit working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::EmptyWorkingDirectory`] when the
    /// provided value is empty after trimming.
    pub fn with_working_directory(
        mut self,
        value: impl Into<String>,
    ) -> Result<Self, ToolRegistryDomainError> {
        let normalized = value.into().trim().to_owned();
        if normalized.is_empty() {
            return Err(ToolRegistryDomainError::EmptyWorkingDirectory);
        }

        self.working_directory = Some(normalized);
        Ok(self)
    }

    /// Returns the executable command as configured.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Returns command-line arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the environment overlay.
    #[must_use]
    pub const fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Returns the optional working directory.
    #[must_use]
    pub fn working_directory(&self) -> Option<&str> {
        self.working_directory.as_deref()
    }
}

/// Transport settings shared by the streamable HTTP and SSE transports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpTransportConfig {
    url: String,
    headers: BTreeMap<String, String>,
    auth: McpAuth,
}

impl HttpTransportConfig {
    /// Creates a new remote transport configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError`] when `url` is empty or does not
    /// start with `http://` or `https://`.
    pub fn new(url: impl Into<String>) -> Result<Self, ToolRegistryDomainError> {
        let normalized_url = url.into().trim().to_owned();
        if normalized_url.is_empty() {
            return Err(ToolRegistryDomainError::MissingUrl);
        }

        let has_valid_prefix =
            normalized_url.starts_with("http://") || normalized_url.starts_with("https://");
        if !has_valid_prefix {
            return Err(ToolRegistryDomainError::InvalidUrl(normalized_url));
        }

        Ok(Self {
            url: normalized_url,
            headers: BTreeMap::new(),
            auth: McpAuth::none(),
        })
    }

    /// Replaces the explicit request headers.
    #[must_use]
    pub fn with_headers(mut self, values: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers = values
            .into_iter()
            .map(|(name, value)| (name.trim().to_owned(), value))
            .filter(|(name, _)| !name.is_empty())
            .collect();
        self
    }

    /// Sets the credential configuration.
    #[must_use]
    pub fn with_auth(mut self, auth: McpAuth) -> Self {
        self.auth = auth;
        self
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the explicit request headers.
    #[must_use]
    pub const fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Returns the credential configuration.
    #[must_use]
    pub const fn auth(&self) -> &McpAuth {
        &self.auth
    }
}

/// Transport kind without its configuration payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpTransportKind {
    /// Streamable HTTP.
    Http,
    /// Server-sent events.
    Sse,
    /// Local child process over STDIO.
    Stdio,
}

impl McpTransportKind {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Sse => "sse",
            Self::Stdio => "stdio",
        }
    }
}

impl fmt::Display for McpTransportKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for McpTransportKind {
    type Error = ToolRegistryDomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "http" | "streamable_http" | "streamable-http" => Ok(Self::Http),
            "sse" => Ok(Self::Sse),
            "stdio" => Ok(Self::Stdio),
            _ => Err(ToolRegistryDomainError::UnknownTransportType(
                value.to_owned(),
            )),
        }
    }
}

/// Supported MCP transport configuration variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "config")]
pub enum McpTransport {
    /// MCP over streamable HTTP.
    Http(HttpTransportConfig),
    /// MCP over server-sent events.
    Sse(HttpTransportConfig),
    /// MCP over local process STDIO.
    Stdio(StdioTransportConfig),
}

impl McpTransport {
    /// Creates an `http` transport.
    ///
    /// # Errors
    ///
    /// Returns validation errors from [`HttpTransportConfig::new`].
    pub fn http(url: impl Into<String>) -> Result<Self, ToolRegistryDomainError> {
        Ok(Self::Http(HttpTransportConfig::new(url)?))
    }

    /// Creates an `sse` transport.
    ///
    /// # Errors
    ///
    /// Returns validation errors from [`HttpTransportConfig::new`].
    pub fn sse(url: impl Into<String>) -> Result<Self, ToolRegistryDomainError> {
        Ok(Self::Sse(HttpTransportConfig::new(url)?))
    }

    /// Creates a `stdio` transport.
    ///
    /// # Errors
    ///
    /// Returns validation errors from [`StdioTransportConfig::new`].
    pub fn stdio(command: impl Into<String>) -> Result<Self, ToolRegistryDomainError> {
        Ok(Self::Stdio(StdioTransportConfig::new(command)?))
    }

    /// Returns the transport kind.
    #[must_use]
    pub const fn kind(&self) -> McpTransportKind {
        match self {
            Self::Http(_) => McpTransportKind::Http,
            Self::Sse(_) => McpTransportKind::Sse,
            Self::Stdio(_) => McpTransportKind::Stdio,
        }
    }

    /// Returns the remote configuration for `http` and `sse` transports.
    #[must_use]
    pub const fn remote(&self) -> Option<&HttpTransportConfig> {
        match self {
            Self::Http(config) | Self::Sse(config) => Some(config),
            Self::Stdio(_) => None,
        }
    }
}
