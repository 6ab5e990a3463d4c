//! MCP server configuration aggregate root.

use super::{
    AuthScheme, CapabilityCounts, HttpTransportConfig, McpAuth, McpServerId, McpServerStatus,
    McpServerStatusSnapshot, McpTransport, McpTransportKind, StdioTransportConfig,
    ToolRegistryDomainError,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Loosely typed server record as handed over by the CRUD layer.
///
/// `headers`, `args`, and `env` may arrive either as structured JSON or as a
/// JSON document encoded in a string. [`McpServerConfig::from_record`]
/// normalises both shapes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpServerRecord {
    /// Server identifier.
    pub server_id: String,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// One of `http`, `sse`, or `stdio`.
    pub transport_type: String,
    /// Endpoint URL for remote transports.
    #[serde(default)]
    pub url: Option<String>,
    /// Extra request headers for remote transports.
    #[serde(default)]
    pub headers: Option<Value>,
    /// One of `none`, `bearer`, or `api_key`.
    #[serde(default)]
    pub auth_type: Option<String>,
    /// Credential token.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Provider identifier used for credential header mapping.
    #[serde(default)]
    pub auth_provider: Option<String>,
    /// Executable for the STDIO transport.
    #[serde(default)]
    pub command: Option<String>,
    /// Command-line arguments for the STDIO transport.
    #[serde(default)]
    pub args: Option<Value>,
    /// Environment overlay for the STDIO transport.
    #[serde(default)]
    pub env: Option<Value>,
    /// Working directory for the STDIO transport.
    #[serde(default)]
    pub cwd: Option<String>,
}

/// MCP server configuration aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerConfig {
    id: McpServerId,
    name: String,
    description: Option<String>,
    transport: McpTransport,
    status: McpServerStatus,
    last_error: Option<String>,
    last_connected: Option<DateTime<Utc>>,
    counts: CapabilityCounts,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl McpServerConfig {
    /// Creates a new, inactive server configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::EmptyServerName`] when `name` is
    /// empty after trimming.
    pub fn new(
        id: McpServerId,
        name: impl Into<String>,
        transport: McpTransport,
        clock: &impl Clock,
    ) -> Result<Self, ToolRegistryDomainError> {
        let normalized_name = name.into().trim().to_owned();
        if normalized_name.is_empty() {
            return Err(ToolRegistryDomainError::EmptyServerName);
        }

        let timestamp = clock.utc();
        Ok(Self {
            id,
            name: normalized_name,
            description: None,
            transport,
            status: McpServerStatus::Inactive,
            last_error: None,
            last_connected: None,
            counts: CapabilityCounts::default(),
            created_at: timestamp,
            updated_at: timestamp,
        })
    }

    /// Validates and normalises a loosely typed record.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError`] for an unknown transport or auth
    /// type, a missing URL or command, or a field that cannot be decoded.
    pub fn from_record(
        record: McpServerRecord,
        clock: &impl Clock,
    ) -> Result<Self, ToolRegistryDomainError> {
        let id = McpServerId::new(record.server_id.clone())?;
        let transport = match McpTransportKind::try_from(record.transport_type.as_str())? {
            McpTransportKind::Http => McpTransport::Http(remote_config(&record)?),
            McpTransportKind::Sse => McpTransport::Sse(remote_config(&record)?),
            McpTransportKind::Stdio => McpTransport::Stdio(stdio_config(&record)?),
        };

        let config = Self::new(id, record.name, transport, clock)?;
        Ok(match record.description {
            Some(description) => config.with_description(description),
            None => config,
        })
    }

    /// Sets the description; blank text clears it.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let normalized = description.into().trim().to_owned();
        self.description = (!normalized.is_empty()).then_some(normalized);
        self
    }

    /// Returns the server identifier.
    #[must_use]
    pub const fn id(&self) -> &McpServerId {
        &self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the transport settings.
    #[must_use]
    pub const fn transport(&self) -> &McpTransport {
        &self.transport
    }

    /// Returns the connection status.
    #[must_use]
    pub const fn status(&self) -> McpServerStatus {
        self.status
    }

    /// Returns the latest recorded error.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Returns when the server last connected successfully.
    #[must_use]
    pub const fn last_connected(&self) -> Option<DateTime<Utc>> {
        self.last_connected
    }

    /// Returns capability counts from the latest discovery.
    #[must_use]
    pub const fn counts(&self) -> CapabilityCounts {
        self.counts
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Carries runtime state over from an earlier registration of the same
    /// server so re-registering does not misreport a live connection.
    pub fn inherit_runtime_state(&mut self, previous: &Self) {
        self.status = previous.status;
        self.last_error.clone_from(&previous.last_error);
        self.last_connected = previous.last_connected;
        self.counts = previous.counts;
        self.created_at = previous.created_at;
    }

    /// Marks a connection attempt as started.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::InvalidStatusTransition`] when the
    /// transition is not allowed.
    pub fn mark_connecting(&mut self, clock: &impl Clock) -> Result<(), ToolRegistryDomainError> {
        self.transition_to(McpServerStatus::Connecting)?;
        self.touch(clock);
        Ok(())
    }

    /// Marks a successful connection and stores discovery counts.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::InvalidStatusTransition`] when the
    /// transition is not allowed.
    pub fn mark_connected(
        &mut self,
        counts: CapabilityCounts,
        clock: &impl Clock,
    ) -> Result<(), ToolRegistryDomainError> {
        self.transition_to(McpServerStatus::Active)?;
        self.last_error = None;
        self.last_connected = Some(clock.utc());
        self.counts = counts;
        self.touch(clock);
        Ok(())
    }

    /// Marks a passing health check.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::InvalidStatusTransition`] when the
    /// transition is not allowed.
    pub fn mark_healthy(&mut self, clock: &impl Clock) -> Result<(), ToolRegistryDomainError> {
        self.transition_to(McpServerStatus::Active)?;
        self.last_error = None;
        self.touch(clock);
        Ok(())
    }

    /// Records a failure message and moves to `error`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::InvalidStatusTransition`] when the
    /// transition is not allowed.
    pub fn mark_error(
        &mut self,
        message: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), ToolRegistryDomainError> {
        self.transition_to(McpServerStatus::Error)?;
        self.last_error = Some(message.into());
        self.touch(clock);
        Ok(())
    }

    /// Marks the server as disconnected. Always allowed.
    pub fn mark_inactive(&mut self, clock: &impl Clock) {
        self.status = McpServerStatus::Inactive;
        self.touch(clock);
    }

    /// Builds a status projection.
    #[must_use]
    pub fn snapshot(&self, connected: bool) -> McpServerStatusSnapshot {
        McpServerStatusSnapshot {
            server_id: self.id.clone(),
            name: self.name.clone(),
            transport: self.transport.kind(),
            status: self.status,
            counts: self.counts,
            last_error: self.last_error.clone(),
            last_connected: self.last_connected,
            connected,
        }
    }

    fn touch(&mut self, clock: &impl Clock) {
        self.updated_at = clock.utc();
    }

    fn transition_to(&mut self, target: McpServerStatus) -> Result<(), ToolRegistryDomainError> {
        if !self.status.can_transition_to(target) {
            return Err(ToolRegistryDomainError::InvalidStatusTransition {
                from: self.status.as_str().to_owned(),
                to: target.as_str().to_owned(),
            });
        }

        self.status = target;
        Ok(())
    }
}

fn remote_config(record: &McpServerRecord) -> Result<HttpTransportConfig, ToolRegistryDomainError> {
    let url = record
        .url
        .as_deref()
        .ok_or(ToolRegistryDomainError::MissingUrl)?;
    let token_only = McpAuth::none().with_token(record.auth_token.clone().unwrap_or_default());
    // A token without a declared scheme is sent as a bearer credential.
    let scheme = match record.auth_type.as_deref() {
        Some(auth_type) => AuthScheme::try_from(auth_type)?,
        None if token_only.token().is_some() => AuthScheme::Bearer,
        None => AuthScheme::None,
    };
    let auth_with_token = token_only.with_scheme(scheme);
    let auth = match record.auth_provider.as_deref() {
        Some(provider) => auth_with_token.with_provider(provider),
        None => auth_with_token,
    };

    Ok(HttpTransportConfig::new(url)?
        .with_headers(decode_string_map("headers", record.headers.as_ref())?)
        .with_auth(auth))
}

fn stdio_config(record: &McpServerRecord) -> Result<StdioTransportConfig, ToolRegistryDomainError> {
    let command = record
        .command
        .as_deref()
        .ok_or(ToolRegistryDomainError::EmptyStdioCommand)?;
    let config = StdioTransportConfig::new(command)?
        .with_args(decode_string_list("args", record.args.as_ref())?)
        .with_env(decode_string_map("env", record.env.as_ref())?);

    match record.cwd.as_deref().map(str::trim) {
        Some(cwd) if !cwd.is_empty() => config.with_working_directory(cwd),
        _ => Ok(config),
    }
}

/// Decodes a value that may be a JSON document encoded in a string.
fn decode_structured(
    field: &'static str,
    value: Option<&Value>,
) -> Result<Option<Value>, ToolRegistryDomainError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(encoded)) if encoded.trim().is_empty() => Ok(None),
        Some(Value::String(encoded)) => serde_json::from_str(encoded)
            .map(Some)
            .map_err(|err| ToolRegistryDomainError::MalformedField {
                field,
                reason: err.to_string(),
            }),
        Some(other) => Ok(Some(other.clone())),
    }
}

fn decode_string_list(
    field: &'static str,
    value: Option<&Value>,
) -> Result<Vec<String>, ToolRegistryDomainError> {
    match decode_structured(field, value)? {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| scalar_to_string(field, item))
            .collect(),
        Some(_) => Err(ToolRegistryDomainError::MalformedField {
            field,
            reason: "expected an array of strings".to_owned(),
        }),
    }
}

fn decode_string_map(
    field: &'static str,
    value: Option<&Value>,
) -> Result<Vec<(String, String)>, ToolRegistryDomainError> {
    match decode_structured(field, value)? {
        None => Ok(Vec::new()),
        Some(Value::Object(entries)) => entries
            .into_iter()
            .map(|(key, item)| Ok((key, scalar_to_string(field, item)?)))
            .collect(),
        Some(_) => Err(ToolRegistryDomainError::MalformedField {
            field,
            reason: "expected an object of string values".to_owned(),
        }),
    }
}

fn scalar_to_string(field: &'static str, value: Value) -> Result<String, ToolRegistryDomainError> {
    match value {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => {
            Err(ToolRegistryDomainError::MalformedField {
                field,
                reason: "nested values are not supported".to_owned(),
            })
        }
    }
}
