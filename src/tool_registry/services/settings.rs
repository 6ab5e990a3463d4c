//! Tunables for the MCP connection manager.

use crate::tool_registry::domain::AuthHeaderAdapter;
use std::time::Duration;

/// Configuration for [`super::McpConnectionManager`].
///
/// # Examples
///
/// ```
/// use pilotis::tool_registry::domain::AuthHeaderAdapter;
/// use pilotis::tool_registry::services::McpManagerSettings;
/// use std::time::Duration;
///
/// let settings = McpManagerSettings::default();
/// assert_eq!(settings.tool_execution_timeout, Duration::from_secs(60));
///
/// let custom = McpManagerSettings::default()
///     .with_auth_headers(AuthHeaderAdapter::new().with_provider("acme", "X-Acme-Key"));
/// assert_eq!(
///     custom.auth_headers.header_for_provider("acme"),
///     Some("X-Acme-Key")
/// );
/// ```
#[derive(Debug, Clone)]
pub struct McpManagerSettings {
    /// Deadline for opening a session.
    pub connection_timeout: Duration,
    /// Deadline for pings and capability listings.
    pub ping_timeout: Duration,
    /// Deadline for one tool call; also the SSE read timeout.
    pub tool_execution_timeout: Duration,
    /// Connection attempts per `connect_server` call.
    pub max_connection_attempts: u32,
    /// First connection retry delay; doubled on every further attempt.
    pub connection_retry_base_delay: Duration,
    /// Upper bound for the exponential connection retry delay.
    pub connection_retry_max_delay: Duration,
    /// Upper bound (exclusive) for random jitter added to connection delays.
    pub connection_retry_jitter: Duration,
    /// Attempts per tool call for retryable failures.
    pub tool_call_max_attempts: u32,
    /// Base delay for rate-limit and timeout back-off.
    pub tool_retry_base_delay: Duration,
    /// Lifetime of a cached tool result.
    pub result_cache_ttl: Duration,
    /// Consecutive failures that open the circuit for a tool.
    pub circuit_failure_threshold: u32,
    /// Quiet period after which an open circuit admits one trial call.
    ///
    /// The default of 60 seconds relaxes strict fail-fast: an open circuit
    /// is eventually probed again. `None` keeps the circuit open until a
    /// success is recorded.
    pub circuit_cooldown: Option<Duration>,
    /// Provider-specific credential header mapping.
    pub auth_headers: AuthHeaderAdapter,
}

impl Default for McpManagerSettings {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(10),
            tool_execution_timeout: Duration::from_secs(60),
            max_connection_attempts: 3,
            connection_retry_base_delay: Duration::from_secs(2),
            connection_retry_max_delay: Duration::from_secs(15),
            connection_retry_jitter: Duration::from_secs(1),
            tool_call_max_attempts: 2,
            tool_retry_base_delay: Duration::from_secs(2),
            result_cache_ttl: Duration::from_secs(30),
            circuit_failure_threshold: 3,
            circuit_cooldown: Some(Duration::from_secs(60)),
            auth_headers: AuthHeaderAdapter::default(),
        }
    }
}

impl McpManagerSettings {
    /// Replaces the provider credential header mapping.
    #[must_use]
    pub fn with_auth_headers(mut self, auth_headers: AuthHeaderAdapter) -> Self {
        self.auth_headers = auth_headers;
        self
    }

    /// Disables the circuit cooldown so an open circuit stays open until a
    /// success resets it.
    #[must_use]
    pub fn without_circuit_cooldown(mut self) -> Self {
        self.circuit_cooldown = None;
        self
    }
}
