//! Shared fixtures for connection manager integration tests.

use chrono::{DateTime, Local, TimeDelta, Utc};
use mockable::Clock;
use pilotis::tool_registry::{
    adapters::{InMemoryMcpClientFactory, memory::InMemoryMcpServerRegistry},
    domain::{
        CapabilitySet, HttpTransportConfig, McpAuth, McpPromptDefinition, McpResourceDefinition,
        McpServerConfig, McpServerId, McpToolDefinition, McpTransport, ToolArguments,
    },
    services::{McpConnectionManager, McpManagerSettings},
};
use rstest::fixture;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Manager wired to in-memory adapters and a hand-driven clock.
pub type TestManager =
    McpConnectionManager<InMemoryMcpServerRegistry, InMemoryMcpClientFactory, ManualClock>;

/// Wall clock that only moves when a test advances it.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Starts at the current time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc::now()),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += delta;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Everything a test needs to drive and observe the manager.
pub struct Harness {
    pub manager: Arc<TestManager>,
    pub factory: Arc<InMemoryMcpClientFactory>,
    pub clock: Arc<ManualClock>,
}

/// Settings without jitter so back-off delays are exact.
#[must_use]
pub fn quiet_settings() -> McpManagerSettings {
    McpManagerSettings {
        connection_retry_jitter: Duration::ZERO,
        ..McpManagerSettings::default()
    }
}

/// Builds a harness with explicit settings.
#[must_use]
pub fn harness_with(settings: McpManagerSettings) -> Harness {
    let factory = Arc::new(InMemoryMcpClientFactory::new());
    let clock = Arc::new(ManualClock::new());
    let manager = Arc::new(McpConnectionManager::with_settings(
        Arc::new(InMemoryMcpServerRegistry::new()),
        Arc::clone(&factory),
        Arc::clone(&clock),
        settings,
    ));
    Harness {
        manager,
        factory,
        clock,
    }
}

/// Provides a harness with jitter-free default settings.
#[fixture]
pub fn harness() -> Harness {
    harness_with(quiet_settings())
}

/// Parses a server identifier.
///
/// # Panics
///
/// Panics when `raw` is not a valid identifier.
#[must_use]
pub fn server_id(raw: &str) -> McpServerId {
    McpServerId::new(raw).expect("valid server id")
}

/// Builds an HTTP server configuration with a bearer token.
///
/// # Panics
///
/// Panics when `raw_id` is not a valid identifier.
#[must_use]
pub fn http_server(raw_id: &str, clock: &ManualClock) -> McpServerConfig {
    let remote = HttpTransportConfig::new(format!("https://{raw_id}.example.com/mcp"))
        .expect("valid url")
        .with_auth(McpAuth::bearer("test-token-0123456789"));
    McpServerConfig::new(
        server_id(raw_id),
        format!("{raw_id} server"),
        McpTransport::Http(remote),
        clock,
    )
    .expect("valid server config")
}

/// Builds a catalog with the named tools, one resource, and one prompt.
///
/// # Panics
///
/// Panics when a name is blank.
#[must_use]
pub fn catalog(tools: &[&str]) -> CapabilitySet {
    CapabilitySet {
        tools: tools
            .iter()
            .map(|name| {
                McpToolDefinition::new(*name, format!("Runs {name}"), json!({"type": "object"}))
                    .expect("valid tool")
            })
            .collect(),
        resources: vec![
            McpResourceDefinition::new("file:///readme.md", "readme").expect("valid resource"),
        ],
        prompts: vec![
            McpPromptDefinition::new("summarise", Some("Summarises text".to_owned()), Vec::new())
                .expect("valid prompt"),
        ],
    }
}

/// Converts a JSON object literal into tool arguments.
#[must_use]
pub fn args(value: Value) -> ToolArguments {
    value.as_object().cloned().unwrap_or_default()
}

/// Registers an HTTP server with the given tools.
///
/// # Panics
///
/// Panics when registration fails.
pub async fn register(harness: &Harness, raw_id: &str, tools: &[&str]) -> McpServerId {
    let id = server_id(raw_id);
    harness.factory.set_catalog(&id, catalog(tools));
    harness
        .manager
        .register_server(http_server(raw_id, &harness.clock))
        .await
        .expect("registration should succeed");
    id
}

/// Registers and connects an HTTP server with the given tools.
///
/// # Panics
///
/// Panics when registration or connection fails.
pub async fn connected(harness: &Harness, raw_id: &str, tools: &[&str]) -> McpServerId {
    let id = register(harness, raw_id, tools).await;
    let is_connected = harness
        .manager
        .connect_server(&id)
        .await
        .expect("connect should not error");
    assert!(is_connected, "server {raw_id} should connect");
    id
}
