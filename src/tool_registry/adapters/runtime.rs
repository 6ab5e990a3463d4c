//! In-memory protocol client adapter for connection manager tests.

use crate::tool_registry::{
    domain::{
        CapabilitySet, McpPromptDefinition, McpResourceDefinition, McpServerId,
        McpToolDefinition, PromptOutput, ResourceReadOutput, ToolArguments, ToolCallOutput,
    },
    ports::{
        McpClientError, McpClientFactory, McpClientResult, McpConnector, McpSession,
        TransportPlan,
    },
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Capability listing that can be scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListingKind {
    /// `tools/list`.
    Tools,
    /// `resources/list`.
    Resources,
    /// `prompts/list`.
    Prompts,
}

/// Per-server call counters recorded by [`InMemoryMcpClientFactory`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FakeServerStats {
    /// Calls to [`McpClientFactory::build`].
    pub builds: usize,
    /// Successful handshakes.
    pub connects: usize,
    /// Pings received.
    pub pings: usize,
    /// Tool listings received.
    pub tool_listings: usize,
    /// Tool calls received.
    pub tool_calls: usize,
    /// Sessions closed.
    pub closes: usize,
}

/// In-memory MCP client factory.
///
/// This adapter models MCP servers without network access or child
/// processes. Catalogs, failures, and tool results are scripted per server,
/// and every interaction is counted so tests can assert on transport
/// contact.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMcpClientFactory {
    state: Arc<Mutex<FakeState>>,
}

#[derive(Debug, Default)]
struct FakeState {
    catalogs: HashMap<McpServerId, CapabilitySet>,
    build_failures: HashMap<McpServerId, McpClientError>,
    connect_failures: HashMap<McpServerId, VecDeque<McpClientError>>,
    ping_failures: HashMap<McpServerId, McpClientError>,
    listing_failures: HashMap<(McpServerId, ListingKind), McpClientError>,
    tool_outcomes: HashMap<(McpServerId, String), VecDeque<McpClientResult<ToolCallOutput>>>,
    hanging_tools: HashSet<(McpServerId, String)>,
    connect_delay: Option<Duration>,
    plans: HashMap<McpServerId, TransportPlan>,
    sessions: HashMap<McpServerId, Vec<Arc<AtomicBool>>>,
    stats: HashMap<McpServerId, FakeServerStats>,
}

impl FakeState {
    fn stats_mut(&mut self, server_id: &McpServerId) -> &mut FakeServerStats {
        self.stats.entry(server_id.clone()).or_default()
    }
}

impl InMemoryMcpClientFactory {
    /// Creates a factory with no scripted servers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the capabilities a server advertises.
    pub fn set_catalog(&self, server_id: &McpServerId, catalog: CapabilitySet) {
        self.lock().catalogs.insert(server_id.clone(), catalog);
    }

    /// Makes every build for a server fail.
    pub fn fail_builds(&self, server_id: &McpServerId, error: McpClientError) {
        self.lock().build_failures.insert(server_id.clone(), error);
    }

    /// Queues handshake failures consumed by the next connection attempts.
    pub fn fail_next_connects(
        &self,
        server_id: &McpServerId,
        errors: impl IntoIterator<Item = McpClientError>,
    ) {
        self.lock()
            .connect_failures
            .entry(server_id.clone())
            .or_default()
            .extend(errors);
    }

    /// Sets or clears a ping failure for a server.
    pub fn set_ping_failure(&self, server_id: &McpServerId, error: Option<McpClientError>) {
        let mut state = self.lock();
        match error {
            Some(failure) => state.ping_failures.insert(server_id.clone(), failure),
            None => state.ping_failures.remove(server_id),
        };
    }

    /// Makes a capability listing fail for a server.
    pub fn fail_listing(&self, server_id: &McpServerId, kind: ListingKind, error: McpClientError) {
        self.lock()
            .listing_failures
            .insert((server_id.clone(), kind), error);
    }

    /// Queues results returned by subsequent calls to a tool.
    ///
    /// Once the queue is drained the tool answers with a text block naming
    /// the tool and echoes its arguments as structured content.
    pub fn script_tool_results(
        &self,
        server_id: &McpServerId,
        tool: &str,
        outcomes: impl IntoIterator<Item = McpClientResult<ToolCallOutput>>,
    ) {
        self.lock()
            .tool_outcomes
            .entry((server_id.clone(), tool.to_owned()))
            .or_default()
            .extend(outcomes);
    }

    /// Makes calls to a tool never return.
    pub fn hang_tool(&self, server_id: &McpServerId, tool: &str) {
        self.lock()
            .hanging_tools
            .insert((server_id.clone(), tool.to_owned()));
    }

    /// Delays every handshake.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.lock().connect_delay = Some(delay);
    }

    /// Breaks every live session of a server as if the peer reset it.
    pub fn reset_connections(&self, server_id: &McpServerId) {
        if let Some(flags) = self.lock().sessions.get(server_id) {
            for flag in flags {
                flag.store(true, Ordering::SeqCst);
            }
        }
    }

    /// Returns interaction counters for a server.
    #[must_use]
    pub fn stats(&self, server_id: &McpServerId) -> FakeServerStats {
        self.lock().stats.get(server_id).copied().unwrap_or_default()
    }

    /// Returns the number of sessions that are open and not reset.
    #[must_use]
    pub fn open_sessions(&self, server_id: &McpServerId) -> usize {
        self.lock().sessions.get(server_id).map_or(0, |flags| {
            flags
                .iter()
                .filter(|flag| !flag.load(Ordering::SeqCst))
                .count()
        })
    }

    /// Returns the most recent transport plan built for a server.
    #[must_use]
    pub fn last_plan(&self, server_id: &McpServerId) -> Option<TransportPlan> {
        self.lock().plans.get(server_id).cloned()
    }
}

impl McpClientFactory for InMemoryMcpClientFactory {
    fn build(
        &self,
        server_id: &McpServerId,
        plan: TransportPlan,
    ) -> McpClientResult<Box<dyn McpConnector>> {
        let mut state = self.lock();
        state.stats_mut(server_id).builds += 1;
        state.plans.insert(server_id.clone(), plan);
        if let Some(error) = state.build_failures.get(server_id) {
            return Err(error.clone());
        }

        Ok(Box::new(InMemoryConnector {
            factory: self.clone(),
            server_id: server_id.clone(),
        }))
    }
}

struct InMemoryConnector {
    factory: InMemoryMcpClientFactory,
    server_id: McpServerId,
}

#[async_trait]
impl McpConnector for InMemoryConnector {
    async fn connect(self: Box<Self>) -> McpClientResult<Arc<dyn McpSession>> {
        let delay = self.factory.lock().connect_delay;
        if let Some(duration) = delay {
            tokio::time::sleep(duration).await;
        }

        let mut state = self.factory.lock();
        let scripted_failure = state
            .connect_failures
            .get_mut(&self.server_id)
            .and_then(VecDeque::pop_front);
        if let Some(error) = scripted_failure {
            return Err(error);
        }

        let closed = Arc::new(AtomicBool::new(false));
        state
            .sessions
            .entry(self.server_id.clone())
            .or_default()
            .push(Arc::clone(&closed));
        state.stats_mut(&self.server_id).connects += 1;
        drop(state);

        Ok(Arc::new(InMemorySession {
            factory: self.factory,
            server_id: self.server_id,
            closed,
        }))
    }
}

struct InMemorySession {
    factory: InMemoryMcpClientFactory,
    server_id: McpServerId,
    closed: Arc<AtomicBool>,
}

impl InMemorySession {
    fn ensure_open(&self) -> McpClientResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpClientError::Connection(
                "connection reset by peer".to_owned(),
            ));
        }
        Ok(())
    }

    fn listing<T: Clone>(
        &self,
        kind: ListingKind,
        select: impl FnOnce(&CapabilitySet) -> &Vec<T>,
    ) -> McpClientResult<Vec<T>> {
        self.ensure_open()?;
        let mut state = self.factory.lock();
        if kind == ListingKind::Tools {
            state.stats_mut(&self.server_id).tool_listings += 1;
        }
        if let Some(error) = state.listing_failures.get(&(self.server_id.clone(), kind)) {
            return Err(error.clone());
        }
        Ok(state
            .catalogs
            .get(&self.server_id)
            .map(|catalog| select(catalog).clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl McpSession for InMemorySession {
    async fn ping(&self) -> McpClientResult<()> {
        self.ensure_open()?;
        let mut state = self.factory.lock();
        state.stats_mut(&self.server_id).pings += 1;
        state
            .ping_failures
            .get(&self.server_id)
            .cloned()
            .map_or(Ok(()), Err)
    }

    async fn list_tools(&self) -> McpClientResult<Vec<McpToolDefinition>> {
        self.listing(ListingKind::Tools, |catalog| &catalog.tools)
    }

    async fn list_resources(&self) -> McpClientResult<Vec<McpResourceDefinition>> {
        self.listing(ListingKind::Resources, |catalog| &catalog.resources)
    }

    async fn list_prompts(&self) -> McpClientResult<Vec<McpPromptDefinition>> {
        self.listing(ListingKind::Prompts, |catalog| &catalog.prompts)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: ToolArguments,
    ) -> McpClientResult<ToolCallOutput> {
        self.ensure_open()?;
        let key = (self.server_id.clone(), name.to_owned());
        let (hangs, scripted) = {
            let mut state = self.factory.lock();
            state.stats_mut(&self.server_id).tool_calls += 1;
            let hangs = state.hanging_tools.contains(&key);
            let scripted = state
                .tool_outcomes
                .get_mut(&key)
                .and_then(VecDeque::pop_front);
            (hangs, scripted)
        };

        if hangs {
            std::future::pending::<()>().await;
        }

        scripted.unwrap_or_else(|| {
            Ok(ToolCallOutput {
                structured_content: Some(Value::Object(arguments)),
                ..ToolCallOutput::text(format!("{name} ok"))
            })
        })
    }

    async fn read_resource(&self, uri: &str) -> McpClientResult<ResourceReadOutput> {
        self.ensure_open()?;
        let known = self
            .factory
            .lock()
            .catalogs
            .get(&self.server_id)
            .is_some_and(|catalog| catalog.resources.iter().any(|resource| resource.uri() == uri));
        if !known {
            return Err(McpClientError::Server {
                code: -32002,
                message: format!("resource not found: {uri}"),
            });
        }

        Ok(ResourceReadOutput {
            uri: uri.to_owned(),
            contents: vec![serde_json::json!({"uri": uri, "text": format!("contents of {uri}")})],
        })
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: ToolArguments,
    ) -> McpClientResult<PromptOutput> {
        self.ensure_open()?;
        let prompt = self
            .factory
            .lock()
            .catalogs
            .get(&self.server_id)
            .and_then(|catalog| catalog.prompts.iter().find(|prompt| prompt.name() == name))
            .cloned()
            .ok_or_else(|| McpClientError::Server {
                code: -32602,
                message: format!("prompt not found: {name}"),
            })?;

        Ok(PromptOutput {
            description: prompt.description().map(str::to_owned),
            messages: vec![serde_json::json!({
                "role": "user",
                "content": {"type": "text", "text": name},
                "arguments": Value::Object(arguments),
            })],
        })
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.factory.lock().stats_mut(&self.server_id).closes += 1;
        }
    }
}
