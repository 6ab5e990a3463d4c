//! The connection manager and its shared state.

use super::{
    CircuitBreaker, McpManagerError, McpManagerResult, McpManagerSettings, ProcessEnvironment,
    RetryPolicy, ToolResultCache, connection::ConnectionTable,
};
use crate::tool_registry::{
    domain::{CapabilitySet, McpServerConfig, McpServerId, ToolRegistryDomainError},
    ports::{McpClientError, McpClientFactory, McpClientResult, McpServerRegistryRepository},
};
use dashmap::DashMap;
use mockable::Clock;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
struct AttemptRecord {
    epoch: u64,
    connected: bool,
}

/// Owns every live MCP connection along with the discovery cache, result
/// cache, and circuit state.
///
/// Lifecycle operations live in `lifecycle`, discovery queries in
/// `discovery`, and invocation in `invocation`. One instance is meant to be
/// shared behind an [`Arc`].
pub struct McpConnectionManager<R, F, C>
where
    R: McpServerRegistryRepository,
    F: McpClientFactory,
    C: Clock + Send + Sync,
{
    pub(super) repository: Arc<R>,
    pub(super) factory: Arc<F>,
    pub(super) clock: Arc<C>,
    pub(super) settings: McpManagerSettings,
    pub(super) retry: RetryPolicy,
    pub(super) environment: ProcessEnvironment,
    pub(super) connect_lock: tokio::sync::Mutex<()>,
    pub(super) connections: ConnectionTable,
    pub(super) capabilities: RwLock<BTreeMap<McpServerId, CapabilitySet>>,
    pub(super) cache: ToolResultCache,
    pub(super) circuits: CircuitBreaker,
    attempts: DashMap<McpServerId, AttemptRecord>,
}

impl<R, F, C> McpConnectionManager<R, F, C>
where
    R: McpServerRegistryRepository,
    F: McpClientFactory,
    C: Clock + Send + Sync,
{
    /// Creates a manager with default settings.
    #[must_use]
    pub fn new(repository: Arc<R>, factory: Arc<F>, clock: Arc<C>) -> Self {
        Self::with_settings(repository, factory, clock, McpManagerSettings::default())
    }

    /// Creates a manager with explicit settings.
    #[must_use]
    pub fn with_settings(
        repository: Arc<R>,
        factory: Arc<F>,
        clock: Arc<C>,
        settings: McpManagerSettings,
    ) -> Self {
        Self {
            repository,
            factory,
            clock,
            retry: RetryPolicy::from_settings(&settings),
            cache: ToolResultCache::new(settings.result_cache_ttl),
            circuits: CircuitBreaker::new(
                settings.circuit_failure_threshold,
                settings.circuit_cooldown,
            ),
            settings,
            environment: ProcessEnvironment::capture(),
            connect_lock: tokio::sync::Mutex::new(()),
            connections: ConnectionTable::default(),
            capabilities: RwLock::new(BTreeMap::new()),
            attempts: DashMap::new(),
        }
    }

    /// Replaces the environment STDIO servers inherit.
    #[must_use]
    pub fn with_environment(mut self, environment: ProcessEnvironment) -> Self {
        self.environment = environment;
        self
    }

    /// Returns the active settings.
    #[must_use]
    pub const fn settings(&self) -> &McpManagerSettings {
        &self.settings
    }

    /// Drops expired entries from the tool result cache and returns how
    /// many were removed.
    #[must_use = "the purge count reports how many results expired"]
    pub fn purge_expired_results(&self) -> usize {
        self.cache.purge_expired(self.clock.utc())
    }

    pub(super) async fn load_server(
        &self,
        server_id: &McpServerId,
    ) -> McpManagerResult<McpServerConfig> {
        self.repository
            .find_by_id(server_id)
            .await?
            .ok_or_else(|| McpManagerError::NotRegistered(server_id.clone()))
    }

    /// Applies a state change to the stored configuration and persists it.
    pub(super) async fn update_server(
        &self,
        server_id: &McpServerId,
        change: impl FnOnce(&mut McpServerConfig, &C) -> Result<(), ToolRegistryDomainError> + Send,
    ) -> McpManagerResult<McpServerConfig> {
        let mut server = self.load_server(server_id).await?;
        change(&mut server, &*self.clock)?;
        self.repository.update(&server).await?;
        Ok(server)
    }

    pub(super) fn attempt_epoch(&self, server_id: &McpServerId) -> u64 {
        self.attempts.get(server_id).map_or(0, |record| record.epoch)
    }

    /// Returns the outcome of an attempt sequence that finished after
    /// `observed_epoch` was read.
    pub(super) fn outcome_since(&self, server_id: &McpServerId, observed_epoch: u64) -> Option<bool> {
        self.attempts
            .get(server_id)
            .filter(|record| record.epoch != observed_epoch)
            .map(|record| record.connected)
    }

    pub(super) fn record_outcome(&self, server_id: &McpServerId, connected: bool) {
        let mut record = self
            .attempts
            .entry(server_id.clone())
            .or_insert(AttemptRecord {
                epoch: 0,
                connected,
            });
        record.epoch = record.epoch.wrapping_add(1);
        record.connected = connected;
    }
}

/// Bounds a protocol call, turning an elapsed deadline into
/// [`McpClientError::Timeout`].
pub(super) async fn bounded<T>(
    limit: Duration,
    operation: &str,
    call: impl Future<Output = McpClientResult<T>> + Send,
) -> McpClientResult<T> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or_else(|_elapsed| {
            Err(McpClientError::Timeout(format!(
                "{operation} timed out after {limit:?}"
            )))
        })
}
