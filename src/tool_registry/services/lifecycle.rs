//! Registration, connection lifecycle, and status reporting.

use super::{
    McpConnectionManager, McpManagerError, McpManagerResult,
    connection::ScopedConnection,
    manager::bounded,
    transport_plan::{auth_advisories, plan_transport},
};
use crate::tool_registry::{
    domain::{
        AuthAdvisory, CapabilitySet, ConnectionFailure, McpServerConfig, McpServerId,
        McpServerRecord, McpServerStatusSnapshot,
    },
    ports::{McpClientFactory, McpServerRegistryRepository, McpSession},
};
use futures::future::join_all;
use mockable::Clock;
use std::sync::Arc;
use tracing::{debug, info, warn};

impl<R, F, C> McpConnectionManager<R, F, C>
where
    R: McpServerRegistryRepository,
    F: McpClientFactory,
    C: Clock + Send + Sync,
{
    /// Registers or replaces a server configuration.
    ///
    /// Re-registering a known server keeps its runtime state. Weak or
    /// missing credentials are reported as advisories and logged, never
    /// rejected.
    ///
    /// # Errors
    ///
    /// Returns [`McpManagerError::Repository`] when persistence fails.
    #[tracing::instrument(skip_all, fields(server_id = %server.id()))]
    pub async fn register_server(
        &self,
        mut server: McpServerConfig,
    ) -> McpManagerResult<Vec<AuthAdvisory>> {
        let advisories = auth_advisories(&server, &self.settings.auth_headers);
        for advisory in &advisories {
            warn!(server_id = %server.id(), %advisory, "MCP server credentials look incomplete");
        }

        if let Some(previous) = self.repository.find_by_id(server.id()).await? {
            server.inherit_runtime_state(&previous);
        }
        self.repository.upsert(&server).await?;
        info!(
            server_id = %server.id(),
            transport = %server.transport().kind(),
            "registered MCP server"
        );
        Ok(advisories)
    }

    /// Validates a loosely typed record and registers it.
    ///
    /// # Errors
    ///
    /// Returns [`McpManagerError::Domain`] when the record is invalid, or
    /// [`McpManagerError::Repository`] when persistence fails.
    pub async fn register_record(
        &self,
        record: McpServerRecord,
    ) -> McpManagerResult<Vec<AuthAdvisory>> {
        let server = McpServerConfig::from_record(record, &*self.clock)?;
        self.register_server(server).await
    }

    /// Connects to a registered server, discovering its capabilities.
    ///
    /// Returns `true` when a live connection exists afterwards. Concurrent
    /// callers are serialised; callers that waited behind an attempt for the
    /// same server adopt its outcome instead of trying again.
    ///
    /// # Errors
    ///
    /// Returns [`McpManagerError::NotRegistered`] for an unknown server and
    /// repository errors. Connection failures are reported as `Ok(false)`
    /// with the reason recorded as the server's last error.
    #[tracing::instrument(skip_all, fields(server_id = %server_id))]
    pub async fn connect_server(&self, server_id: &McpServerId) -> McpManagerResult<bool> {
        let observed_epoch = self.attempt_epoch(server_id);
        let _connect_guard = self.connect_lock.lock().await;

        let server = self.load_server(server_id).await?;
        if self.connections.contains(server_id) {
            return Ok(true);
        }
        if let Some(connected) = self.outcome_since(server_id, observed_epoch) {
            debug!(server_id = %server_id, connected, "adopting concurrent connection outcome");
            return Ok(connected);
        }

        let connected = self.establish(&server).await?;
        self.record_outcome(server_id, connected);
        Ok(connected)
    }

    async fn establish(&self, server: &McpServerConfig) -> McpManagerResult<bool> {
        let server_id = server.id();
        self.update_server(server_id, |stored, clock| stored.mark_connecting(clock))
            .await?;

        let max_attempts = self.settings.max_connection_attempts.max(1);
        let mut attempt: u32 = 0;
        let failure = loop {
            attempt = attempt.saturating_add(1);
            match self.open_session(server).await {
                Ok(capabilities) => {
                    let counts = capabilities.counts();
                    self.store_capabilities(server_id, capabilities);
                    self.update_server(server_id, |stored, clock| {
                        stored.mark_connected(counts, clock)
                    })
                    .await?;
                    info!(
                        server_id = %server_id,
                        attempt,
                        tools = counts.tools,
                        resources = counts.resources,
                        prompts = counts.prompts,
                        "connected to MCP server"
                    );
                    return Ok(true);
                }
                Err(failure) if failure.is_transient() && attempt < max_attempts => {
                    let delay = self.retry.connection_delay(attempt);
                    warn!(
                        server_id = %server_id,
                        attempt,
                        ?delay,
                        error = %failure,
                        "MCP connection attempt failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(failure) => break failure,
            }
        };

        warn!(server_id = %server_id, attempt, error = %failure, "could not connect to MCP server");
        self.update_server(server_id, |stored, clock| {
            stored.mark_error(failure.message(), clock)
        })
        .await?;
        Ok(false)
    }

    /// Runs one connection attempt: plan, build, handshake, liveness, and
    /// discovery. The session is registered while the attempt runs and is
    /// released on every failure path, cancellation included.
    async fn open_session(&self, server: &McpServerConfig) -> Result<CapabilitySet, ConnectionFailure> {
        let name = server.name();
        let plan = plan_transport(server, &self.settings, &self.environment)
            .map_err(|err| ConnectionFailure::permanent(name, &err.to_string()))?;
        let connector = self
            .factory
            .build(server.id(), plan)
            .map_err(|err| ConnectionFailure::permanent(name, &err.to_string()))?;
        let session = bounded(self.settings.connection_timeout, "handshake", connector.connect())
            .await
            .map_err(|err| ConnectionFailure::from_class(name, err.classify(), &err.to_string()))?;

        let scoped = ScopedConnection::open(&self.connections, server.id().clone(), session);
        if let Err(failure) = self.verify_liveness(server, scoped.session()).await {
            scoped.release().await;
            return Err(failure);
        }

        let capabilities = self.discover(server.id(), scoped.session()).await;
        scoped.commit();
        Ok(capabilities)
    }

    /// Pings the session, falling back to a tool listing for servers that
    /// do not answer pings.
    async fn verify_liveness(
        &self,
        server: &McpServerConfig,
        session: &Arc<dyn McpSession>,
    ) -> Result<(), ConnectionFailure> {
        let limit = self.settings.ping_timeout;
        let Err(ping_error) = bounded(limit, "ping", session.ping()).await else {
            return Ok(());
        };
        debug!(
            server_id = %server.id(),
            error = %ping_error,
            "ping failed; probing with a tool listing"
        );

        bounded(limit, "tools/list", session.list_tools())
            .await
            .map(|_| ())
            .map_err(|err| {
                ConnectionFailure::from_class(server.name(), err.classify(), &err.to_string())
            })
    }

    /// Closes the live connection to a server and marks it inactive.
    ///
    /// Returns `false` only when the server is not registered. Cached
    /// capabilities are kept.
    #[tracing::instrument(skip_all, fields(server_id = %server_id))]
    pub async fn disconnect_server(&self, server_id: &McpServerId) -> bool {
        let _connect_guard = self.connect_lock.lock().await;
        self.release_connection(server_id).await;

        match self
            .update_server(server_id, |stored, clock| {
                stored.mark_inactive(clock);
                Ok(())
            })
            .await
        {
            Ok(_) => true,
            Err(McpManagerError::NotRegistered(_)) => false,
            Err(err) => {
                warn!(server_id = %server_id, error = %err, "could not record MCP disconnect");
                true
            }
        }
    }

    async fn release_connection(&self, server_id: &McpServerId) {
        let Some(session) = self.connections.remove(server_id) else {
            return;
        };
        if tokio::time::timeout(self.settings.ping_timeout, session.close())
            .await
            .is_err()
        {
            warn!(server_id = %server_id, "closing MCP session timed out");
        }
        info!(server_id = %server_id, "disconnected from MCP server");
    }

    /// Pings a connected server and records the result.
    ///
    /// Returns `false` without a live connection.
    #[tracing::instrument(skip_all, fields(server_id = %server_id))]
    pub async fn health_check(&self, server_id: &McpServerId) -> bool {
        let Some(session) = self.connections.get(server_id) else {
            return false;
        };

        let outcome = bounded(self.settings.ping_timeout, "ping", session.ping()).await;
        let healthy = outcome.is_ok();
        let recorded = match outcome {
            Ok(()) => {
                self.update_server(server_id, |stored, clock| stored.mark_healthy(clock))
                    .await
            }
            Err(err) => {
                warn!(server_id = %server_id, error = %err, "MCP health check failed");
                let message = format!("health check failed: {err}");
                self.update_server(server_id, |stored, clock| stored.mark_error(message, clock))
                    .await
            }
        };
        if let Err(err) = recorded {
            warn!(server_id = %server_id, error = %err, "could not record MCP health");
        }
        healthy
    }

    /// Returns a status projection for one server.
    ///
    /// # Errors
    ///
    /// Returns [`McpManagerError::NotRegistered`] for an unknown server and
    /// repository errors.
    pub async fn get_server_status(
        &self,
        server_id: &McpServerId,
    ) -> McpManagerResult<McpServerStatusSnapshot> {
        let server = self.load_server(server_id).await?;
        Ok(server.snapshot(self.connections.contains(server_id)))
    }

    /// Returns status projections for every registered server, ordered by
    /// identifier.
    ///
    /// # Errors
    ///
    /// Returns repository errors.
    pub async fn list_servers(&self) -> McpManagerResult<Vec<McpServerStatusSnapshot>> {
        let servers = self.repository.list_all().await?;
        Ok(servers
            .iter()
            .map(|server| server.snapshot(self.connections.contains(server.id())))
            .collect())
    }

    /// Closes every live connection and marks each server inactive.
    ///
    /// Returns the number of connections closed.
    #[tracing::instrument(skip_all)]
    pub async fn shutdown(&self) -> usize {
        let _connect_guard = self.connect_lock.lock().await;
        let sessions = self.connections.drain();
        let closed = sessions.len();

        join_all(sessions.into_iter().map(|(server_id, session)| async move {
            if tokio::time::timeout(self.settings.ping_timeout, session.close())
                .await
                .is_err()
            {
                warn!(server_id = %server_id, "closing MCP session timed out");
            }
            let recorded = self
                .update_server(&server_id, |stored, clock| {
                    stored.mark_inactive(clock);
                    Ok(())
                })
                .await;
            if let Err(err) = recorded {
                warn!(server_id = %server_id, error = %err, "could not record MCP disconnect");
            }
        }))
        .await;

        info!(closed, "MCP connection manager shut down");
        closed
    }
}
