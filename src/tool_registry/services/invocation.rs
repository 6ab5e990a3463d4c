//! Tool invocation pipeline: cache, circuit, connection, retry.

use super::{
    CacheKey, CircuitDecision, McpConnectionManager, McpManagerError, McpManagerResult,
    manager::bounded,
};
use crate::tool_registry::{
    domain::{
        FailureClass, McpServerConfig, McpServerId, PromptOutput, ResourceReadOutput, ToolArguments,
        ToolCallOutput,
    },
    ports::{McpClientError, McpClientFactory, McpClientResult, McpServerRegistryRepository, McpSession},
};
use mockable::Clock;
use std::sync::Arc;
use tracing::{debug, info, warn};

impl<R, F, C> McpConnectionManager<R, F, C>
where
    R: McpServerRegistryRepository,
    F: McpClientFactory,
    C: Clock + Send + Sync,
{
    /// Invokes a tool.
    ///
    /// A fresh cached result is returned without contacting the server.
    /// Otherwise the tool's circuit is consulted, the server connected on
    /// demand, and the call retried according to how it failed:
    /// authentication, not-found, and tool-logic failures return at once;
    /// rate limits, timeouts, and broken connections are retried with
    /// back-off, reconnecting after a broken connection.
    ///
    /// # Errors
    ///
    /// Returns [`McpManagerError::CircuitOpen`] when the tool failed too
    /// often recently, [`McpManagerError::NotConnected`] when no connection
    /// can be established, and the classified invocation errors
    /// ([`McpManagerError::Unauthorized`], [`McpManagerError::NotFound`],
    /// [`McpManagerError::ToolFailed`], [`McpManagerError::RetriesExhausted`],
    /// [`McpManagerError::Failed`]).
    #[tracing::instrument(skip_all, fields(server_id = %server_id, tool = tool_name))]
    pub async fn call_tool(
        &self,
        server_id: &McpServerId,
        tool_name: &str,
        arguments: ToolArguments,
    ) -> McpManagerResult<ToolCallOutput> {
        let key = CacheKey::new(server_id, tool_name, &arguments);
        if let Some(cached) = self.cache.get(&key, self.clock.utc()) {
            debug!(server_id = %server_id, tool = tool_name, "serving cached tool result");
            return Ok(cached);
        }

        let server = self.load_server(server_id).await?;
        match self.circuits.check(server_id, tool_name, self.clock.utc()) {
            CircuitDecision::Open { failures } => {
                return Err(McpManagerError::CircuitOpen {
                    server_id: server_id.clone(),
                    server_name: server.name().to_owned(),
                    tool: tool_name.to_owned(),
                    failures,
                });
            }
            CircuitDecision::HalfOpen => {
                info!(server_id = %server_id, tool = tool_name, "circuit cooled down; trying tool again");
            }
            CircuitDecision::Closed => {}
        }

        self.ensure_connected(&server).await?;
        let output = self.invoke_with_retry(&server, tool_name, &arguments).await?;

        self.cache.insert(key, output.clone(), self.clock.utc());
        self.circuits.record_success(server_id, tool_name);
        Ok(output)
    }

    async fn invoke_with_retry(
        &self,
        server: &McpServerConfig,
        tool_name: &str,
        arguments: &ToolArguments,
    ) -> McpManagerResult<ToolCallOutput> {
        let server_id = server.id();
        let max_attempts = self.settings.tool_call_max_attempts.max(1);
        let mut attempt: u32 = 1;

        loop {
            let error = match self.attempt_call(server, tool_name, arguments.clone()).await {
                Ok(output) => return Ok(output),
                Err(error) => error,
            };

            let class = error.classify();
            match class {
                FailureClass::Authentication | FailureClass::NotFound | FailureClass::ToolLogic => {
                    return Err(classified_error(server, tool_name, error));
                }
                FailureClass::Generic => {
                    self.circuits
                        .record_failure(server_id, tool_name, self.clock.utc());
                    return Err(classified_error(server, tool_name, error));
                }
                FailureClass::RateLimited { .. } | FailureClass::Timeout | FailureClass::Transport => {}
            }

            let retry_delay = self
                .retry
                .tool_delay(class, attempt)
                .filter(|_| attempt < max_attempts);
            let Some(delay) = retry_delay else {
                let failures = self
                    .circuits
                    .record_failure(server_id, tool_name, self.clock.utc());
                warn!(
                    server_id = %server_id,
                    tool = tool_name,
                    attempt,
                    failures,
                    kind = %class.kind(),
                    error = %error,
                    "MCP tool call failed after retries"
                );
                return Err(McpManagerError::RetriesExhausted {
                    server_id: server_id.clone(),
                    server_name: server.name().to_owned(),
                    operation: tool_name.to_owned(),
                    kind: class.kind(),
                    attempts: attempt,
                    source: Box::new(error),
                });
            };

            info!(
                server_id = %server_id,
                tool = tool_name,
                attempt,
                kind = %class.kind(),
                ?delay,
                error = %error,
                "retrying MCP tool call"
            );
            if class == FailureClass::Transport {
                self.disconnect_server(server_id).await;
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt = attempt.saturating_add(1);
        }
    }

    /// One call against the live session, reconnecting first when the
    /// session was dropped by an earlier transport failure.
    async fn attempt_call(
        &self,
        server: &McpServerConfig,
        tool_name: &str,
        arguments: ToolArguments,
    ) -> McpClientResult<ToolCallOutput> {
        let session = self.reconnected_session(server).await?;
        bounded(
            self.settings.tool_execution_timeout,
            "tool call",
            session.call_tool(tool_name, arguments),
        )
        .await
    }

    async fn reconnected_session(
        &self,
        server: &McpServerConfig,
    ) -> McpClientResult<Arc<dyn McpSession>> {
        if let Some(session) = self.connections.get(server.id()) {
            return Ok(session);
        }

        let reconnected = self
            .connect_server(server.id())
            .await
            .map_err(|err| McpClientError::Connection(err.to_string()))?;
        self.connections
            .get(server.id())
            .filter(|_| reconnected)
            .ok_or_else(|| {
                McpClientError::Connection(format!(
                    "reconnecting to MCP server '{}' failed",
                    server.name()
                ))
            })
    }

    async fn ensure_connected(&self, server: &McpServerConfig) -> McpManagerResult<()> {
        if self.connections.contains(server.id()) || self.connect_server(server.id()).await? {
            return Ok(());
        }

        let latest = self.load_server(server.id()).await?;
        Err(McpManagerError::NotConnected {
            server_id: server.id().clone(),
            server_name: server.name().to_owned(),
            reason: latest
                .last_error()
                .unwrap_or("connection could not be established")
                .to_owned(),
        })
    }

    /// Reads a resource from a server in a single attempt.
    ///
    /// # Errors
    ///
    /// Returns [`McpManagerError::NotConnected`] when no connection can be
    /// established, or the classified error of the read.
    #[tracing::instrument(skip_all, fields(server_id = %server_id, uri))]
    pub async fn read_resource(
        &self,
        server_id: &McpServerId,
        uri: &str,
    ) -> McpManagerResult<ResourceReadOutput> {
        let server = self.load_server(server_id).await?;
        self.ensure_connected(&server).await?;
        let outcome = match self.connections.get(server_id) {
            Some(session) => {
                bounded(
                    self.settings.tool_execution_timeout,
                    "resource read",
                    session.read_resource(uri),
                )
                .await
            }
            None => Err(McpClientError::Connection("session closed".to_owned())),
        };
        self.single_shot(&server, uri, outcome).await
    }

    /// Renders a prompt on a server in a single attempt.
    ///
    /// # Errors
    ///
    /// Returns [`McpManagerError::NotConnected`] when no connection can be
    /// established, or the classified error of the request.
    #[tracing::instrument(skip_all, fields(server_id = %server_id, prompt = name))]
    pub async fn get_prompt(
        &self,
        server_id: &McpServerId,
        name: &str,
        arguments: ToolArguments,
    ) -> McpManagerResult<PromptOutput> {
        let server = self.load_server(server_id).await?;
        self.ensure_connected(&server).await?;
        let outcome = match self.connections.get(server_id) {
            Some(session) => {
                bounded(
                    self.settings.tool_execution_timeout,
                    "prompt request",
                    session.get_prompt(name, arguments),
                )
                .await
            }
            None => Err(McpClientError::Connection("session closed".to_owned())),
        };
        self.single_shot(&server, name, outcome).await
    }

    /// Classifies a single-attempt outcome, dropping the connection when it
    /// broke so the next request reconnects.
    async fn single_shot<T: Send>(
        &self,
        server: &McpServerConfig,
        operation: &str,
        outcome: McpClientResult<T>,
    ) -> McpManagerResult<T> {
        let error = match outcome {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        if error.classify() == FailureClass::Transport {
            self.disconnect_server(server.id()).await;
        }
        Err(classified_error(server, operation, error))
    }
}

/// Maps a client error onto the manager taxonomy without retry context.
fn classified_error(
    server: &McpServerConfig,
    operation: &str,
    error: McpClientError,
) -> McpManagerError {
    let server_id = server.id().clone();
    let server_name = server.name().to_owned();
    let operation_name = operation.to_owned();
    let class = error.classify();
    let source = Box::new(error);
    match class {
        FailureClass::Authentication => McpManagerError::Unauthorized {
            server_id,
            server_name,
            operation: operation_name,
            source,
        },
        FailureClass::NotFound => McpManagerError::NotFound {
            server_id,
            server_name,
            operation: operation_name,
            source,
        },
        FailureClass::ToolLogic => McpManagerError::ToolFailed {
            server_id,
            server_name,
            tool: operation_name,
            source,
        },
        FailureClass::RateLimited { .. }
        | FailureClass::Timeout
        | FailureClass::Transport
        | FailureClass::Generic => McpManagerError::Failed {
            server_id,
            server_name,
            operation: operation_name,
            source,
        },
    }
}
