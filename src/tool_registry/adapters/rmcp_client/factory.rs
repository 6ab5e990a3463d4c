//! Builds `rmcp` clients from transport plans.

use super::session::RmcpSession;
use crate::tool_registry::{
    domain::McpServerId,
    ports::{
        McpClientError, McpClientFactory, McpClientResult, McpConnector, McpSession, RemotePlan,
        StdioPlan, TransportPlan,
    },
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use rmcp::{
    ServiceExt,
    transport::{
        ConfigureCommandExt, StreamableHttpClientTransport, TokioChildProcess,
        streamable_http_client::StreamableHttpClientTransportConfig,
    },
};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

const DEFAULT_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Production [`McpClientFactory`] backed by the `rmcp` client.
///
/// HTTP and SSE plans both use the streamable HTTP client transport over a
/// `reqwest` client carrying the plan's headers; SSE plans additionally set
/// a per-read timeout for the long-lived event stream. STDIO plans spawn the
/// resolved executable with a fully specified environment.
#[derive(Debug, Clone)]
pub struct RmcpClientFactory {
    http_connect_timeout: Duration,
}

impl Default for RmcpClientFactory {
    fn default() -> Self {
        Self {
            http_connect_timeout: DEFAULT_HTTP_CONNECT_TIMEOUT,
        }
    }
}

impl RmcpClientFactory {
    /// Creates a factory with default HTTP settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the TCP connect timeout used by remote transports.
    #[must_use]
    pub const fn with_http_connect_timeout(mut self, timeout: Duration) -> Self {
        self.http_connect_timeout = timeout;
        self
    }

    fn http_client(&self, plan: &RemotePlan) -> McpClientResult<reqwest::Client> {
        let mut headers = HeaderMap::new();
        for (name, value) in &plan.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
                McpClientError::InvalidConfiguration(format!("header name '{name}': {err}"))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|err| {
                McpClientError::InvalidConfiguration(format!("header '{name}' value: {err}"))
            })?;
            headers.insert(header_name, header_value);
        }

        let builder = reqwest::Client::builder()
            .connect_timeout(self.http_connect_timeout)
            .default_headers(headers);
        let configured = match plan.read_timeout {
            Some(timeout) => builder.read_timeout(timeout),
            None => builder,
        };

        configured
            .build()
            .map_err(|err| McpClientError::InvalidConfiguration(format!("HTTP client: {err}")))
    }
}

impl McpClientFactory for RmcpClientFactory {
    fn build(
        &self,
        server_id: &McpServerId,
        plan: TransportPlan,
    ) -> McpClientResult<Box<dyn McpConnector>> {
        let connector = match plan {
            TransportPlan::Http(remote) | TransportPlan::Sse(remote) => RmcpConnector::Remote {
                client: self.http_client(&remote)?,
                url: remote.url,
            },
            TransportPlan::Stdio(stdio) => RmcpConnector::Stdio(stdio),
        };
        debug!(server_id = %server_id, "built MCP protocol client");
        Ok(Box::new(connector))
    }
}

enum RmcpConnector {
    Remote { client: reqwest::Client, url: String },
    Stdio(StdioPlan),
}

#[async_trait]
impl McpConnector for RmcpConnector {
    async fn connect(self: Box<Self>) -> McpClientResult<Arc<dyn McpSession>> {
        let running = match *self {
            Self::Remote { client, url } => {
                let transport = StreamableHttpClientTransport::with_client(
                    client,
                    StreamableHttpClientTransportConfig::with_uri(url),
                );
                ().serve(transport)
                    .await
                    .map_err(|err| McpClientError::Other(err.to_string()))?
            }
            Self::Stdio(plan) => {
                let command = Command::new(&plan.program).configure(|cmd| {
                    cmd.args(&plan.args)
                        .env_clear()
                        .envs(&plan.env)
                        .stderr(std::process::Stdio::inherit());
                    if let Some(directory) = &plan.working_directory {
                        cmd.current_dir(directory);
                    }
                });
                let transport = TokioChildProcess::new(command).map_err(|err| {
                    McpClientError::Connection(format!(
                        "failed to spawn '{}': {err}",
                        plan.program.display()
                    ))
                })?;
                ().serve(transport)
                    .await
                    .map_err(|err| McpClientError::Other(err.to_string()))?
            }
        };

        Ok(Arc::new(RmcpSession::new(running)))
    }
}
