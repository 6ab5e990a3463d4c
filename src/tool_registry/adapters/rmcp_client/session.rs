//! Live `rmcp` client session.

use crate::tool_registry::{
    domain::{
        McpPromptArgument, McpPromptDefinition, McpResourceDefinition, McpToolDefinition,
        PromptOutput, ResourceReadOutput, ToolArguments, ToolCallOutput,
    },
    ports::{McpClientError, McpClientResult, McpSession},
};
use async_trait::async_trait;
use rmcp::{
    RoleClient,
    model::{
        CallToolRequestParam, ClientRequest, GetPromptRequestParam, PingRequest, Prompt,
        ReadResourceRequestParam, Resource, Tool,
    },
    service::{Peer, RunningService, ServiceError},
};
use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Session over a running `rmcp` client service.
pub struct RmcpSession {
    peer: Peer<RoleClient>,
    running: Mutex<Option<RunningService<RoleClient, ()>>>,
}

impl RmcpSession {
    pub(super) fn new(running: RunningService<RoleClient, ()>) -> Self {
        Self {
            peer: running.peer().clone(),
            running: Mutex::new(Some(running)),
        }
    }
}

fn client_error(err: ServiceError) -> McpClientError {
    match err {
        ServiceError::McpError(data) => McpClientError::Server {
            code: data.code.0,
            message: data.message.to_string(),
        },
        ServiceError::Timeout { timeout } => {
            McpClientError::Timeout(format!("request exceeded {timeout:?}"))
        }
        ServiceError::TransportClosed => {
            McpClientError::Connection("transport closed".to_owned())
        }
        other => McpClientError::Other(other.to_string()),
    }
}

fn to_json_values<T: Serialize>(items: &[T]) -> Vec<Value> {
    items
        .iter()
        .filter_map(|item| serde_json::to_value(item).ok())
        .collect()
}

fn text_of(content: &[Value]) -> String {
    let parts: Vec<&str> = content
        .iter()
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect();
    if parts.is_empty() {
        "tool returned an error result".to_owned()
    } else {
        parts.join("\n")
    }
}

fn tool_definition(tool: Tool) -> Option<McpToolDefinition> {
    let schema = Value::Object((*tool.input_schema).clone());
    let description = tool.description.map(Cow::into_owned).unwrap_or_default();
    McpToolDefinition::new(tool.name.into_owned(), description, schema)
        .inspect_err(|err| warn!(error = %err, "skipping invalid tool definition"))
        .ok()
}

fn resource_definition(resource: Resource) -> Option<McpResourceDefinition> {
    let raw = resource.raw;
    McpResourceDefinition::new(raw.uri, raw.name)
        .map(|definition| {
            definition
                .with_description(raw.description)
                .with_mime_type(raw.mime_type)
        })
        .inspect_err(|err| warn!(error = %err, "skipping invalid resource definition"))
        .ok()
}

fn prompt_definition(prompt: Prompt) -> Option<McpPromptDefinition> {
    let arguments = prompt
        .arguments
        .unwrap_or_default()
        .into_iter()
        .map(|argument| McpPromptArgument {
            name: argument.name,
            description: argument.description,
            required: argument.required.unwrap_or(false),
        })
        .collect();
    McpPromptDefinition::new(prompt.name, prompt.description, arguments)
        .inspect_err(|err| warn!(error = %err, "skipping invalid prompt definition"))
        .ok()
}

#[async_trait]
impl McpSession for RmcpSession {
    async fn ping(&self) -> McpClientResult<()> {
        self.peer
            .send_request(ClientRequest::PingRequest(PingRequest::default()))
            .await
            .map(|_| ())
            .map_err(client_error)
    }

    async fn list_tools(&self) -> McpClientResult<Vec<McpToolDefinition>> {
        let tools = self.peer.list_all_tools().await.map_err(client_error)?;
        Ok(tools.into_iter().filter_map(tool_definition).collect())
    }

    async fn list_resources(&self) -> McpClientResult<Vec<McpResourceDefinition>> {
        let resources = self.peer.list_all_resources().await.map_err(client_error)?;
        Ok(resources.into_iter().filter_map(resource_definition).collect())
    }

    async fn list_prompts(&self) -> McpClientResult<Vec<McpPromptDefinition>> {
        let prompts = self.peer.list_all_prompts().await.map_err(client_error)?;
        Ok(prompts.into_iter().filter_map(prompt_definition).collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: ToolArguments,
    ) -> McpClientResult<ToolCallOutput> {
        let result = self
            .peer
            .call_tool(CallToolRequestParam {
                name: Cow::Owned(name.to_owned()),
                arguments: Some(arguments),
            })
            .await
            .map_err(client_error)?;

        let content = to_json_values(&result.content);
        if result.is_error == Some(true) {
            return Err(McpClientError::ToolReported {
                message: text_of(&content),
            });
        }

        Ok(ToolCallOutput {
            content,
            structured_content: result.structured_content,
        })
    }

    async fn read_resource(&self, uri: &str) -> McpClientResult<ResourceReadOutput> {
        let result = self
            .peer
            .read_resource(ReadResourceRequestParam {
                uri: uri.to_owned(),
            })
            .await
            .map_err(client_error)?;

        Ok(ResourceReadOutput {
            uri: uri.to_owned(),
            contents: to_json_values(&result.contents),
        })
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: ToolArguments,
    ) -> McpClientResult<PromptOutput> {
        let result = self
            .peer
            .get_prompt(GetPromptRequestParam {
                name: name.to_owned(),
                arguments: Some(arguments),
            })
            .await
            .map_err(client_error)?;

        Ok(PromptOutput {
            description: result.description,
            messages: to_json_values(&result.messages),
        })
    }

    async fn close(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        match running.cancel().await {
            Ok(reason) => debug!(?reason, "MCP client session closed"),
            Err(err) => warn!(error = %err, "MCP client session did not shut down cleanly"),
        }
    }
}
