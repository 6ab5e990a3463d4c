//! Capability discovery and the cached capability views.

use super::{McpConnectionManager, McpManagerError, McpManagerResult, manager::bounded};
use crate::tool_registry::{
    domain::{
        CapabilitySet, McpPromptDefinition, McpResourceDefinition, McpServerId,
        McpToolDefinition, NamedCapability, ServerScoped, ToolArguments, ToolCallOutput,
    },
    ports::{McpClientFactory, McpClientResult, McpServerRegistryRepository, McpSession},
};
use mockable::Clock;
use std::sync::{Arc, PoisonError};
use tracing::{debug, warn};

impl<R, F, C> McpConnectionManager<R, F, C>
where
    R: McpServerRegistryRepository,
    F: McpClientFactory,
    C: Clock + Send + Sync,
{
    /// Lists tools, resources, and prompts on an open session.
    ///
    /// A failed tool listing yields no tools; resource and prompt listings
    /// run concurrently and default to empty on failure. Nothing here fails
    /// the connection.
    pub(super) async fn discover(
        &self,
        server_id: &McpServerId,
        session: &Arc<dyn McpSession>,
    ) -> CapabilitySet {
        let limit = self.settings.ping_timeout;
        let tools = bounded(limit, "tools/list", session.list_tools())
            .await
            .unwrap_or_else(|err| {
                warn!(server_id = %server_id, error = %err, "MCP tool discovery failed");
                Vec::new()
            });

        let (resources, prompts) = tokio::join!(
            bounded(limit, "resources/list", session.list_resources()),
            bounded(limit, "prompts/list", session.list_prompts()),
        );

        CapabilitySet {
            tools,
            resources: best_effort(server_id, "resources", resources),
            prompts: best_effort(server_id, "prompts", prompts),
        }
    }

    pub(super) fn store_capabilities(&self, server_id: &McpServerId, capabilities: CapabilitySet) {
        self.capabilities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(server_id.clone(), capabilities);
    }

    /// Returns discovered tools.
    ///
    /// With a server identifier, an empty cache triggers one on-demand
    /// connection attempt; unreachable servers yield an empty list. Without
    /// one, the union across all servers is returned, ordered by server.
    ///
    /// # Errors
    ///
    /// Returns [`McpManagerError::NotRegistered`] for an unknown server and
    /// repository errors.
    pub async fn get_tools(
        &self,
        server_id: Option<&McpServerId>,
    ) -> McpManagerResult<Vec<ServerScoped<McpToolDefinition>>> {
        self.scoped_capabilities(server_id, tools_of)
            .await
    }

    /// Returns discovered resources. See [`Self::get_tools`].
    ///
    /// # Errors
    ///
    /// Returns [`McpManagerError::NotRegistered`] for an unknown server and
    /// repository errors.
    pub async fn get_resources(
        &self,
        server_id: Option<&McpServerId>,
    ) -> McpManagerResult<Vec<ServerScoped<McpResourceDefinition>>> {
        self.scoped_capabilities(server_id, resources_of)
            .await
    }

    /// Returns discovered prompts. See [`Self::get_tools`].
    ///
    /// # Errors
    ///
    /// Returns [`McpManagerError::NotRegistered`] for an unknown server and
    /// repository errors.
    pub async fn get_prompts(
        &self,
        server_id: Option<&McpServerId>,
    ) -> McpManagerResult<Vec<ServerScoped<McpPromptDefinition>>> {
        self.scoped_capabilities(server_id, prompts_of)
            .await
    }

    async fn scoped_capabilities<T>(
        &self,
        server_id: Option<&McpServerId>,
        select: impl Fn(&CapabilitySet) -> &[T] + Send,
    ) -> McpManagerResult<Vec<ServerScoped<T>>>
    where
        T: NamedCapability + Clone + Send,
    {
        let Some(requested) = server_id else {
            return Ok(self.collect_scoped(None, &select));
        };

        if self.collect_scoped(Some(requested), &select).is_empty() {
            debug!(server_id = %requested, "no cached capabilities; connecting on demand");
            self.connect_server(requested).await?;
        }
        Ok(self.collect_scoped(Some(requested), &select))
    }

    fn collect_scoped<T>(
        &self,
        server_id: Option<&McpServerId>,
        select: &impl Fn(&CapabilitySet) -> &[T],
    ) -> Vec<ServerScoped<T>>
    where
        T: NamedCapability + Clone,
    {
        let capabilities = self
            .capabilities
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        capabilities
            .iter()
            .filter(|(id, _)| server_id.is_none_or(|requested| requested == *id))
            .flat_map(|(id, set)| {
                select(set)
                    .iter()
                    .map(|item| ServerScoped::new(id.clone(), item.clone()))
            })
            .collect()
    }

    /// Calls a tool by its qualified name (`"{server_id}__{tool}"`).
    ///
    /// # Errors
    ///
    /// Returns [`McpManagerError::UnknownQualifiedTool`] when no discovered
    /// tool carries the name, otherwise the errors of
    /// [`Self::call_tool`].
    pub async fn call_qualified_tool(
        &self,
        qualified_name: &str,
        arguments: ToolArguments,
    ) -> McpManagerResult<ToolCallOutput> {
        let target = self
            .collect_scoped(None, &tools_of)
            .into_iter()
            .find(|tool| tool.qualified_name == qualified_name)
            .ok_or_else(|| McpManagerError::UnknownQualifiedTool(qualified_name.to_owned()))?;

        self.call_tool(&target.server_id, target.item.name(), arguments)
            .await
    }
}

fn tools_of(set: &CapabilitySet) -> &[McpToolDefinition] {
    &set.tools
}

fn resources_of(set: &CapabilitySet) -> &[McpResourceDefinition] {
    &set.resources
}

fn prompts_of(set: &CapabilitySet) -> &[McpPromptDefinition] {
    &set.prompts
}

fn best_effort<T>(server_id: &McpServerId, listing: &str, outcome: McpClientResult<Vec<T>>) -> Vec<T> {
    outcome.unwrap_or_else(|err| {
        debug!(server_id = %server_id, listing, error = %err, "optional MCP discovery failed");
        Vec::new()
    })
}
