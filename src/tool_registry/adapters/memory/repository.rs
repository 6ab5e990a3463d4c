//! In-memory repository for MCP server configurations.

use crate::tool_registry::{
    domain::{McpServerConfig, McpServerId},
    ports::{McpServerRegistryError, McpServerRegistryRepository, McpServerRegistryResult},
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Thread-safe in-memory MCP server registry repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMcpServerRegistry {
    state: Arc<RwLock<BTreeMap<McpServerId, McpServerConfig>>>,
}

impl InMemoryMcpServerRegistry {
    /// Creates an empty in-memory registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_poisoned(err: &impl ToString) -> McpServerRegistryError {
    McpServerRegistryError::persistence(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl McpServerRegistryRepository for InMemoryMcpServerRegistry {
    async fn upsert(&self, server: &McpServerConfig) -> McpServerRegistryResult<()> {
        let mut state = self.state.write().map_err(|err| lock_poisoned(&err))?;
        state.insert(server.id().clone(), server.clone());
        Ok(())
    }

    async fn update(&self, server: &McpServerConfig) -> McpServerRegistryResult<()> {
        let mut state = self.state.write().map_err(|err| lock_poisoned(&err))?;
        let stored = state
            .get_mut(server.id())
            .ok_or_else(|| McpServerRegistryError::NotFound(server.id().clone()))?;
        stored.clone_from(server);
        Ok(())
    }

    async fn find_by_id(
        &self,
        server_id: &McpServerId,
    ) -> McpServerRegistryResult<Option<McpServerConfig>> {
        let state = self.state.read().map_err(|err| lock_poisoned(&err))?;
        Ok(state.get(server_id).cloned())
    }

    async fn list_all(&self) -> McpServerRegistryResult<Vec<McpServerConfig>> {
        let state = self.state.read().map_err(|err| lock_poisoned(&err))?;
        Ok(state.values().cloned().collect())
    }
}
