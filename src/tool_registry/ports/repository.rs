//! Repository port for MCP server configuration records.

use crate::tool_registry::domain::{McpServerConfig, McpServerId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for MCP server registry operations.
pub type McpServerRegistryResult<T> = Result<T, McpServerRegistryError>;

/// Storage contract for MCP server configurations and their runtime state.
#[async_trait]
pub trait McpServerRegistryRepository: Send + Sync {
    /// Inserts a configuration or replaces the one with the same identifier.
    async fn upsert(&self, server: &McpServerConfig) -> McpServerRegistryResult<()>;

    /// Persists updates to an existing configuration.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerRegistryError::NotFound`] when the server does not
    /// exist.
    async fn update(&self, server: &McpServerConfig) -> McpServerRegistryResult<()>;

    /// Finds a configuration by identifier.
    async fn find_by_id(
        &self,
        server_id: &McpServerId,
    ) -> McpServerRegistryResult<Option<McpServerConfig>>;

    /// Returns all configurations ordered by identifier.
    async fn list_all(&self) -> McpServerRegistryResult<Vec<McpServerConfig>>;
}

/// Errors returned by MCP server registry repository implementations.
#[derive(Debug, Clone, Error)]
pub enum McpServerRegistryError {
    /// The server was not found.
    #[error("MCP server not found: {0}")]
    NotFound(McpServerId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl McpServerRegistryError {
    /// Wraps a persistence-layer failure.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
