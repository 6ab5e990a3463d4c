//! Application services for MCP connection management and tool invocation.

mod cache;
mod circuit;
mod connection;
mod discovery;
mod error;
mod invocation;
mod lifecycle;
mod manager;
mod retry;
mod settings;
mod transport_plan;

pub use cache::{CacheKey, ToolResultCache};
pub use circuit::{CircuitBreaker, CircuitDecision};
pub use error::{McpManagerError, McpManagerResult};
pub use manager::McpConnectionManager;
pub use retry::RetryPolicy;
pub use settings::McpManagerSettings;
pub use transport_plan::{
    ProcessEnvironment, auth_advisories, plan_transport, remote_plan, resolve_command, stdio_plan,
};
