//! Adapter implementations for MCP registry and protocol client ports.

pub mod memory;
pub mod rmcp_client;

mod runtime;

pub use runtime::{FakeServerStats, InMemoryMcpClientFactory, ListingKind};
