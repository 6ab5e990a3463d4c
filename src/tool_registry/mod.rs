//! MCP server connection management and tool brokering for Pilotis.
//!
//! This module registers MCP server configurations, manages one scoped
//! connection per server, discovers and caches each server's capabilities,
//! and runs tool calls through a cache, circuit breaker, and retry policy.
//! The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
