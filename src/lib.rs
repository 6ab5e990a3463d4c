//! Pilotis: MCP client connection management for agent orchestration.
//!
//! This crate keeps live connections to a dynamic set of Model Context
//! Protocol (MCP) tool servers, discovers the tools, resources, and prompts
//! they expose, and brokers tool invocations on behalf of many concurrent
//! callers.
//!
//! # Architecture
//!
//! Pilotis follows hexagonal architecture principles:
//!
//! - **Domain**: Server configuration, capability, and failure types with no
//!   infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for the registry and the protocol
//!   client library
//! - **Adapters**: Concrete implementations of ports (`rmcp`, in-memory)
//! - **Services**: The connection manager and its invocation pipeline
//!
//! # Modules
//!
//! - [`tool_registry`]: MCP server registration, connection lifecycle,
//!   capability discovery, and tool invocation

pub mod tool_registry;
