//! Tether: a connection manager for subprocess MCP tool servers.
//!
//! Tether launches a tool server as a child process, speaks
//! newline-delimited JSON-RPC 2.0 with it over stdio and lets callers
//! invoke its tools concurrently with per-call timeouts. On top of the
//! connection it offers a session policy, environment configuration and
//! an observability report built from a sequence of tool probes.
//!
//! # Architecture
//!
//! The tool-server module follows hexagonal architecture principles:
//!
//! - **Domain**: identifiers, launch settings, results and state
//! - **Protocol**: the wire format, decoded once into tagged variants
//! - **Ports**: the [`tool_server::ports::ToolInvoker`] contract
//! - **Adapters**: the stdio subprocess connection and a scripted
//!   in-memory double
//! - **Services**: sessions that apply a connection policy
//!
//! # Modules
//!
//! - [`tool_server`]: connection lifecycle and tool invocation
//! - [`config`]: environment-driven launch settings
//! - [`report`]: probe collection, rendering and persistence

pub mod config;
pub mod report;
pub mod tool_server;
