//! Subprocess tool-server connections speaking MCP over stdio.
//!
//! A tool server is an external process exposing named, schema-described
//! tools through newline-delimited JSON-RPC 2.0 on its stdin and stdout.
//! The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Wire encoding and decoding in [`protocol`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Connection policy in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod protocol;
pub mod services;

#[cfg(test)]
mod tests;
