//! Newline-delimited JSON-RPC 2.0 wire protocol spoken by MCP tool servers.
//!
//! Everything that inspects raw JSON lives here, so the rest of the crate
//! only sees tagged variants ([`InboundLine`], [`ToolResult`]).
//!
//! [`ToolResult`]: crate::tool_server::domain::ToolResult

mod envelope;
mod handshake;
mod tools;

pub use envelope::{
    InboundLine, JSONRPC_VERSION, METHOD_NOT_FOUND, NotificationEnvelope, ReplyEnvelope,
    RequestEnvelope, ResponseEnvelope, ResponseOutcome, RpcError, ServerRequest, classify_line,
    encode_line,
};
pub use handshake::{
    CLIENT_NAME, PROTOCOL_VERSION, ServerInfo, decode_initialize_result, initialize_params,
};
pub use tools::{
    ToolsPage, call_params, decode_call_result, decode_tools_page, error_result, list_params,
};

use thiserror::Error;

/// Method that opens the session.
pub const INITIALIZE: &str = "initialize";

/// Notification sent once the initialize result has been accepted.
pub const INITIALIZED_NOTIFICATION: &str = "notifications/initialized";

/// Method that invokes a tool.
pub const TOOLS_CALL: &str = "tools/call";

/// Method that lists the tool catalog.
pub const TOOLS_LIST: &str = "tools/list";

/// Liveness probe either side may send.
pub const PING: &str = "ping";

/// A payload that does not have the shape the protocol requires.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DecodeError(String);

impl DecodeError {
    /// Creates a decode error with a description.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}
