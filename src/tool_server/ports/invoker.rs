//! Invocation port for tool servers.

use crate::tool_server::domain::{
    ConnectionState, CorrelationId, ToolCatalog, ToolFailure, ToolResult, ToolServerDomainError,
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for tool-server operations.
pub type ToolServerResult<T> = Result<T, ToolServerError>;

/// Contract the agent layer uses to reach remote tools.
///
/// Implementations never retry: tool calls are not guaranteed idempotent,
/// so retry policy belongs to the caller.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Invokes `tool_name` with an opaque argument map.
    async fn invoke(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
    ) -> ToolServerResult<ToolResult>;

    /// Lists the tools the server currently offers.
    async fn list_tools(&self) -> ToolServerResult<ToolCatalog>;
}

/// Errors returned by tool-server connections and sessions.
#[derive(Debug, Clone, Error)]
pub enum ToolServerError {
    /// The server executable could not be launched.
    #[error("failed to spawn tool server '{command}': {source}")]
    Spawn {
        /// Command that failed to launch.
        command: String,
        /// Underlying OS error.
        source: Arc<std::io::Error>,
    },

    /// No initialize acknowledgement arrived within the startup timeout.
    #[error("tool server did not acknowledge initialize within {timeout:?}")]
    HandshakeTimeout {
        /// Configured startup timeout.
        timeout: Duration,
    },

    /// The server broke the protocol during the handshake.
    #[error("tool server protocol violation: {0}")]
    ProtocolViolation(String),

    /// No matching response arrived within the call timeout.
    #[error("request {id} ({label}) timed out after {timeout:?}")]
    CallTimeout {
        /// Identifier of the abandoned request.
        id: CorrelationId,
        /// Tool name or method.
        label: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// The process exited or its stream closed before a response arrived.
    #[error("connection to tool server lost: {0}")]
    ConnectionLost(String),

    /// A reply addressed to a request could not be decoded.
    #[error("malformed response to request {id}: {reason}")]
    MalformedResponse {
        /// Identifier the reply claimed to answer.
        id: CorrelationId,
        /// Decoding failure.
        reason: String,
    },

    /// The server reported an error for a specific call.
    #[error(transparent)]
    ServerReported(#[from] ToolFailure),

    /// The connection is not in a state that accepts calls.
    #[error("tool server connection is {state}, not ready")]
    NotReady {
        /// State at the time of the call.
        state: ConnectionState,
    },

    /// Request validation failed before any I/O.
    #[error(transparent)]
    Domain(#[from] ToolServerDomainError),

    /// Writing to the server failed for a reason other than a closed pipe.
    #[error("tool server I/O error: {0}")]
    Io(Arc<std::io::Error>),
}

impl ToolServerError {
    /// Wraps an I/O error, classifying closed pipes as connection loss.
    #[must_use]
    pub fn io(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::UnexpectedEof => Self::ConnectionLost(err.to_string()),
            _ => Self::Io(Arc::new(err)),
        }
    }

    /// Returns whether the error means the server is gone for good.
    #[must_use]
    pub const fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionLost(_))
    }
}
