//! Ports for acquiring and releasing tool-server connections.

use super::{ToolInvoker, ToolServerResult};
use crate::tool_server::domain::ConnectionState;
use async_trait::async_trait;

/// A live connection that can report its state and be torn down.
#[async_trait]
pub trait ToolConnection: ToolInvoker {
    /// Returns the current lifecycle state.
    fn state(&self) -> ConnectionState;

    /// Releases the connection. Must be idempotent.
    async fn close(&self) -> ToolServerResult<()>;
}

/// Opens connections to one configured tool server.
#[async_trait]
pub trait ToolServerConnector: Send + Sync {
    /// Connection type produced by this connector.
    type Connection: ToolConnection + 'static;

    /// Opens a connection and completes its handshake.
    async fn connect(&self) -> ToolServerResult<Self::Connection>;
}
