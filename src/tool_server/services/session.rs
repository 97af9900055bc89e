//! Connection policy and scoped acquisition for tool calls.

use crate::tool_server::adapters::stdio::StdioConnector;
use crate::tool_server::domain::{ConnectionPolicy, LaunchConfig, ToolCatalog, ToolResult};
use crate::tool_server::ports::{
    ToolConnection, ToolInvoker, ToolServerConnector, ToolServerResult,
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Opens a connection, runs `work` against it and always closes it.
///
/// The connection is closed whether `work` succeeds or fails. When both
/// fail, the error from `work` is returned and the close error is logged.
///
/// # Errors
///
/// Returns the connector's error when the connection cannot be opened,
/// otherwise the error from `work`, otherwise the error from closing.
pub async fn with_connection<K, F, Fut, T>(connector: &K, work: F) -> ToolServerResult<T>
where
    K: ToolServerConnector + ?Sized,
    F: FnOnce(Arc<K::Connection>) -> Fut + Send,
    Fut: Future<Output = ToolServerResult<T>> + Send,
    T: Send,
{
    let connection = Arc::new(connector.connect().await?);
    let outcome = work(Arc::clone(&connection)).await;
    let closed = connection.close().await;

    match (outcome, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            warn!(error = %close_err, "closing tool server connection after a failed call also failed");
            Err(err)
        }
    }
}

/// A [`ToolInvoker`] that manages its own connections.
///
/// With [`ConnectionPolicy::Persistent`] one connection is opened on first
/// use and reused until [`ToolSession::close`]. A connection that fails is
/// not reopened automatically: calls keep failing with connection loss
/// until the session is closed, after which the next call reconnects.
///
/// With [`ConnectionPolicy::PerCall`] every call runs inside
/// [`with_connection`].
pub struct ToolSession<K>
where
    K: ToolServerConnector,
{
    connector: Arc<K>,
    policy: ConnectionPolicy,
    persistent: Mutex<Option<Arc<K::Connection>>>,
}

impl<K> std::fmt::Debug for ToolSession<K>
where
    K: ToolServerConnector,
{
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ToolSession")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ToolSession<StdioConnector> {
    /// Creates a session that spawns servers from `config`.
    #[must_use]
    pub fn from_launch_config(config: LaunchConfig, policy: ConnectionPolicy) -> Self {
        Self::new(Arc::new(StdioConnector::new(config)), policy)
    }
}

impl<K> ToolSession<K>
where
    K: ToolServerConnector,
{
    /// Creates a session over `connector`. No connection is opened yet.
    #[must_use]
    pub fn new(connector: Arc<K>, policy: ConnectionPolicy) -> Self {
        Self {
            connector,
            policy,
            persistent: Mutex::new(None),
        }
    }

    /// Returns the connection policy.
    #[must_use]
    pub const fn policy(&self) -> ConnectionPolicy {
        self.policy
    }

    /// Returns whether a persistent connection is currently held.
    pub async fn is_connected(&self) -> bool {
        self.persistent.lock().await.is_some()
    }

    /// Closes the persistent connection, if one is open.
    ///
    /// # Errors
    ///
    /// Returns the connection's close error.
    pub async fn close(&self) -> ToolServerResult<()> {
        let held = self.persistent.lock().await.take();
        match held {
            Some(connection) => {
                debug!("closing persistent tool server connection");
                connection.close().await
            }
            None => Ok(()),
        }
    }

    async fn persistent_connection(&self) -> ToolServerResult<Arc<K::Connection>> {
        let mut slot = self.persistent.lock().await;
        if let Some(connection) = slot.as_ref() {
            return Ok(Arc::clone(connection));
        }
        let connection = Arc::new(self.connector.connect().await?);
        info!(policy = %self.policy, "opened tool server connection");
        *slot = Some(Arc::clone(&connection));
        Ok(connection)
    }
}

#[async_trait]
impl<K> ToolInvoker for ToolSession<K>
where
    K: ToolServerConnector,
{
    async fn invoke(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
    ) -> ToolServerResult<ToolResult> {
        match self.policy {
            ConnectionPolicy::Persistent => {
                self.persistent_connection()
                    .await?
                    .invoke(tool_name, arguments)
                    .await
            }
            ConnectionPolicy::PerCall => {
                with_connection(self.connector.as_ref(), |connection| async move {
                    connection.invoke(tool_name, arguments).await
                })
                .await
            }
        }
    }

    async fn list_tools(&self) -> ToolServerResult<ToolCatalog> {
        match self.policy {
            ConnectionPolicy::Persistent => self.persistent_connection().await?.list_tools().await,
            ConnectionPolicy::PerCall => {
                with_connection(self.connector.as_ref(), |connection| async move {
                    connection.list_tools().await
                })
                .await
            }
        }
    }
}
