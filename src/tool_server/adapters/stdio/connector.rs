//! Connector that spawns a fresh server process per connection.

use super::StdioToolServerConnection;
use crate::tool_server::domain::LaunchConfig;
use crate::tool_server::ports::{ToolServerConnector, ToolServerResult};
use async_trait::async_trait;
use mockable::{Clock, DefaultClock};
use std::sync::Arc;

/// Opens [`StdioToolServerConnection`]s from one launch configuration.
#[derive(Clone)]
pub struct StdioConnector {
    config: LaunchConfig,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl std::fmt::Debug for StdioConnector {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("StdioConnector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StdioConnector {
    /// Creates a connector for `config`.
    #[must_use]
    pub fn new(config: LaunchConfig) -> Self {
        Self {
            config,
            clock: Arc::new(DefaultClock),
        }
    }

    /// Replaces the clock used to stamp pending requests.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the launch configuration.
    #[must_use]
    pub const fn config(&self) -> &LaunchConfig {
        &self.config
    }
}

#[async_trait]
impl ToolServerConnector for StdioConnector {
    type Connection = StdioToolServerConnection;

    async fn connect(&self) -> ToolServerResult<Self::Connection> {
        StdioToolServerConnection::open_with_clock(&self.config, Arc::clone(&self.clock)).await
    }
}
