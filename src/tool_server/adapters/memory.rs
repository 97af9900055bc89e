//! Scripted in-memory tool server for tests and dry runs.

use crate::tool_server::domain::{
    ConnectionState, ConnectionStateCell, FailureCause, ToolCatalog, ToolDescriptor, ToolFailure,
    ToolResult,
};
use crate::tool_server::ports::{
    ToolConnection, ToolInvoker, ToolServerConnector, ToolServerError, ToolServerResult,
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// JSON-RPC code MCP servers use for unknown tools and bad arguments.
const INVALID_PARAMS: i64 = -32602;

/// One invocation observed by the scripted server.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Tool that was invoked.
    pub tool_name: String,
    /// Arguments exactly as passed.
    pub arguments: Map<String, Value>,
}

/// Canned reply for one tool.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Reply with this result.
    Result(ToolResult),
    /// Fail the call with this error.
    Error(ToolServerError),
}

/// In-memory tool server answering from a script.
///
/// Clones share the same script and call log. Tools without a scripted
/// reply answer with an invalid-params failure, as a real server does for
/// unknown tools.
#[derive(Debug, Clone, Default)]
pub struct ScriptedToolInvoker {
    state: Arc<RwLock<ScriptState>>,
}

#[derive(Debug, Default)]
struct ScriptState {
    catalog: Vec<ToolDescriptor>,
    replies: HashMap<String, ScriptedReply>,
    catalog_error: Option<ToolServerError>,
    calls: Vec<RecordedCall>,
}

fn lock_error(err: &dyn std::fmt::Display) -> ToolServerError {
    ToolServerError::Io(Arc::new(std::io::Error::other(err.to_string())))
}

impl ScriptedToolInvoker {
    /// Creates an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tool to the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`ToolServerError::Io`] when the script lock is poisoned.
    pub fn add_tool(&self, descriptor: ToolDescriptor) -> ToolServerResult<()> {
        let mut state = self.state.write().map_err(|err| lock_error(&err))?;
        state.catalog.push(descriptor);
        Ok(())
    }

    /// Scripts the reply for `tool_name`, replacing any earlier one.
    ///
    /// # Errors
    ///
    /// Returns [`ToolServerError::Io`] when the script lock is poisoned.
    pub fn set_reply(
        &self,
        tool_name: impl Into<String>,
        reply: ScriptedReply,
    ) -> ToolServerResult<()> {
        let mut state = self.state.write().map_err(|err| lock_error(&err))?;
        state.replies.insert(tool_name.into(), reply);
        Ok(())
    }

    /// Makes catalog discovery fail with `error`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolServerError::Io`] when the script lock is poisoned.
    pub fn fail_catalog(&self, error: ToolServerError) -> ToolServerResult<()> {
        let mut state = self.state.write().map_err(|err| lock_error(&err))?;
        state.catalog_error = Some(error);
        Ok(())
    }

    /// Returns every call observed so far, in order.
    ///
    /// # Errors
    ///
    /// Returns [`ToolServerError::Io`] when the script lock is poisoned.
    pub fn calls(&self) -> ToolServerResult<Vec<RecordedCall>> {
        let state = self.state.read().map_err(|err| lock_error(&err))?;
        Ok(state.calls.clone())
    }
}

#[async_trait]
impl ToolInvoker for ScriptedToolInvoker {
    async fn invoke(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
    ) -> ToolServerResult<ToolResult> {
        let mut state = self.state.write().map_err(|err| lock_error(&err))?;
        state.calls.push(RecordedCall {
            tool_name: tool_name.to_owned(),
            arguments,
        });

        match state.replies.get(tool_name) {
            Some(ScriptedReply::Result(result)) => Ok(result.clone()),
            Some(ScriptedReply::Error(error)) => Err(error.clone()),
            None => Ok(ToolResult::Failure(ToolFailure::new(
                tool_name,
                format!("Unknown tool: {tool_name}"),
                FailureCause::ServerError {
                    code: INVALID_PARAMS,
                    data: None,
                },
            ))),
        }
    }

    async fn list_tools(&self) -> ToolServerResult<ToolCatalog> {
        let state = self.state.read().map_err(|err| lock_error(&err))?;
        if let Some(error) = &state.catalog_error {
            return Err(error.clone());
        }
        Ok(ToolCatalog::new(state.catalog.clone()))
    }
}

/// Connection handed out by [`ScriptedConnector`].
///
/// A scripted [`ToolServerError::ConnectionLost`] moves the connection to
/// [`ConnectionState::Failed`], as a real connection does.
#[derive(Debug)]
pub struct ScriptedConnection {
    script: ScriptedToolInvoker,
    state: ConnectionStateCell,
    closes: Arc<AtomicUsize>,
}

impl ScriptedConnection {
    fn observe<T>(&self, outcome: ToolServerResult<T>) -> ToolServerResult<T> {
        if outcome.as_ref().is_err_and(ToolServerError::is_connection_lost) {
            let _failed = self.state.mark_failed();
        }
        outcome
    }

    fn ensure_ready(&self) -> ToolServerResult<()> {
        match self.state.current() {
            ConnectionState::Ready => Ok(()),
            ConnectionState::Failed => Err(ToolServerError::ConnectionLost(
                "scripted connection failed".to_owned(),
            )),
            state => Err(ToolServerError::NotReady { state }),
        }
    }
}

#[async_trait]
impl ToolInvoker for ScriptedConnection {
    async fn invoke(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
    ) -> ToolServerResult<ToolResult> {
        self.ensure_ready()?;
        self.observe(self.script.invoke(tool_name, arguments).await)
    }

    async fn list_tools(&self) -> ToolServerResult<ToolCatalog> {
        self.ensure_ready()?;
        self.observe(self.script.list_tools().await)
    }
}

#[async_trait]
impl ToolConnection for ScriptedConnection {
    fn state(&self) -> ConnectionState {
        self.state.current()
    }

    async fn close(&self) -> ToolServerResult<()> {
        let state = self.state.current();
        if state == ConnectionState::Closed {
            return Ok(());
        }
        if state.needs_teardown() {
            self.state.transition_to(ConnectionState::Closing)?;
        }
        self.state.transition_to(ConnectionState::Closed)?;
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector producing [`ScriptedConnection`]s over a shared script.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnector {
    script: ScriptedToolInvoker,
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    refuse: Option<ToolServerError>,
}

impl ScriptedConnector {
    /// Creates a connector over `script`.
    #[must_use]
    pub fn new(script: ScriptedToolInvoker) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    /// Makes every later `connect` fail with `error`.
    #[must_use]
    pub fn refusing(mut self, error: ToolServerError) -> Self {
        self.refuse = Some(error);
        self
    }

    /// Returns how many connections were opened.
    #[must_use]
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Returns how many connections were closed.
    #[must_use]
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolServerConnector for ScriptedConnector {
    type Connection = ScriptedConnection;

    async fn connect(&self) -> ToolServerResult<Self::Connection> {
        if let Some(error) = &self.refuse {
            return Err(error.clone());
        }
        let state = ConnectionStateCell::new();
        state.transition_to(ConnectionState::Handshaking)?;
        state.transition_to(ConnectionState::Ready)?;
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedConnection {
            script: self.script.clone(),
            state,
            closes: Arc::clone(&self.closes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_server::domain::{ContentBlock, ToolOutput};
    use serde_json::json;

    fn pong() -> ToolResult {
        ToolResult::Success(ToolOutput::new(vec![ContentBlock::text("pong")]))
    }

    #[tokio::test]
    async fn records_calls_and_returns_scripted_replies() {
        let script = ScriptedToolInvoker::new();
        script
            .set_reply("ping", ScriptedReply::Result(pong()))
            .expect("script");
        let mut arguments = Map::new();
        arguments.insert("echo".to_owned(), json!(true));

        let result = script
            .invoke("ping", arguments.clone())
            .await
            .expect("scripted reply");

        assert_eq!(result, pong());
        assert_eq!(
            script.calls().expect("calls"),
            vec![RecordedCall {
                tool_name: "ping".to_owned(),
                arguments,
            }]
        );
    }

    #[tokio::test]
    async fn unscripted_tools_fail_like_unknown_tools() {
        let result = ScriptedToolInvoker::new()
            .invoke("missing", Map::new())
            .await
            .expect("failure result");

        let failure = result.into_output().expect_err("should fail");
        assert_eq!(failure.message(), "Unknown tool: missing");
    }

    #[tokio::test]
    async fn connection_loss_fails_the_scripted_connection() {
        let script = ScriptedToolInvoker::new();
        script
            .set_reply(
                "crash",
                ScriptedReply::Error(ToolServerError::ConnectionLost("gone".to_owned())),
            )
            .expect("script");
        let connector = ScriptedConnector::new(script);
        let connection = connector.connect().await.expect("connect");

        let _lost = connection.invoke("crash", Map::new()).await;

        assert_eq!(connection.state(), ConnectionState::Failed);
        connection.close().await.expect("close");
        connection.close().await.expect("second close");
        assert_eq!(connector.closes(), 1);
    }
}
