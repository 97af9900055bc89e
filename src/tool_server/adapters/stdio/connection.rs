//! Connection to a tool server over a pair of byte streams.

use super::channel::Channel;
use super::demux::{PendingGuard, Undeliverable};
use super::process::ServerProcess;
use super::reader;
use crate::tool_server::domain::{
    ConnectionState, DEFAULT_CALL_TIMEOUT, DEFAULT_SHUTDOWN_GRACE, DEFAULT_STARTUP_TIMEOUT,
    FailureCause, LaunchConfig, PendingRequest, ToolCatalog, ToolFailure, ToolResult,
    ToolServerDomainError,
};
use crate::tool_server::ports::{ToolConnection, ToolInvoker, ToolServerError, ToolServerResult};
use crate::tool_server::protocol::{
    INITIALIZE, INITIALIZED_NOTIFICATION, NotificationEnvelope, RequestEnvelope, ResponseOutcome,
    ServerInfo, TOOLS_CALL, TOOLS_LIST, call_params, decode_call_result,
    decode_initialize_result, decode_tools_page, encode_line, error_result, initialize_params,
    list_params,
};
use async_trait::async_trait;
use mockable::{Clock, DefaultClock};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Upper bound on `tools/list` pages fetched for one catalog.
pub const MAX_TOOL_PAGES: usize = 64;

/// Time budgets applied to one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionTimeouts {
    /// Time allowed for the initialize exchange.
    pub startup: Duration,
    /// Default time allowed for a single request.
    pub call: Duration,
    /// Time the process gets at each teardown step.
    pub shutdown_grace: Duration,
}

impl Default for ConnectionTimeouts {
    fn default() -> Self {
        Self {
            startup: DEFAULT_STARTUP_TIMEOUT,
            call: DEFAULT_CALL_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl From<&LaunchConfig> for ConnectionTimeouts {
    fn from(config: &LaunchConfig) -> Self {
        Self {
            startup: config.startup_timeout(),
            call: config.call_timeout(),
            shutdown_grace: config.shutdown_grace(),
        }
    }
}

/// An initialized session with one tool server.
///
/// Requests may be issued concurrently from many tasks. Each is matched to
/// its response by correlation identifier alone, so the server may answer
/// in any order. A background task owns the read side; writes are
/// serialized so request lines never interleave.
pub struct StdioToolServerConnection {
    channel: Arc<Channel>,
    timeouts: ConnectionTimeouts,
    clock: Arc<dyn Clock + Send + Sync>,
    server_info: OnceLock<ServerInfo>,
    process: tokio::sync::Mutex<Option<ServerProcess>>,
    process_id: Option<u32>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for StdioToolServerConnection {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("StdioToolServerConnection")
            .field("state", &self.channel.state.current())
            .field("process_id", &self.process_id)
            .field("timeouts", &self.timeouts)
            .field("server_info", &self.server_info.get())
            .finish_non_exhaustive()
    }
}

impl StdioToolServerConnection {
    /// Spawns the configured server and completes the initialize handshake.
    ///
    /// # Errors
    ///
    /// Returns [`ToolServerError::Spawn`] when the command cannot be
    /// launched, [`ToolServerError::HandshakeTimeout`] when the server does
    /// not answer within the startup timeout, and
    /// [`ToolServerError::ProtocolViolation`] or
    /// [`ToolServerError::ConnectionLost`] when the handshake fails. On any
    /// failure the spawned process has been torn down before returning.
    pub async fn open(config: &LaunchConfig) -> ToolServerResult<Self> {
        Self::open_with_clock(config, Arc::new(DefaultClock)).await
    }

    /// Like [`Self::open`], stamping requests with `clock`.
    ///
    /// # Errors
    ///
    /// See [`Self::open`].
    pub async fn open_with_clock(
        config: &LaunchConfig,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> ToolServerResult<Self> {
        let (process, pipes) = ServerProcess::spawn(config)?;
        Self::establish(
            pipes.stdout,
            pipes.stdin,
            Some(process),
            ConnectionTimeouts::from(config),
            clock,
        )
        .await
    }

    /// Runs the handshake over already-connected streams.
    ///
    /// No process is owned; closing the connection only closes `writer`.
    ///
    /// # Errors
    ///
    /// See [`Self::open`].
    pub async fn connect_streams<R, W>(
        reader: R,
        writer: W,
        timeouts: ConnectionTimeouts,
    ) -> ToolServerResult<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + 'static,
    {
        Self::establish(reader, writer, None, timeouts, Arc::new(DefaultClock)).await
    }

    async fn establish<R, W>(
        output: R,
        input: W,
        process: Option<ServerProcess>,
        timeouts: ConnectionTimeouts,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> ToolServerResult<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + 'static,
    {
        let channel = Arc::new(Channel::new(Box::pin(input)));
        channel.state.transition_to(ConnectionState::Handshaking)?;
        let mut background = vec![tokio::spawn(reader::run(
            BufReader::new(output),
            Arc::clone(&channel),
        ))];
        if let Some(child) = process.as_ref() {
            background.push(tokio::spawn(reader::watch_exit(
                child.exit_watch(),
                Arc::clone(&channel),
            )));
        }
        let process_id = process.as_ref().and_then(ServerProcess::pid);

        let connection = Self {
            channel,
            timeouts,
            clock,
            server_info: OnceLock::new(),
            process: tokio::sync::Mutex::new(process),
            process_id,
            background: Mutex::new(background),
        };

        if let Err(err) = connection.handshake().await {
            warn!(error = %err, "tool server handshake failed");
            if let Err(close_err) = connection.close().await {
                warn!(error = %close_err, "tearing down after failed handshake failed");
            }
            return Err(err);
        }
        Ok(connection)
    }

    async fn handshake(&self) -> ToolServerResult<()> {
        let request = PendingRequest::new(
            self.channel.ids.allocate(),
            INITIALIZE,
            self.timeouts.startup,
            self.clock.as_ref(),
        );
        let outcome = self
            .round_trip(request, Some(initialize_params()))
            .await
            .map_err(|err| match err {
                ToolServerError::CallTimeout { timeout, .. } => {
                    ToolServerError::HandshakeTimeout { timeout }
                }
                ToolServerError::MalformedResponse { reason, .. } => {
                    ToolServerError::ProtocolViolation(format!(
                        "malformed initialize response: {reason}"
                    ))
                }
                other => other,
            })?;

        let result = match outcome {
            ResponseOutcome::Result(value) => value,
            ResponseOutcome::Error(error) => {
                return Err(ToolServerError::ProtocolViolation(format!(
                    "server rejected initialize: {} (code {})",
                    error.message, error.code
                )));
            }
        };
        let decoded = decode_initialize_result(&result)
            .map_err(|err| ToolServerError::ProtocolViolation(err.to_string()))?;

        self.notify(INITIALIZED_NOTIFICATION).await?;
        if self
            .channel
            .state
            .transition_to(ConnectionState::Ready)
            .is_err()
        {
            return Err(ToolServerError::ConnectionLost(
                "tool server exited during the handshake".to_owned(),
            ));
        }

        let info = self.server_info.get_or_init(|| decoded);
        info!(
            server = info.name().unwrap_or("unknown"),
            server_version = info.version().unwrap_or("unknown"),
            protocol_version = info.protocol_version(),
            pid = self.process_id,
            "tool server ready"
        );
        Ok(())
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.channel.state.current()
    }

    /// Returns what the server reported during the handshake.
    #[must_use]
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.get()
    }

    /// Returns the OS process identifier of the spawned server, if any.
    #[must_use]
    pub const fn process_id(&self) -> Option<u32> {
        self.process_id
    }

    /// Returns whether the spawned server is still running.
    pub async fn is_process_alive(&self) -> bool {
        self.process
            .lock()
            .await
            .as_ref()
            .is_some_and(ServerProcess::is_alive)
    }

    /// Returns the requests still waiting for a response.
    #[must_use]
    pub fn outstanding_requests(&self) -> Vec<PendingRequest> {
        self.channel.pending.snapshot()
    }

    /// Invokes `tool_name`, waiting at most `timeout` for the response.
    ///
    /// A JSON-RPC error object or a result flagged `isError` comes back as
    /// [`ToolResult::Failure`]; only transport and protocol problems are
    /// errors.
    ///
    /// # Errors
    ///
    /// Returns [`ToolServerError::Domain`] for an empty tool name or zero
    /// timeout, [`ToolServerError::NotReady`] unless the connection is
    /// ready, [`ToolServerError::CallTimeout`] when no response arrives in
    /// time, [`ToolServerError::ConnectionLost`] when the server goes away,
    /// and [`ToolServerError::MalformedResponse`] when the reply cannot be
    /// decoded.
    pub async fn invoke_with_timeout(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
        timeout: Duration,
    ) -> ToolServerResult<ToolResult> {
        if tool_name.trim().is_empty() {
            return Err(ToolServerDomainError::EmptyToolName.into());
        }
        if timeout.is_zero() {
            return Err(ToolServerDomainError::ZeroDuration("call timeout").into());
        }
        self.ensure_ready()?;

        let id = self.channel.ids.allocate();
        let request =
            PendingRequest::new(id, TOOLS_CALL, timeout, self.clock.as_ref()).for_tool(tool_name);
        debug!(%id, tool = tool_name, "invoking tool");

        match self
            .round_trip(request, Some(call_params(tool_name, arguments)))
            .await?
        {
            ResponseOutcome::Result(value) => {
                decode_call_result(tool_name, value).map_err(|err| {
                    ToolServerError::MalformedResponse {
                        id,
                        reason: err.to_string(),
                    }
                })
            }
            ResponseOutcome::Error(error) => Ok(error_result(tool_name, error)),
        }
    }

    async fn fetch_catalog(&self) -> ToolServerResult<ToolCatalog> {
        self.ensure_ready()?;
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_TOOL_PAGES {
            let id = self.channel.ids.allocate();
            let request =
                PendingRequest::new(id, TOOLS_LIST, self.timeouts.call, self.clock.as_ref());
            let value = match self
                .round_trip(request, list_params(cursor.as_deref()))
                .await?
            {
                ResponseOutcome::Result(value) => value,
                ResponseOutcome::Error(error) => {
                    return Err(ToolFailure::new(
                        TOOLS_LIST,
                        error.message,
                        FailureCause::ServerError {
                            code: error.code,
                            data: error.data,
                        },
                    )
                    .into());
                }
            };
            let page = decode_tools_page(&value).map_err(|err| {
                ToolServerError::MalformedResponse {
                    id,
                    reason: err.to_string(),
                }
            })?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(ToolCatalog::new(tools)),
            }
        }

        warn!(
            pages = MAX_TOOL_PAGES,
            "tool catalog pagination limit reached, returning partial catalog"
        );
        Ok(ToolCatalog::new(tools))
    }

    /// Closes stdin, waits for the server to exit and releases everything.
    ///
    /// Idempotent: later and concurrent calls wait for the first teardown
    /// and then return `Ok(())`. Requests still waiting fail with
    /// [`ToolServerError::ConnectionLost`].
    ///
    /// # Errors
    ///
    /// Returns [`ToolServerError::Io`] when the process could not be reaped.
    pub async fn close(&self) -> ToolServerResult<()> {
        let mut process = self.process.lock().await;
        let state = self.channel.state.current();
        if state == ConnectionState::Closed {
            return Ok(());
        }
        if state.needs_teardown() {
            self.channel.state.transition_to(ConnectionState::Closing)?;
        }
        debug!(pid = self.process_id, from = %state, "closing tool server connection");

        self.channel.close_writer().await;
        let outcome = match process.take() {
            Some(child) => child
                .terminate(self.timeouts.shutdown_grace)
                .await
                .map(|status| info!(pid = self.process_id, %status, "tool server exited")),
            None => Ok(()),
        };

        let abandoned = self.channel.pending.close_all("connection closed");
        if abandoned > 0 {
            debug!(abandoned, "failed requests still waiting at close");
        }
        self.stop_background();
        self.channel.state.transition_to(ConnectionState::Closed)?;
        outcome
    }

    fn ensure_ready(&self) -> ToolServerResult<()> {
        match self.channel.state.current() {
            ConnectionState::Ready => Ok(()),
            ConnectionState::Failed => Err(ToolServerError::ConnectionLost(
                "tool server is no longer running".to_owned(),
            )),
            state => Err(ToolServerError::NotReady { state }),
        }
    }

    async fn round_trip(
        &self,
        request: PendingRequest,
        params: Option<Value>,
    ) -> ToolServerResult<ResponseOutcome> {
        let id = request.id();
        let timeout = request.timeout();
        let label = request.label().to_owned();
        let line = encode_line(&RequestEnvelope::new(id, request.method(), params))
            .map_err(encode_error)?;

        let receiver = self
            .channel
            .pending
            .register(request)
            .map_err(ToolServerError::ConnectionLost)?;
        let _guard = PendingGuard::new(Arc::clone(&self.channel.pending), id);

        let exchange = async {
            self.channel.write_line(&line).await?;
            receiver.await.map_err(|_| {
                ToolServerError::ConnectionLost("response channel dropped".to_owned())
            })
        };
        let Ok(delivery) = tokio::time::timeout(timeout, exchange).await else {
            warn!(%id, %label, ?timeout, "request timed out");
            return Err(ToolServerError::CallTimeout { id, label, timeout });
        };

        delivery?.map_err(|undeliverable| match undeliverable {
            Undeliverable::Malformed(reason) => ToolServerError::MalformedResponse { id, reason },
            Undeliverable::Lost(reason) => ToolServerError::ConnectionLost(reason),
        })
    }

    async fn notify(&self, method: &str) -> ToolServerResult<()> {
        let line = encode_line(&NotificationEnvelope::new(method, None)).map_err(encode_error)?;
        self.channel.write_line(&line).await
    }

    fn stop_background(&self) {
        let tasks = std::mem::take(
            &mut *self
                .background
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for handle in tasks {
            handle.abort();
        }
    }
}

impl Drop for StdioToolServerConnection {
    fn drop(&mut self) {
        self.stop_background();
    }
}

fn encode_error(err: serde_json::Error) -> ToolServerError {
    ToolServerError::Io(Arc::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        err,
    )))
}

#[async_trait]
impl ToolInvoker for StdioToolServerConnection {
    async fn invoke(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
    ) -> ToolServerResult<ToolResult> {
        self.invoke_with_timeout(tool_name, arguments, self.timeouts.call)
            .await
    }

    async fn list_tools(&self) -> ToolServerResult<ToolCatalog> {
        self.fetch_catalog().await
    }
}

#[async_trait]
impl ToolConnection for StdioToolServerConnection {
    fn state(&self) -> ConnectionState {
        Self::state(self)
    }

    async fn close(&self) -> ToolServerResult<()> {
        Self::close(self).await
    }
}
