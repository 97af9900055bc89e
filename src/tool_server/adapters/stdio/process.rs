//! Child-process ownership for stdio tool servers.

use crate::tool_server::domain::LaunchConfig;
use crate::tool_server::ports::{ToolServerError, ToolServerResult};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Exit status of the child once it has been reaped.
pub(super) type ExitWatch = watch::Receiver<Option<ExitStatus>>;

/// A spawned tool server.
///
/// The child itself is owned by a supervisor task that reaps it as soon as
/// it exits and publishes the status. Dropping this handle asks the
/// supervisor to kill the child.
#[derive(Debug)]
pub(super) struct ServerProcess {
    pid: Option<u32>,
    exited: ExitWatch,
    kill: Option<oneshot::Sender<()>>,
    stderr_task: Option<JoinHandle<()>>,
}

/// Pipes handed to the connection after spawning.
pub(super) struct ServerPipes {
    pub(super) stdin: ChildStdin,
    pub(super) stdout: ChildStdout,
}

impl ServerProcess {
    /// Spawns the configured command with piped stdio.
    ///
    /// The child runs in its own process group so teardown signals reach
    /// anything it launched, such as the node process behind `npx`.
    pub(super) fn spawn(config: &LaunchConfig) -> ToolServerResult<(Self, ServerPipes)> {
        let mut command = Command::new(config.command());
        command
            .args(config.args())
            .envs(config.env())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(directory) = config.working_directory() {
            command.current_dir(directory);
        }
        #[cfg(unix)]
        command.process_group(0);

        let spawn_error = |source: std::io::Error| ToolServerError::Spawn {
            command: config.command().to_owned(),
            source: Arc::new(source),
        };

        let mut child = command.spawn().map_err(spawn_error)?;
        let pid = child.id();
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_error(std::io::Error::other("stdin was not captured")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error(std::io::Error::other("stdout was not captured")))?;
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(drain_stderr(stderr, pid)));

        let (exit_tx, exited) = watch::channel(None);
        let (kill, kill_rx) = oneshot::channel();
        tokio::spawn(supervise(child, kill_rx, exit_tx));

        info!(command = config.command(), pid, "spawned tool server");
        Ok((
            Self {
                pid,
                exited,
                kill: Some(kill),
                stderr_task,
            },
            ServerPipes { stdin, stdout },
        ))
    }

    pub(super) const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Returns whether the child has not yet exited.
    pub(super) fn is_alive(&self) -> bool {
        self.exited.borrow().is_none()
    }

    /// Returns a receiver that sees the exit status once the child is reaped.
    pub(super) fn exit_watch(&self) -> ExitWatch {
        self.exited.clone()
    }

    /// Waits for the child to exit, escalating to signals when it lingers.
    ///
    /// The caller closes stdin first. The child then gets `grace` to exit on
    /// its own, another `grace` after SIGTERM, and is killed after that.
    pub(super) async fn terminate(mut self, grace: Duration) -> ToolServerResult<ExitStatus> {
        let outcome = self.escalate(grace).await;
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        outcome
    }

    async fn escalate(&mut self, grace: Duration) -> ToolServerResult<ExitStatus> {
        if let Some(status) = self.wait_within(grace).await? {
            debug!(pid = self.pid, %status, "tool server exited after stdin closed");
            return Ok(status);
        }

        #[cfg(unix)]
        self.signal_group(nix::sys::signal::Signal::SIGTERM);

        if let Some(status) = self.wait_within(grace).await? {
            debug!(pid = self.pid, %status, "tool server exited after SIGTERM");
            return Ok(status);
        }

        warn!(pid = self.pid, "tool server ignored SIGTERM, killing it");
        #[cfg(unix)]
        self.signal_group(nix::sys::signal::Signal::SIGKILL);
        let already_reaped = self.kill.take().is_some_and(|kill| kill.send(()).is_err());
        if already_reaped {
            debug!(pid = self.pid, "tool server was reaped before the kill request");
        }
        self.wait_exit().await
    }

    async fn wait_within(&mut self, grace: Duration) -> ToolServerResult<Option<ExitStatus>> {
        match tokio::time::timeout(grace, self.wait_exit()).await {
            Ok(outcome) => outcome.map(Some),
            Err(_elapsed) => Ok(None),
        }
    }

    async fn wait_exit(&mut self) -> ToolServerResult<ExitStatus> {
        let unavailable =
            || ToolServerError::io(std::io::Error::other("tool server exit status is unavailable"));
        let status = *self
            .exited
            .wait_for(Option::is_some)
            .await
            .map_err(|_| unavailable())?;
        status.ok_or_else(unavailable)
    }

    #[cfg(unix)]
    fn signal_group(&self, signal: nix::sys::signal::Signal) {
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        let Some(raw) = self.pid.and_then(|pid| i32::try_from(pid).ok()) else {
            return;
        };
        if let Err(err) = killpg(Pid::from_raw(raw), signal) {
            debug!(pid = raw, %signal, error = %err, "signalling tool server group failed");
        }
    }
}

/// Owns the child until it exits, killing it when asked or when the
/// [`ServerProcess`] handle is dropped.
async fn supervise(
    mut child: Child,
    mut kill: oneshot::Receiver<()>,
    exited: watch::Sender<Option<ExitStatus>>,
) {
    let pid = child.id();
    let waited = tokio::select! {
        status = child.wait() => status,
        _ = &mut kill => match child.kill().await {
            Ok(()) => child.wait().await,
            Err(err) => Err(err),
        },
    };
    match waited {
        Ok(status) => {
            debug!(pid, %status, "tool server process reaped");
            exited.send_replace(Some(status));
        }
        Err(err) => warn!(pid, error = %err, "failed to reap tool server process"),
    }
}

async fn drain_stderr(stderr: ChildStderr, pid: Option<u32>) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(target: "tether::server_stderr", pid, "{line}"),
            Ok(None) => break,
            Err(err) => {
                debug!(pid, error = %err, "stopped reading tool server stderr");
                break;
            }
        }
    }
}
