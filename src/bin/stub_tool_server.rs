//! Scripted MCP tool server used by the integration tests.
//!
//! Speaks newline-delimited JSON-RPC 2.0 on stdin/stdout. Behaviour is
//! chosen with `STUB_MODE`:
//!
//! - `echo` (default): answers every `tools/call` with the text of the
//!   `echo` argument, or `pong`
//! - `noise`: writes a non-JSON line before every reply
//! - `silent`: never answers `tools/call`
//! - `reverse`: holds the first `tools/call` and answers it after the second
//! - `error`: answers `tools/call` with an error object
//! - `crash`: exits on the first `tools/call`
//! - `no_handshake`: never answers `initialize`
//! - `bad_handshake`: rejects `initialize` with an error object
//! - `fragment`: writes replies in small flushed chunks
//! - `stubborn`: like `silent`, and ignores both EOF and `SIGTERM`
//!
//! When `STUB_PID_FILE` is set the process id is written there at startup.

use eyre::{WrapErr, eyre};
use serde_json::{Value, json};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tether::tool_server::protocol::{
    INITIALIZE, METHOD_NOT_FOUND, PING, PROTOCOL_VERSION, ReplyEnvelope, RpcError, TOOLS_CALL,
    TOOLS_LIST, encode_line,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};

const FRAGMENT_BYTES: usize = 7;
const CRASH_EXIT_CODE: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Echo,
    Noise,
    Silent,
    Reverse,
    Error,
    Crash,
    NoHandshake,
    BadHandshake,
    Fragment,
    Stubborn,
}

impl FromStr for Mode {
    type Err = eyre::Report;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "echo" => Ok(Self::Echo),
            "noise" => Ok(Self::Noise),
            "silent" => Ok(Self::Silent),
            "reverse" => Ok(Self::Reverse),
            "error" => Ok(Self::Error),
            "crash" => Ok(Self::Crash),
            "no_handshake" => Ok(Self::NoHandshake),
            "bad_handshake" => Ok(Self::BadHandshake),
            "fragment" => Ok(Self::Fragment),
            "stubborn" => Ok(Self::Stubborn),
            other => Err(eyre!("unknown STUB_MODE '{other}'")),
        }
    }
}

struct Stub {
    mode: Mode,
    stdout: Stdout,
    held_call: Option<Value>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> eyre::Result<()> {
    let mode = env::var("STUB_MODE")
        .map_or(Ok(Mode::Echo), |value| value.parse::<Mode>())?;
    if let Ok(path) = env::var("STUB_PID_FILE") {
        std::fs::write(&path, std::process::id().to_string())
            .wrap_err_with(|| format!("failed to write pid file {path}"))?;
    }

    #[cfg(unix)]
    let _sigterm = if mode == Mode::Stubborn {
        Some(tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        )?)
    } else {
        None
    };

    let mut stub = Stub {
        mode,
        stdout: tokio::io::stdout(),
        held_call: None,
    };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        stub.handle(&line).await?;
    }

    if mode == Mode::Stubborn {
        std::future::pending::<()>().await;
    }
    Ok(())
}

impl Stub {
    async fn handle(&mut self, line: &str) -> eyre::Result<()> {
        let Ok(message) = serde_json::from_str::<Value>(line) else {
            return Ok(());
        };
        let method = message.get("method").and_then(Value::as_str).unwrap_or("");
        let Some(id) = message.get("id").cloned() else {
            return Ok(());
        };

        match method {
            INITIALIZE => self.initialize(id).await,
            TOOLS_LIST => {
                let tools = json!({
                    "tools": [
                        {"name": "ping", "description": "Answers pong", "inputSchema": {"type": "object"}},
                        {"name": "echo", "description": "Echoes its argument", "inputSchema": {"type": "object"}}
                    ]
                });
                self.send(&ReplyEnvelope::result(id, tools)).await
            }
            TOOLS_CALL => self.call(id, &message).await,
            PING => self.send(&ReplyEnvelope::result(id, json!({}))).await,
            other => {
                let error = RpcError::new(METHOD_NOT_FOUND, format!("Method not found: {other}"));
                self.send(&ReplyEnvelope::error(id, error)).await
            }
        }
    }

    async fn initialize(&mut self, id: Value) -> eyre::Result<()> {
        match self.mode {
            Mode::NoHandshake => Ok(()),
            Mode::BadHandshake => {
                let error = RpcError::new(-32600, "unsupported client");
                self.send(&ReplyEnvelope::error(id, error)).await
            }
            _ => {
                let result = json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "stub_tool_server", "version": "0.1.0"}
                });
                self.send(&ReplyEnvelope::result(id, result)).await
            }
        }
    }

    async fn call(&mut self, id: Value, message: &Value) -> eyre::Result<()> {
        match self.mode {
            Mode::Silent | Mode::Stubborn => Ok(()),
            Mode::Crash => std::process::exit(CRASH_EXIT_CODE),
            Mode::Error => {
                let error = RpcError::new(-32000, "stub failure");
                self.send(&ReplyEnvelope::error(id, error)).await
            }
            Mode::Reverse => match self.held_call.take() {
                None => {
                    self.held_call = Some(message.clone());
                    Ok(())
                }
                Some(first) => {
                    self.send(&text_reply(id, message)).await?;
                    let first_id = first.get("id").cloned().unwrap_or(Value::Null);
                    self.send(&text_reply(first_id, &first)).await
                }
            },
            _ => self.send(&text_reply(id, message)).await,
        }
    }

    async fn send(&mut self, reply: &ReplyEnvelope) -> eyre::Result<()> {
        let line = encode_line(reply)?;
        if self.mode == Mode::Noise {
            self.stdout
                .write_all(b"stub diagnostic: preparing reply\n")
                .await?;
        }
        if self.mode == Mode::Fragment {
            for chunk in line.chunks(FRAGMENT_BYTES) {
                self.stdout.write_all(chunk).await?;
                self.stdout.flush().await?;
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        } else {
            self.stdout.write_all(&line).await?;
        }
        self.stdout.flush().await?;
        Ok(())
    }
}

fn text_reply(id: Value, message: &Value) -> ReplyEnvelope {
    let text = message
        .pointer("/params/arguments/echo")
        .and_then(Value::as_str)
        .unwrap_or("pong");
    ReplyEnvelope::result(
        id,
        json!({"content": [{"type": "text", "text": text}], "isError": false}),
    )
}
