//! Integration tests driving the stub tool server over real pipes.
#![cfg(unix)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use rstest::rstest;
use serde_json::{Map, Value, json};
use tether::tool_server::adapters::stdio::StdioToolServerConnection;
use tether::tool_server::domain::{ConnectionState, LaunchConfig, ToolResult};
use tether::tool_server::ports::{ToolInvoker, ToolServerError};
use uuid::Uuid;

const STUB: &str = env!("CARGO_BIN_EXE_stub_tool_server");

fn stub_config(mode: &str) -> LaunchConfig {
    LaunchConfig::new(STUB)
        .expect("stub path is not empty")
        .with_env([("STUB_MODE".to_owned(), mode.to_owned())])
        .expect("valid env")
        .with_startup_timeout(Duration::from_secs(10))
        .expect("non-zero timeout")
        .with_shutdown_grace(Duration::from_millis(300))
        .expect("non-zero grace")
}

fn pid_file() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("tether-stub-{}.pid", Uuid::new_v4()))
}

fn with_pid_file(config: LaunchConfig, path: &std::path::Path) -> LaunchConfig {
    config
        .with_env([(
            "STUB_PID_FILE".to_owned(),
            path.to_string_lossy().into_owned(),
        )])
        .expect("valid env")
}

fn read_pid(path: &std::path::Path) -> Pid {
    let text = std::fs::read_to_string(path).expect("pid file written");
    let raw: i32 = text.trim().parse().expect("numeric pid");
    Pid::from_raw(raw)
}

fn process_gone(pid: Pid) -> bool {
    kill(pid, None) == Err(Errno::ESRCH)
}

fn echo_arguments(text: &str) -> Map<String, Value> {
    let mut arguments = Map::new();
    arguments.insert("echo".to_owned(), json!(text));
    arguments
}

fn first_text(result: ToolResult) -> String {
    result
        .into_output()
        .expect("successful call")
        .first_text()
        .expect("text block")
        .to_owned()
}

#[rstest]
#[case("echo")]
#[case("noise")]
#[case("fragment")]
#[tokio::test(flavor = "multi_thread")]
async fn ping_round_trip_yields_pong(#[case] mode: &str) {
    let connection = StdioToolServerConnection::open(&stub_config(mode))
        .await
        .expect("handshake succeeds");
    assert_eq!(connection.state(), ConnectionState::Ready);
    assert_eq!(
        connection.server_info().and_then(|info| info.name()),
        Some("stub_tool_server")
    );

    let result = connection
        .invoke("ping", Map::new())
        .await
        .expect("call succeeds");
    assert_eq!(first_text(result), "pong");

    connection.close().await.expect("close succeeds");
}

#[tokio::test(flavor = "multi_thread")]
async fn catalog_lists_stub_tools() {
    let connection = StdioToolServerConnection::open(&stub_config("noise"))
        .await
        .expect("handshake succeeds");

    let catalog = connection.list_tools().await.expect("catalog");

    assert_eq!(catalog.len(), 2);
    assert!(catalog.contains("ping"));
    assert!(catalog.contains("echo"));
    connection.close().await.expect("close succeeds");
}

#[tokio::test(flavor = "multi_thread")]
async fn open_then_close_leaves_no_process() {
    let path = pid_file();
    let connection = StdioToolServerConnection::open(&with_pid_file(stub_config("echo"), &path))
        .await
        .expect("handshake succeeds");
    let pid = read_pid(&path);
    assert!(connection.is_process_alive().await);

    connection.close().await.expect("close succeeds");
    connection.close().await.expect("second close is a no-op");

    assert_eq!(connection.state(), ConnectionState::Closed);
    assert!(process_gone(pid));
    std::fs::remove_file(&path).expect("remove pid file");
}

#[rstest]
#[case("bad_handshake")]
#[case("no_handshake")]
#[tokio::test(flavor = "multi_thread")]
async fn failed_handshake_leaves_no_process(#[case] mode: &str) {
    let path = pid_file();
    let config = with_pid_file(stub_config(mode), &path)
        .with_startup_timeout(Duration::from_millis(500))
        .expect("non-zero timeout");

    let err = StdioToolServerConnection::open(&config)
        .await
        .expect_err("handshake must fail");

    match mode {
        "bad_handshake" => assert!(matches!(err, ToolServerError::ProtocolViolation(_))),
        _ => assert!(matches!(err, ToolServerError::HandshakeTimeout { .. })),
    }
    assert!(process_gone(read_pid(&path)));
    std::fs::remove_file(&path).expect("remove pid file");
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_executable_is_a_spawn_error() {
    let config = LaunchConfig::new("/nonexistent/tether-tool-server").expect("valid command");

    let err = StdioToolServerConnection::open(&config)
        .await
        .expect_err("spawn must fail");

    assert!(matches!(err, ToolServerError::Spawn { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn reversed_replies_reach_their_callers() {
    let connection = StdioToolServerConnection::open(&stub_config("reverse"))
        .await
        .expect("handshake succeeds");

    let (first, second) = tokio::join!(
        connection.invoke("echo", echo_arguments("first")),
        connection.invoke("echo", echo_arguments("second")),
    );

    assert_eq!(first_text(first.expect("first call")), "first");
    assert_eq!(first_text(second.expect("second call")), "second");
    connection.close().await.expect("close succeeds");
}

#[tokio::test(flavor = "multi_thread")]
async fn error_object_becomes_a_failure_result() {
    let connection = StdioToolServerConnection::open(&stub_config("error"))
        .await
        .expect("handshake succeeds");

    let result = connection
        .invoke("ping", Map::new())
        .await
        .expect("error objects are results");

    let failure = result.into_output().expect_err("call failed");
    assert_eq!(failure.message(), "stub failure");
    assert_eq!(connection.state(), ConnectionState::Ready);
    connection.close().await.expect("close succeeds");
}

#[tokio::test(flavor = "multi_thread")]
async fn silent_server_times_out_within_bounds() {
    let connection = StdioToolServerConnection::open(&stub_config("silent"))
        .await
        .expect("handshake succeeds");
    let timeout = Duration::from_millis(400);

    let started = Instant::now();
    let err = connection
        .invoke_with_timeout("ping", Map::new(), timeout)
        .await
        .expect_err("call must time out");
    let elapsed = started.elapsed();

    assert!(matches!(err, ToolServerError::CallTimeout { .. }));
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout * 3);
    assert!(connection.outstanding_requests().is_empty());
    connection.close().await.expect("close succeeds");
}

#[tokio::test(flavor = "multi_thread")]
async fn crash_fails_every_outstanding_call() {
    let connection = Arc::new(
        StdioToolServerConnection::open(&stub_config("crash"))
            .await
            .expect("handshake succeeds"),
    );

    let calls: Vec<_> = (0..3)
        .map(|_| {
            let shared = Arc::clone(&connection);
            tokio::spawn(async move { shared.invoke("ping", Map::new()).await })
        })
        .collect();
    for call in calls {
        let err = call
            .await
            .expect("task completes")
            .expect_err("server crashed");
        assert!(err.is_connection_lost(), "unexpected error: {err}");
    }

    assert_eq!(connection.state(), ConnectionState::Failed);
    let after = connection
        .invoke("ping", Map::new())
        .await
        .expect_err("connection is gone");
    assert!(after.is_connection_lost());
    connection.close().await.expect("close reaps the process");
}

#[tokio::test(flavor = "multi_thread")]
async fn server_exit_is_noticed_while_a_descendant_holds_its_output() {
    // The backgrounded sleep inherits stdout, so no EOF follows the crash.
    let config = LaunchConfig::new("/bin/sh")
        .expect("shell path is not empty")
        .with_args(["-c".to_owned(), "sleep 8 & exec \"$TETHER_STUB\"".to_owned()])
        .with_env([
            ("STUB_MODE".to_owned(), "crash".to_owned()),
            ("TETHER_STUB".to_owned(), STUB.to_owned()),
        ])
        .expect("valid env")
        .with_startup_timeout(Duration::from_secs(10))
        .expect("non-zero timeout")
        .with_call_timeout(Duration::from_secs(5))
        .expect("non-zero timeout")
        .with_shutdown_grace(Duration::from_millis(300))
        .expect("non-zero grace");
    let connection = StdioToolServerConnection::open(&config)
        .await
        .expect("handshake succeeds");

    let started = Instant::now();
    let err = connection
        .invoke("ping", Map::new())
        .await
        .expect_err("server exited");

    assert!(err.is_connection_lost(), "unexpected error: {err}");
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(connection.state(), ConnectionState::Failed);
    assert!(!connection.is_process_alive().await);
    assert!(connection.outstanding_requests().is_empty());
    assert!(
        connection
            .invoke("ping", Map::new())
            .await
            .expect_err("connection is gone")
            .is_connection_lost()
    );
    connection.close().await.expect("close after exit");
    assert_eq!(connection.state(), ConnectionState::Closed);
}

#[tokio::test(flavor = "multi_thread")]
async fn close_escalates_against_a_stubborn_server() {
    let path = pid_file();
    let connection =
        StdioToolServerConnection::open(&with_pid_file(stub_config("stubborn"), &path))
            .await
            .expect("handshake succeeds");
    let pid = read_pid(&path);

    let started = Instant::now();
    connection.close().await.expect("close succeeds");

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(process_gone(pid));
    std::fs::remove_file(&path).expect("remove pid file");
}
