//! Connection policy tests against the scripted connector.

use crate::tool_server::adapters::memory::{
    ScriptedConnector, ScriptedReply, ScriptedToolInvoker,
};
use crate::tool_server::domain::{
    ConnectionPolicy, ContentBlock, ToolDescriptor, ToolOutput, ToolResult,
};
use crate::tool_server::ports::{ToolInvoker, ToolServerError};
use crate::tool_server::services::{ToolSession, with_connection};
use rstest::{fixture, rstest};
use serde_json::{Map, json};
use std::sync::Arc;

#[fixture]
fn connector() -> ScriptedConnector {
    let script = ScriptedToolInvoker::new();
    script
        .add_tool(
            ToolDescriptor::new("ping", "Answers pong", json!({"type": "object"}))
                .expect("valid descriptor"),
        )
        .expect("script");
    script
        .set_reply(
            "ping",
            ScriptedReply::Result(ToolResult::Success(ToolOutput::new(vec![
                ContentBlock::text("pong"),
            ]))),
        )
        .expect("script");
    script
        .set_reply(
            "crash",
            ScriptedReply::Error(ToolServerError::ConnectionLost("server exited".to_owned())),
        )
        .expect("script");
    ScriptedConnector::new(script)
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn persistent_policy_reuses_one_connection(connector: ScriptedConnector) {
    let shared = Arc::new(connector);
    let session = ToolSession::new(Arc::clone(&shared), ConnectionPolicy::Persistent);

    assert!(!session.is_connected().await);
    session.invoke("ping", Map::new()).await.expect("first call");
    session.invoke("ping", Map::new()).await.expect("second call");
    session.list_tools().await.expect("catalog");

    assert_eq!(shared.opens(), 1);
    assert!(session.is_connected().await);

    session.close().await.expect("close");
    session.close().await.expect("second close");
    assert_eq!(shared.closes(), 1);
    assert!(!session.is_connected().await);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn per_call_policy_opens_and_closes_every_time(connector: ScriptedConnector) {
    let shared = Arc::new(connector);
    let session = ToolSession::new(Arc::clone(&shared), ConnectionPolicy::PerCall);

    session.invoke("ping", Map::new()).await.expect("first call");
    session.list_tools().await.expect("catalog");

    assert_eq!(shared.opens(), 2);
    assert_eq!(shared.closes(), 2);
    assert!(!session.is_connected().await);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_persistent_connection_is_not_reopened(connector: ScriptedConnector) {
    let shared = Arc::new(connector);
    let session = ToolSession::new(Arc::clone(&shared), ConnectionPolicy::Persistent);

    let lost = session
        .invoke("crash", Map::new())
        .await
        .expect_err("crash loses the connection");
    assert!(lost.is_connection_lost());

    let still_lost = session
        .invoke("ping", Map::new())
        .await
        .expect_err("no automatic reopen");
    assert!(still_lost.is_connection_lost());
    assert_eq!(shared.opens(), 1);

    session.close().await.expect("close failed connection");
    session
        .invoke("ping", Map::new())
        .await
        .expect("reconnects after close");
    assert_eq!(shared.opens(), 2);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn with_connection_closes_after_failed_work(connector: ScriptedConnector) {
    let result = with_connection(&connector, |connection| async move {
        connection.invoke("crash", Map::new()).await
    })
    .await;

    assert!(result.expect_err("work fails").is_connection_lost());
    assert_eq!(connector.opens(), 1);
    assert_eq!(connector.closes(), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn refused_connection_is_reported_and_nothing_is_held(connector: ScriptedConnector) {
    let refusing = Arc::new(connector.refusing(ToolServerError::ProtocolViolation(
        "bad handshake".to_owned(),
    )));
    let session = ToolSession::new(Arc::clone(&refusing), ConnectionPolicy::Persistent);

    let err = session
        .invoke("ping", Map::new())
        .await
        .expect_err("connect fails");

    assert!(matches!(err, ToolServerError::ProtocolViolation(_)));
    assert!(!session.is_connected().await);
    assert_eq!(refusing.opens(), 0);
}
