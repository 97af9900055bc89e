//! JSON-RPC 2.0 envelopes and inbound line classification.

use crate::tool_server::domain::CorrelationId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Protocol version tag carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC error code for an unknown method.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Maximum number of characters of a discarded line kept for logging.
const NOISE_PREVIEW_CHARS: usize = 120;

/// Outbound request envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestEnvelope {
    jsonrpc: &'static str,
    id: CorrelationId,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl RequestEnvelope {
    /// Creates a request envelope.
    #[must_use]
    pub fn new(id: CorrelationId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }

    /// Returns the correlation identifier.
    #[must_use]
    pub const fn id(&self) -> CorrelationId {
        self.id
    }

    /// Returns the method name.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }
}

/// Outbound notification envelope (no identifier, no reply).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationEnvelope {
    jsonrpc: &'static str,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl NotificationEnvelope {
    /// Creates a notification envelope.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }
}

/// Reply this client sends to a server-initiated request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplyEnvelope {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

impl ReplyEnvelope {
    /// Creates a success reply.
    #[must_use]
    pub const fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Creates an error reply.
    #[must_use]
    pub const fn error(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Creates an error object without data.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// Payload of a response envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    /// The `result` member.
    Result(Value),
    /// The `error` member.
    Error(RpcError),
}

/// Inbound response envelope matched to a request by identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    /// Identifier of the request this answers.
    pub id: CorrelationId,
    /// Result or error payload.
    pub outcome: ResponseOutcome,
}

/// Request the server sent to this client.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerRequest {
    /// Raw identifier, echoed back verbatim in the reply.
    pub id: Value,
    /// Requested method.
    pub method: String,
}

/// Classification of one inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundLine {
    /// Empty or whitespace-only line.
    Blank,
    /// Non-JSON diagnostic output, discarded.
    Noise {
        /// Leading characters of the line, for logging.
        preview: String,
    },
    /// A well-formed response.
    Response(ResponseEnvelope),
    /// A line addressed to a request identifier that is not a valid
    /// response envelope.
    Malformed {
        /// Identifier the line claimed to answer.
        id: CorrelationId,
        /// What was wrong with it.
        reason: String,
    },
    /// A server notification (method without identifier).
    Notification {
        /// Notification method.
        method: String,
    },
    /// A server-initiated request.
    ServerRequest(ServerRequest),
    /// JSON that cannot be routed to any request.
    Unroutable {
        /// Why the line could not be routed.
        reason: String,
    },
}

/// Classifies one line read from the server's stdout.
///
/// Non-JSON output is noise. JSON objects are routed by their `id` and
/// `method` members only; arrival order never matters.
#[must_use]
pub fn classify_line(line: &str) -> InboundLine {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return InboundLine::Blank;
    }

    let Ok(Value::Object(object)) = serde_json::from_str::<Value>(trimmed) else {
        return InboundLine::Noise {
            preview: trimmed.chars().take(NOISE_PREVIEW_CHARS).collect(),
        };
    };

    if let Some(method_value) = object.get("method") {
        let Some(method) = method_value.as_str() else {
            return InboundLine::Unroutable {
                reason: "method member is not a string".to_owned(),
            };
        };
        return match object.get("id") {
            Some(id) if !id.is_null() => InboundLine::ServerRequest(ServerRequest {
                id: id.clone(),
                method: method.to_owned(),
            }),
            _ => InboundLine::Notification {
                method: method.to_owned(),
            },
        };
    }

    let Some(id) = object.get("id").and_then(parse_correlation_id) else {
        return InboundLine::Unroutable {
            reason: "response has no usable numeric id".to_owned(),
        };
    };

    classify_response(id, &object)
}

fn classify_response(id: CorrelationId, object: &Map<String, Value>) -> InboundLine {
    let malformed = |reason: &str| InboundLine::Malformed {
        id,
        reason: reason.to_owned(),
    };

    if let Some(version) = object.get("jsonrpc") {
        if version.as_str() != Some(JSONRPC_VERSION) {
            return malformed("jsonrpc member is not \"2.0\"");
        }
    }

    match (object.get("result"), object.get("error")) {
        (Some(_), Some(_)) => malformed("response carries both result and error"),
        (Some(result), None) => InboundLine::Response(ResponseEnvelope {
            id,
            outcome: ResponseOutcome::Result(result.clone()),
        }),
        (None, Some(error)) => serde_json::from_value::<RpcError>(error.clone()).map_or_else(
            |err| malformed(&format!("invalid error object: {err}")),
            |rpc_error| {
                InboundLine::Response(ResponseEnvelope {
                    id,
                    outcome: ResponseOutcome::Error(rpc_error),
                })
            },
        ),
        (None, None) => malformed("response carries neither result nor error"),
    }
}

fn parse_correlation_id(value: &Value) -> Option<CorrelationId> {
    match value {
        Value::Number(number) => number.as_u64().map(CorrelationId::from_raw),
        Value::String(text) => text.trim().parse().ok().map(CorrelationId::from_raw),
        _ => None,
    }
}

/// Serializes an envelope as one newline-terminated line.
///
/// # Errors
///
/// Returns the `serde_json` error when serialization fails.
pub fn encode_line<T: Serialize>(envelope: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec(envelope)?;
    bytes.push(b'\n');
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn request_envelope_serializes_to_one_line() {
        let envelope = RequestEnvelope::new(
            CorrelationId::from_raw(7),
            "tools/call",
            Some(json!({"name": "ping", "arguments": {}})),
        );
        let bytes = encode_line(&envelope).expect("serializable");

        assert_eq!(bytes.last(), Some(&b'\n'));
        assert_eq!(bytes.iter().filter(|byte| **byte == b'\n').count(), 1);
        let parsed: Value = serde_json::from_slice(&bytes).expect("valid json");
        assert_eq!(
            parsed,
            json!({
                "jsonrpc": "2.0",
                "id": 7,
                "method": "tools/call",
                "params": {"name": "ping", "arguments": {}}
            })
        );
    }

    #[test]
    fn notification_omits_id_and_absent_params() {
        let bytes = encode_line(&NotificationEnvelope::new("notifications/initialized", None))
            .expect("serializable");
        let parsed: Value = serde_json::from_slice(&bytes).expect("valid json");

        assert_eq!(
            parsed,
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"})
        );
    }

    #[rstest]
    #[case("")]
    #[case("   \r")]
    fn blank_lines_are_blank(#[case] line: &str) {
        assert_eq!(classify_line(line), InboundLine::Blank);
    }

    #[rstest]
    #[case("Downloading @dynatrace-oss/dynatrace-mcp-server...")]
    #[case("42")]
    #[case("[1, 2]")]
    #[case("{\"truncated\":")]
    fn non_object_lines_are_noise(#[case] line: &str) {
        assert!(matches!(classify_line(line), InboundLine::Noise { .. }));
    }

    #[test]
    fn result_line_becomes_response() {
        let line = r#"{"jsonrpc":"2.0","id":3,"result":{"content":[]}}"#;

        assert_eq!(
            classify_line(line),
            InboundLine::Response(ResponseEnvelope {
                id: CorrelationId::from_raw(3),
                outcome: ResponseOutcome::Result(json!({"content": []})),
            })
        );
    }

    #[test]
    fn error_line_becomes_error_response() {
        let line = r#"{"jsonrpc":"2.0","id":4,"error":{"code":-32000,"message":"nope"}}"#;

        assert_eq!(
            classify_line(line),
            InboundLine::Response(ResponseEnvelope {
                id: CorrelationId::from_raw(4),
                outcome: ResponseOutcome::Error(RpcError::new(-32000, "nope")),
            })
        );
    }

    #[rstest]
    #[case(r#"{"jsonrpc":"2.0","id":5}"#)]
    #[case(r#"{"jsonrpc":"2.0","id":5,"result":{},"error":{"code":1,"message":"x"}}"#)]
    #[case(r#"{"jsonrpc":"2.0","id":5,"error":"flat string"}"#)]
    #[case(r#"{"jsonrpc":"1.0","id":5,"result":{}}"#)]
    fn invalid_envelopes_with_id_are_malformed(#[case] line: &str) {
        assert!(matches!(
            classify_line(line),
            InboundLine::Malformed { id, .. } if id == CorrelationId::from_raw(5)
        ));
    }

    #[test]
    fn method_without_id_is_notification() {
        let line = r#"{"jsonrpc":"2.0","method":"notifications/message","params":{}}"#;

        assert_eq!(
            classify_line(line),
            InboundLine::Notification {
                method: "notifications/message".to_owned()
            }
        );
    }

    #[test]
    fn method_with_id_is_server_request() {
        let line = r#"{"jsonrpc":"2.0","id":"srv-1","method":"ping"}"#;

        assert_eq!(
            classify_line(line),
            InboundLine::ServerRequest(ServerRequest {
                id: json!("srv-1"),
                method: "ping".to_owned(),
            })
        );
    }

    #[rstest]
    #[case(r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"Parse error"}}"#)]
    #[case(r#"{"jsonrpc":"2.0","id":-1,"result":{}}"#)]
    #[case(r#"{"jsonrpc":"2.0","result":{}}"#)]
    fn responses_without_usable_id_are_unroutable(#[case] line: &str) {
        assert!(matches!(
            classify_line(line),
            InboundLine::Unroutable { .. }
        ));
    }
}
