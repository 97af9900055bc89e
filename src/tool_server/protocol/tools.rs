//! `tools/call` and `tools/list` payloads.

use super::{DecodeError, RpcError};
use crate::tool_server::domain::{
    ContentBlock, FailureCause, ToolDescriptor, ToolFailure, ToolOutput, ToolResult,
};
use serde_json::{Map, Value, json};

/// Builds `tools/call` parameters. Arguments pass through untouched.
#[must_use]
pub fn call_params(tool_name: &str, arguments: Map<String, Value>) -> Value {
    json!({
        "name": tool_name,
        "arguments": Value::Object(arguments),
    })
}

/// Builds `tools/list` parameters for an optional pagination cursor.
#[must_use]
pub fn list_params(cursor: Option<&str>) -> Option<Value> {
    cursor.map(|value| json!({ "cursor": value }))
}

/// Wraps a JSON-RPC error object as a failure result.
#[must_use]
pub fn error_result(tool_name: &str, error: RpcError) -> ToolResult {
    ToolResult::Failure(ToolFailure::new(
        tool_name,
        error.message,
        FailureCause::ServerError {
            code: error.code,
            data: error.data,
        },
    ))
}

/// Decodes a `tools/call` result member.
///
/// # Errors
///
/// Returns [`DecodeError`] when the result is not an object, `content` is
/// not an array, or a content block lacks its required members.
pub fn decode_call_result(tool_name: &str, result: Value) -> Result<ToolResult, DecodeError> {
    let Value::Object(mut object) = result else {
        return Err(DecodeError::new("tools/call result is not an object"));
    };

    let content = match object.remove("content") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(blocks)) => blocks
            .into_iter()
            .map(decode_content_block)
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(DecodeError::new("content member is not an array")),
    };

    let is_error = object
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if is_error {
        let output = ToolOutput::new(content.clone());
        let text = output.text();
        let message = if text.trim().is_empty() {
            "tool reported an error".to_owned()
        } else {
            text
        };
        return Ok(ToolResult::Failure(ToolFailure::new(
            tool_name,
            message,
            FailureCause::ToolError { content },
        )));
    }

    let output = match object.remove("structuredContent") {
        Some(structured) if !structured.is_null() => {
            ToolOutput::new(content).with_structured_content(structured)
        }
        _ => ToolOutput::new(content),
    };
    Ok(ToolResult::Success(output))
}

fn decode_content_block(block: Value) -> Result<ContentBlock, DecodeError> {
    let kind = block
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| DecodeError::new("content block lacks a string type"))?
        .to_owned();

    if kind == "text" {
        let text = block
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| DecodeError::new("text content block lacks a string text member"))?;
        return Ok(ContentBlock::text(text));
    }

    Ok(ContentBlock::Other {
        tag: kind,
        payload: block,
    })
}

/// One page of a `tools/list` response.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolsPage {
    /// Tools on this page.
    pub tools: Vec<ToolDescriptor>,
    /// Cursor for the next page, if any.
    pub next_cursor: Option<String>,
}

/// Decodes a `tools/list` result member.
///
/// # Errors
///
/// Returns [`DecodeError`] when `tools` is missing or an entry lacks a name.
pub fn decode_tools_page(result: &Value) -> Result<ToolsPage, DecodeError> {
    let entries = result
        .get("tools")
        .and_then(Value::as_array)
        .ok_or_else(|| DecodeError::new("tools/list result lacks a tools array"))?;

    let tools = entries
        .iter()
        .map(|entry| {
            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| DecodeError::new("tool entry lacks a string name"))?;
            let description = entry
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let input_schema = entry
                .get("inputSchema")
                .cloned()
                .unwrap_or_else(|| json!({"type": "object"}));
            ToolDescriptor::new(name, description, input_schema)
                .map_err(|err| DecodeError::new(err.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let next_cursor = result
        .get("nextCursor")
        .and_then(Value::as_str)
        .filter(|cursor| !cursor.is_empty())
        .map(str::to_owned);

    Ok(ToolsPage { tools, next_cursor })
}
