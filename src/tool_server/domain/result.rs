//! Tagged outcome of a tool invocation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// One block of content returned by a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ContentBlock {
    /// Plain text content.
    Text {
        /// Text value.
        text: String,
    },
    /// Any other content kind (images, embedded resources), kept verbatim.
    Other {
        /// Kind tag reported by the server.
        tag: String,
        /// Raw JSON block.
        payload: Value,
    },
}

impl ContentBlock {
    /// Creates a text block.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text { text: value.into() }
    }

    /// Returns the kind tag of the block.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Text { .. } => "text",
            Self::Other { tag, .. } => tag,
        }
    }

    /// Returns the text value for text blocks.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Other { .. } => None,
        }
    }
}

/// Successful tool output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    content: Vec<ContentBlock>,
    structured_content: Option<Value>,
}

impl ToolOutput {
    /// Creates an output from ordered content blocks.
    #[must_use]
    pub const fn new(content: Vec<ContentBlock>) -> Self {
        Self {
            content,
            structured_content: None,
        }
    }

    /// Attaches the optional structured result some servers return
    /// alongside the content blocks.
    #[must_use]
    pub fn with_structured_content(mut self, value: Value) -> Self {
        self.structured_content = Some(value);
        self
    }

    /// Returns the content blocks in server order.
    #[must_use]
    pub fn content(&self) -> &[ContentBlock] {
        &self.content
    }

    /// Returns the structured result, if any.
    #[must_use]
    pub const fn structured_content(&self) -> Option<&Value> {
        self.structured_content.as_ref()
    }

    /// Returns the first text block.
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(ContentBlock::as_text)
    }

    /// Joins every text block with newlines.
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Why a tool invocation produced a failure result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FailureCause {
    /// The server answered with a JSON-RPC error object.
    ServerError {
        /// JSON-RPC error code.
        code: i64,
        /// Optional structured error data.
        data: Option<Value>,
    },
    /// The call succeeded at the protocol level but the tool flagged its
    /// result with `isError`.
    ToolError {
        /// Content blocks describing the failure.
        content: Vec<ContentBlock>,
    },
}

/// Failure descriptor for a tool invocation.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("tool '{tool_name}' failed: {message}")]
pub struct ToolFailure {
    tool_name: String,
    message: String,
    cause: FailureCause,
}

impl ToolFailure {
    /// Creates a failure descriptor.
    #[must_use]
    pub fn new(tool_name: impl Into<String>, message: impl Into<String>, cause: FailureCause) -> Self {
        Self {
            tool_name: tool_name.into(),
            message: message.into(),
            cause,
        }
    }

    /// Returns the tool that failed.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Returns the failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the originating cause.
    #[must_use]
    pub const fn cause(&self) -> &FailureCause {
        &self.cause
    }
}

/// Outcome of a tool invocation, decided once at the protocol boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ToolResult {
    /// The tool produced output.
    Success(ToolOutput),
    /// The server or the tool reported a failure.
    Failure(ToolFailure),
}

impl ToolResult {
    /// Returns whether this is a success result.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns the success output, if any.
    #[must_use]
    pub const fn output(&self) -> Option<&ToolOutput> {
        match self {
            Self::Success(output) => Some(output),
            Self::Failure(_) => None,
        }
    }

    /// Converts into a `Result`, turning failures into errors.
    ///
    /// # Errors
    ///
    /// Returns the [`ToolFailure`] for failure results.
    pub fn into_output(self) -> Result<ToolOutput, ToolFailure> {
        match self {
            Self::Success(output) => Ok(output),
            Self::Failure(failure) => Err(failure),
        }
    }
}

impl fmt::Display for ToolResult {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(output) => formatter.write_str(&output.text()),
            Self::Failure(failure) => write!(formatter, "{failure}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_joins_only_text_blocks() {
        let output = ToolOutput::new(vec![
            ContentBlock::text("first"),
            ContentBlock::Other {
                tag: "image".to_owned(),
                payload: json!({"type": "image", "data": "AAAA"}),
            },
            ContentBlock::text("second"),
        ]);

        assert_eq!(output.first_text(), Some("first"));
        assert_eq!(output.text(), "first\nsecond");
    }

    #[test]
    fn failure_is_distinguishable_from_empty_success() {
        let empty = ToolResult::Success(ToolOutput::new(Vec::new()));
        let failed = ToolResult::Failure(ToolFailure::new(
            "list_problems",
            "boom",
            FailureCause::ServerError {
                code: -32000,
                data: None,
            },
        ));

        assert!(empty.is_success());
        assert!(!failed.is_success());
        assert_eq!(
            failed
                .into_output()
                .expect_err("failure should convert to an error")
                .message(),
            "boom"
        );
    }
}
