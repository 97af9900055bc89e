//! Record of one outstanding request.

use super::CorrelationId;
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::time::Duration;

/// An outstanding request awaiting its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    id: CorrelationId,
    method: String,
    tool_name: Option<String>,
    submitted_at: DateTime<Utc>,
    timeout: Duration,
}

impl PendingRequest {
    /// Records a request submitted now according to `clock`.
    #[must_use]
    pub fn new<C>(id: CorrelationId, method: impl Into<String>, timeout: Duration, clock: &C) -> Self
    where
        C: Clock + ?Sized,
    {
        Self {
            id,
            method: method.into(),
            tool_name: None,
            submitted_at: clock.utc(),
            timeout,
        }
    }

    /// Associates the tool name for `tools/call` requests.
    #[must_use]
    pub fn for_tool(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }

    /// Returns the correlation identifier.
    #[must_use]
    pub const fn id(&self) -> CorrelationId {
        self.id
    }

    /// Returns the JSON-RPC method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the tool name for tool calls.
    #[must_use]
    pub fn tool_name(&self) -> Option<&str> {
        self.tool_name.as_deref()
    }

    /// Returns when the request was submitted.
    #[must_use]
    pub const fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    /// Returns the configured timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns a label for log lines: the tool name or the method.
    #[must_use]
    pub fn label(&self) -> &str {
        self.tool_name.as_deref().unwrap_or(&self.method)
    }
}
