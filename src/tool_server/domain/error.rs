//! Error types for tool-server domain validation and parsing.

use super::ConnectionState;
use thiserror::Error;

/// Errors returned while constructing tool-server domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolServerDomainError {
    /// The launch command is empty after trimming.
    #[error("tool server command must not be empty")]
    EmptyCommand,

    /// The working directory is empty after trimming.
    #[error("tool server working directory must not be empty when provided")]
    EmptyWorkingDirectory,

    /// An environment override key is empty or contains `=`.
    #[error("invalid environment variable name '{0}'")]
    InvalidEnvironmentKey(String),

    /// A configured duration is zero.
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    /// A tool name is empty after trimming.
    #[error("tool name must not be empty")]
    EmptyToolName,

    /// Transitioning between two connection states is invalid.
    #[error("invalid connection state transition: {from} -> {to}")]
    InvalidStateTransition {
        /// Current connection state.
        from: ConnectionState,
        /// Requested target state.
        to: ConnectionState,
    },
}

/// Error returned while parsing a connection state from text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown connection state: {0}")]
pub struct ParseConnectionStateError(pub String);

/// Error returned while parsing a connection policy from text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown connection policy: {0} (expected 'persistent' or 'per_call')")]
pub struct ParseConnectionPolicyError(pub String);
