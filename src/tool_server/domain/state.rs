//! Connection lifecycle state machine.

use super::{ParseConnectionStateError, ToolServerDomainError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Lifecycle state of a tool-server connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// The process has not been launched yet.
    Unstarted,
    /// The process is running and the initialize exchange is in flight.
    Handshaking,
    /// The handshake completed and tool calls may be issued.
    Ready,
    /// Teardown is in progress.
    Closing,
    /// Teardown finished. Terminal.
    Closed,
    /// The server process exited or its stream closed unexpectedly.
    Failed,
}

impl ConnectionState {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unstarted => "unstarted",
            Self::Handshaking => "handshaking",
            Self::Ready => "ready",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Failed => "failed",
        }
    }

    /// Returns whether tool calls may be issued in this state.
    #[must_use]
    pub const fn can_invoke(self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Returns whether the connection has an active process that teardown
    /// must still release.
    #[must_use]
    pub const fn needs_teardown(self) -> bool {
        matches!(self, Self::Handshaking | Self::Ready | Self::Failed)
    }

    /// Returns whether transition to `target` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Unstarted, Self::Handshaking)
                | (Self::Handshaking, Self::Ready | Self::Closing | Self::Failed)
                | (Self::Ready, Self::Closing | Self::Failed)
                | (Self::Failed, Self::Closing)
                | (Self::Closing, Self::Closed)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ConnectionState {
    type Error = ParseConnectionStateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "unstarted" => Ok(Self::Unstarted),
            "handshaking" => Ok(Self::Handshaking),
            "ready" => Ok(Self::Ready),
            "closing" => Ok(Self::Closing),
            "closed" => Ok(Self::Closed),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseConnectionStateError(value.to_owned())),
        }
    }
}

/// Shared, thread-safe holder for a connection's current state.
///
/// Both the caller-facing connection and its background reader task update
/// the state, so every transition is validated under one lock.
#[derive(Debug)]
pub struct ConnectionStateCell {
    state: Mutex<ConnectionState>,
}

impl ConnectionStateCell {
    /// Creates a cell in the [`ConnectionState::Unstarted`] state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Unstarted),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn current(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves to `target` if the transition is allowed.
    ///
    /// # Errors
    ///
    /// Returns [`ToolServerDomainError::InvalidStateTransition`] when the
    /// current state does not allow moving to `target`.
    pub fn transition_to(&self, target: ConnectionState) -> Result<(), ToolServerDomainError> {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !guard.can_transition_to(target) {
            return Err(ToolServerDomainError::InvalidStateTransition {
                from: *guard,
                to: target,
            });
        }
        *guard = target;
        Ok(())
    }

    /// Moves to [`ConnectionState::Failed`] unless teardown already began.
    ///
    /// Returns `true` when this call performed the transition.
    pub fn mark_failed(&self) -> bool {
        self.transition_to(ConnectionState::Failed).is_ok()
    }
}

impl Default for ConnectionStateCell {
    fn default() -> Self {
        Self::new()
    }
}
