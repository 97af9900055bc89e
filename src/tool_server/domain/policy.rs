//! Connection reuse policy.

use super::ParseConnectionPolicyError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a session maps tool calls onto server processes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPolicy {
    /// One server process is opened lazily and reused for every call.
    #[default]
    Persistent,
    /// Every call gets a fresh server process that is closed afterwards.
    PerCall,
}

impl ConnectionPolicy {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Persistent => "persistent",
            Self::PerCall => "per_call",
        }
    }
}

impl fmt::Display for ConnectionPolicy {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ConnectionPolicy {
    type Error = ParseConnectionPolicyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "persistent" => Ok(Self::Persistent),
            "per_call" => Ok(Self::PerCall),
            _ => Err(ParseConnectionPolicyError(value.to_owned())),
        }
    }
}
