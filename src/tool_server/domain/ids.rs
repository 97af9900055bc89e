//! Correlation identifiers for request/response matching.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier carried in the `id` field of a request envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(u64);

impl CorrelationId {
    /// Wraps a raw identifier value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub const fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Monotonic allocator of correlation identifiers for one connection.
///
/// Identifiers start at 1 and are never handed out twice, so a response
/// that arrives after its caller gave up cannot be matched to a newer call.
#[derive(Debug)]
pub struct CorrelationIdSequence {
    next: AtomicU64,
}

impl CorrelationIdSequence {
    /// Creates a sequence whose first identifier is 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocates the next identifier.
    pub fn allocate(&self) -> CorrelationId {
        CorrelationId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for CorrelationIdSequence {
    fn default() -> Self {
        Self::new()
    }
}
