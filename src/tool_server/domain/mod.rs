//! Domain model for tool-server connections.
//!
//! The domain models correlation identifiers, the connection state machine,
//! launch configuration, invocation results and the discovered tool
//! catalog. Process and stream handling remain outside this boundary.

mod error;
mod ids;
mod launch;
mod pending;
mod policy;
mod result;
mod state;
mod tool;

pub use error::{ParseConnectionPolicyError, ParseConnectionStateError, ToolServerDomainError};
pub use ids::{CorrelationId, CorrelationIdSequence};
pub use launch::{
    DEFAULT_CALL_TIMEOUT, DEFAULT_SHUTDOWN_GRACE, DEFAULT_STARTUP_TIMEOUT, LaunchConfig,
};
pub use pending::PendingRequest;
pub use policy::ConnectionPolicy;
pub use result::{ContentBlock, FailureCause, ToolFailure, ToolOutput, ToolResult};
pub use state::{ConnectionState, ConnectionStateCell};
pub use tool::{ToolCatalog, ToolDescriptor};
