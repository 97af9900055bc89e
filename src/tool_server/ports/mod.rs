//! Port contracts for reaching tool servers.

mod connector;
mod invoker;

pub use connector::{ToolConnection, ToolServerConnector};
pub use invoker::{ToolInvoker, ToolServerError, ToolServerResult};
