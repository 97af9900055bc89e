//! Tool servers reached over a child process's stdin and stdout.
//!
//! A connection owns the child process, a background task that reads
//! newline-delimited JSON-RPC from stdout, and a serialized writer for
//! stdin. Responses are routed to callers by correlation identifier.

mod channel;
mod connection;
mod connector;
mod demux;
mod process;
mod reader;

pub use connection::{ConnectionTimeouts, MAX_TOOL_PAGES, StdioToolServerConnection};
pub use connector::StdioConnector;
