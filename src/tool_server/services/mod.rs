//! Application services for reaching tool servers.

mod session;

pub use session::{ToolSession, with_connection};
