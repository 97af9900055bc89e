//! Adapters implementing tool-server ports.

pub mod memory;
pub mod stdio;
