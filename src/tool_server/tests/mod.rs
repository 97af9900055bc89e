//! Cross-layer tests for tool-server connections and sessions.

mod session_tests;
