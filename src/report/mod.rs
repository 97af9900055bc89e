//! Observability report built from a fixed sequence of tool probes.
//!
//! The collector fetches the server's tool catalog, runs each probe in
//! order and records what happened. Reports render to Markdown through a
//! `minijinja` template and to JSON, and can be written to a directory.

mod collector;
mod model;
mod probe;
mod render;
mod writer;

pub use collector::ReportCollector;
pub use model::{ObservabilityReport, ProbeOutcome, ProbeStatus, ReportStatus};
pub use probe::{ToolProbe, default_probes, parse_probes};
pub use render::{render_json, render_markdown};
pub use writer::{ReportWriter, WrittenReport};

use camino::Utf8PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while preparing, rendering or saving reports.
#[derive(Debug, Clone, Error)]
pub enum ReportError {
    /// A probe definition file could not be used.
    #[error("invalid probe definitions: {0}")]
    InvalidProbes(String),

    /// A rendering failed.
    #[error("failed to render report: {0}")]
    Render(String),

    /// Writing report files failed.
    #[error("failed to write report to {path}: {source}")]
    Io {
        /// Target directory.
        path: Utf8PathBuf,
        /// Underlying filesystem error.
        source: Arc<std::io::Error>,
    },
}
