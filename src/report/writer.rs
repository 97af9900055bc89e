//! Persists rendered reports to a directory.

use super::ReportError;
use super::model::ObservabilityReport;
use super::render::{render_json, render_markdown};
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use std::sync::Arc;
use tracing::info;

/// Paths of the files written for one report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenReport {
    /// Markdown rendering.
    pub markdown: Utf8PathBuf,
    /// JSON rendering.
    pub json: Utf8PathBuf,
}

/// Writes `observability_report_<timestamp>.md` and `.json` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportWriter {
    directory: Utf8PathBuf,
}

impl ReportWriter {
    /// Creates a writer targeting `directory`.
    #[must_use]
    pub fn new(directory: impl Into<Utf8PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Returns the target directory.
    #[must_use]
    pub fn directory(&self) -> &Utf8Path {
        &self.directory
    }

    /// Renders `report` and writes both files, creating the directory if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Render`] when rendering fails and
    /// [`ReportError::Io`] when the directory or files cannot be written.
    pub fn write(&self, report: &ObservabilityReport) -> Result<WrittenReport, ReportError> {
        let markdown = render_markdown(report)?;
        let json = render_json(report)?;

        Dir::create_ambient_dir_all(&self.directory, ambient_authority())
            .map_err(|err| self.io_error(err))?;
        let dir = Dir::open_ambient_dir(&self.directory, ambient_authority())
            .map_err(|err| self.io_error(err))?;

        let stem = format!("observability_report_{}", report.file_stamp());
        let markdown_name = format!("{stem}.md");
        let json_name = format!("{stem}.json");
        dir.write(&markdown_name, markdown)
            .map_err(|err| self.io_error(err))?;
        dir.write(&json_name, json).map_err(|err| self.io_error(err))?;

        let written = WrittenReport {
            markdown: self.directory.join(markdown_name),
            json: self.directory.join(json_name),
        };
        info!(markdown = %written.markdown, json = %written.json, "report saved");
        Ok(written)
    }

    fn io_error(&self, source: std::io::Error) -> ReportError {
        ReportError::Io {
            path: self.directory.clone(),
            source: Arc::new(source),
        }
    }
}
