//! Report data collected from one probe run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// How a single probe ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    /// The tool answered successfully.
    Succeeded,
    /// The tool or the connection reported an error.
    Failed,
    /// The tool could not be reached or is not offered.
    Unavailable,
}

impl ProbeStatus {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// One report section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    /// Section heading.
    pub title: String,
    /// Tool that was probed.
    pub tool_name: String,
    /// How the probe ended.
    pub status: ProbeStatus,
    /// Text returned by the tool, or the failure message.
    pub detail: String,
}

/// Overall result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Every probe succeeded.
    Complete,
    /// Some probes succeeded.
    Partial,
    /// No probe succeeded, or there were none.
    Failed,
}

impl ReportStatus {
    /// Derives the status from probe outcomes.
    #[must_use]
    pub fn from_outcomes(outcomes: &[ProbeOutcome]) -> Self {
        let succeeded = outcomes
            .iter()
            .filter(|outcome| outcome.status == ProbeStatus::Succeeded)
            .count();
        if succeeded == 0 {
            Self::Failed
        } else if succeeded == outcomes.len() {
            Self::Complete
        } else {
            Self::Partial
        }
    }

    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Everything a probe run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservabilityReport {
    /// Unique identifier of the run.
    pub run_id: Uuid,
    /// When the run started.
    pub generated_at: DateTime<Utc>,
    /// Wall-clock duration of the run in seconds.
    pub duration_seconds: f64,
    /// Overall status.
    pub status: ReportStatus,
    /// Number of tools the server offered.
    pub catalog_size: usize,
    /// Fingerprint of the catalog, when it could be fetched.
    pub catalog_fingerprint: Option<String>,
    /// Sections in probe order.
    pub sections: Vec<ProbeOutcome>,
}

impl ObservabilityReport {
    /// Returns how many probes succeeded.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.sections
            .iter()
            .filter(|section| section.status == ProbeStatus::Succeeded)
            .count()
    }

    /// Returns the timestamp used in report file names.
    #[must_use]
    pub fn file_stamp(&self) -> String {
        self.generated_at.format("%Y-%m-%dT%H-%M-%S").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn outcome(status: ProbeStatus) -> ProbeOutcome {
        ProbeOutcome {
            title: "Problems".to_owned(),
            tool_name: "list_problems".to_owned(),
            status,
            detail: String::new(),
        }
    }

    #[rstest]
    #[case(vec![], ReportStatus::Failed)]
    #[case(vec![ProbeStatus::Succeeded, ProbeStatus::Succeeded], ReportStatus::Complete)]
    #[case(vec![ProbeStatus::Succeeded, ProbeStatus::Unavailable], ReportStatus::Partial)]
    #[case(vec![ProbeStatus::Failed, ProbeStatus::Unavailable], ReportStatus::Failed)]
    fn status_follows_probe_outcomes(
        #[case] statuses: Vec<ProbeStatus>,
        #[case] expected: ReportStatus,
    ) {
        let outcomes: Vec<_> = statuses.into_iter().map(outcome).collect();

        assert_eq!(ReportStatus::from_outcomes(&outcomes), expected);
    }
}
