//! Markdown and JSON renderings of a report.

use super::ReportError;
use super::model::ObservabilityReport;
use minijinja::{Environment, context};

const MARKDOWN_TEMPLATE: &str = "\
# Dynatrace Observability Analysis Report

**Generated:** {{ generated_at }}
**Duration:** {{ duration }} seconds
**Status:** {{ status | upper }}

---

## Analysis Results
{% for section in sections %}
### {{ section.title }}

*Tool:* `{{ section.tool_name }}` | *Result:* {{ section.status }}

{{ section.detail }}
{% else %}
No probes were run.
{% endfor %}
---

## Metadata

- **Run ID:** {{ run_id }}
- **Probes Run:** {{ sections | length }}
- **Probes Succeeded:** {{ succeeded }}
- **Tools Offered:** {{ catalog_size }}
- **Catalog Fingerprint:** {{ fingerprint }}
- **Analysis Type:** Sequential Tool Probes

---

*This report was generated by tether*
";

/// Renders the report as Markdown.
///
/// # Errors
///
/// Returns [`ReportError::Render`] when the template fails to render.
pub fn render_markdown(report: &ObservabilityReport) -> Result<String, ReportError> {
    let environment = Environment::new();
    let context = context! {
        generated_at => report.generated_at.to_rfc3339(),
        duration => format!("{:.2}", report.duration_seconds),
        status => report.status.as_str(),
        sections => &report.sections,
        run_id => report.run_id.to_string(),
        succeeded => report.succeeded(),
        catalog_size => report.catalog_size,
        fingerprint => report.catalog_fingerprint.as_deref().unwrap_or("N/A"),
    };
    environment
        .render_str(MARKDOWN_TEMPLATE, context)
        .map_err(|err| ReportError::Render(err.to_string()))
}

/// Renders the report as pretty-printed JSON.
///
/// # Errors
///
/// Returns [`ReportError::Render`] when serialization fails.
pub fn render_json(report: &ObservabilityReport) -> Result<String, ReportError> {
    serde_json::to_string_pretty(report).map_err(|err| ReportError::Render(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::model::{ProbeOutcome, ProbeStatus, ReportStatus};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn report() -> ObservabilityReport {
        ObservabilityReport {
            run_id: Uuid::nil(),
            generated_at: Utc
                .with_ymd_and_hms(2026, 10, 18, 9, 30, 0)
                .single()
                .expect("valid timestamp"),
            duration_seconds: 3.5,
            status: ReportStatus::Partial,
            catalog_size: 12,
            catalog_fingerprint: Some("abc123".to_owned()),
            sections: vec![
                ProbeOutcome {
                    title: "Active Problems".to_owned(),
                    tool_name: "list_problems".to_owned(),
                    status: ProbeStatus::Succeeded,
                    detail: "2 open problems".to_owned(),
                },
                ProbeOutcome {
                    title: "Security Vulnerabilities".to_owned(),
                    tool_name: "list_vulnerabilities".to_owned(),
                    status: ProbeStatus::Unavailable,
                    detail: "tool 'list_vulnerabilities' is not offered by the server".to_owned(),
                },
            ],
        }
    }

    #[test]
    fn markdown_carries_header_sections_and_metadata() {
        let markdown = render_markdown(&report()).expect("render");

        assert!(markdown.starts_with("# Dynatrace Observability Analysis Report"));
        assert!(markdown.contains("**Generated:** 2026-10-18T09:30:00+00:00"));
        assert!(markdown.contains("**Duration:** 3.50 seconds"));
        assert!(markdown.contains("**Status:** PARTIAL"));
        assert!(markdown.contains("### Active Problems"));
        assert!(markdown.contains("*Tool:* `list_vulnerabilities` | *Result:* unavailable"));
        assert!(markdown.contains("- **Probes Run:** 2"));
        assert!(markdown.contains("- **Probes Succeeded:** 1"));
        assert!(markdown.contains("- **Catalog Fingerprint:** abc123"));
    }

    #[test]
    fn markdown_notes_an_empty_run() {
        let mut empty = report();
        empty.sections.clear();
        empty.status = ReportStatus::Failed;

        let markdown = render_markdown(&empty).expect("render");

        assert!(markdown.contains("No probes were run."));
        assert!(markdown.contains("**Status:** FAILED"));
    }

    #[test]
    fn json_round_trips_the_report() {
        let original = report();
        let json = render_json(&original).expect("render");

        let parsed: ObservabilityReport = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, original);
        assert!(json.contains("\"status\": \"partial\""));
    }
}
