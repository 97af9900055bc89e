//! Tool probes the report collector runs.

use super::ReportError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One named tool call contributing a report section.
///
/// Arguments are passed to the server untouched; the server's catalog is
/// the only authority on which argument names a tool accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolProbe {
    /// Section heading in the report.
    pub title: String,
    /// Tool to invoke.
    pub tool_name: String,
    /// Arguments for the call.
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolProbe {
    /// Creates a probe with no arguments.
    #[must_use]
    pub fn new(title: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            tool_name: tool_name.into(),
            arguments: Map::new(),
        }
    }

    /// Replaces the call arguments.
    #[must_use]
    pub fn with_arguments(mut self, arguments: Map<String, Value>) -> Self {
        self.arguments = arguments;
        self
    }
}

/// Probes used when none are configured.
#[must_use]
pub fn default_probes() -> Vec<ToolProbe> {
    vec![
        ToolProbe::new("Active Problems", "list_problems"),
        ToolProbe::new("Security Vulnerabilities", "list_vulnerabilities"),
        ToolProbe::new("Environment", "get_environment_info"),
    ]
}

/// Parses probes from a JSON array.
///
/// # Errors
///
/// Returns [`ReportError::InvalidProbes`] when the text is not an array of
/// probes or a probe has an empty title or tool name.
pub fn parse_probes(text: &str) -> Result<Vec<ToolProbe>, ReportError> {
    let probes: Vec<ToolProbe> =
        serde_json::from_str(text).map_err(|err| ReportError::InvalidProbes(err.to_string()))?;
    if let Some(blank) = probes
        .iter()
        .position(|probe| probe.title.trim().is_empty() || probe.tool_name.trim().is_empty())
    {
        return Err(ReportError::InvalidProbes(format!(
            "probe {blank} needs a non-empty title and tool_name"
        )));
    }
    Ok(probes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_probe_files_with_optional_arguments() {
        let probes = parse_probes(
            r#"[
                {"title": "Problems", "tool_name": "list_problems"},
                {"title": "Errors", "tool_name": "execute_dql",
                 "arguments": {"dqlStatement": "fetch logs | limit 5"}}
            ]"#,
        )
        .expect("valid probes");

        assert_eq!(probes.len(), 2);
        assert!(probes[0].arguments.is_empty());
        assert_eq!(
            probes[1].arguments.get("dqlStatement"),
            Some(&json!("fetch logs | limit 5"))
        );
    }

    #[test]
    fn rejects_blank_tool_names() {
        let err = parse_probes(r#"[{"title": "Problems", "tool_name": " "}]"#)
            .expect_err("blank tool name");

        assert!(matches!(err, ReportError::InvalidProbes(_)));
    }

    #[test]
    fn default_probes_send_no_arguments() {
        assert!(
            default_probes()
                .iter()
                .all(|probe| probe.arguments.is_empty())
        );
    }
}
