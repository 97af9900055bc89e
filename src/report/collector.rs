//! Runs tool probes and assembles the report.

use super::model::{ObservabilityReport, ProbeOutcome, ProbeStatus, ReportStatus};
use super::probe::{ToolProbe, default_probes};
use crate::tool_server::domain::{ToolCatalog, ToolResult};
use crate::tool_server::ports::ToolInvoker;
use mockable::Clock;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Runs a fixed sequence of probes against a [`ToolInvoker`].
///
/// Probes run one after another in configuration order. A probe failure
/// never stops the run; it is recorded in the report instead.
#[derive(Debug, Clone)]
pub struct ReportCollector<I, C>
where
    I: ToolInvoker,
    C: Clock + Send + Sync,
{
    invoker: Arc<I>,
    clock: Arc<C>,
    probes: Vec<ToolProbe>,
}

impl<I, C> ReportCollector<I, C>
where
    I: ToolInvoker,
    C: Clock + Send + Sync,
{
    /// Creates a collector running the default probes.
    #[must_use]
    pub fn new(invoker: Arc<I>, clock: Arc<C>) -> Self {
        Self {
            invoker,
            clock,
            probes: default_probes(),
        }
    }

    /// Replaces the probes to run.
    #[must_use]
    pub fn with_probes(mut self, probes: Vec<ToolProbe>) -> Self {
        self.probes = probes;
        self
    }

    /// Returns the configured probes.
    #[must_use]
    pub fn probes(&self) -> &[ToolProbe] {
        &self.probes
    }

    /// Fetches the catalog, runs every probe and builds the report.
    pub async fn collect(&self) -> ObservabilityReport {
        let started = self.clock.utc();
        let run_id = Uuid::new_v4();
        info!(%run_id, probes = self.probes.len(), "collecting observability report");

        let (sections, catalog) = match self.invoker.list_tools().await {
            Ok(catalog) => (self.run_probes(&catalog).await, Some(catalog)),
            Err(err) => {
                warn!(error = %err, "tool catalog unavailable, skipping every probe");
                let detail = format!("tool catalog unavailable: {err}");
                let sections = self
                    .probes
                    .iter()
                    .map(|probe| outcome(probe, ProbeStatus::Unavailable, detail.clone()))
                    .collect();
                (sections, None)
            }
        };

        let finished = self.clock.utc();
        let duration_seconds = (finished - started)
            .to_std()
            .map_or(0.0, |elapsed| elapsed.as_secs_f64());
        let status = ReportStatus::from_outcomes(&sections);
        info!(%run_id, %status, duration_seconds, "observability report collected");

        ObservabilityReport {
            run_id,
            generated_at: started,
            duration_seconds,
            status,
            catalog_size: catalog.as_ref().map_or(0, ToolCatalog::len),
            catalog_fingerprint: catalog.as_ref().map(ToolCatalog::fingerprint),
            sections,
        }
    }

    async fn run_probes(&self, catalog: &ToolCatalog) -> Vec<ProbeOutcome> {
        let mut sections = Vec::with_capacity(self.probes.len());
        for probe in &self.probes {
            sections.push(self.run_probe(probe, catalog).await);
        }
        sections
    }

    async fn run_probe(&self, probe: &ToolProbe, catalog: &ToolCatalog) -> ProbeOutcome {
        if !catalog.contains(&probe.tool_name) {
            warn!(tool = %probe.tool_name, "probe skipped, tool not offered by the server");
            return outcome(
                probe,
                ProbeStatus::Unavailable,
                format!("tool '{}' is not offered by the server", probe.tool_name),
            );
        }

        match self
            .invoker
            .invoke(&probe.tool_name, probe.arguments.clone())
            .await
        {
            Ok(ToolResult::Success(output)) => {
                info!(tool = %probe.tool_name, "probe succeeded");
                let text = output.text();
                let detail = if text.trim().is_empty() {
                    "(no text content)".to_owned()
                } else {
                    text
                };
                outcome(probe, ProbeStatus::Succeeded, detail)
            }
            Ok(ToolResult::Failure(failure)) => {
                warn!(tool = %probe.tool_name, error = %failure, "probe failed");
                outcome(probe, ProbeStatus::Failed, failure.message().to_owned())
            }
            Err(err) => {
                warn!(tool = %probe.tool_name, error = %err, "probe failed");
                outcome(probe, ProbeStatus::Failed, err.to_string())
            }
        }
    }
}

fn outcome(probe: &ToolProbe, status: ProbeStatus, detail: String) -> ProbeOutcome {
    ProbeOutcome {
        title: probe.title.clone(),
        tool_name: probe.tool_name.clone(),
        status,
        detail,
    }
}
