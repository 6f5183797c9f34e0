//! Output formatting for discovery runs

use crate::discovery::{DiscoveryRun, HostDiscoveryResult};
use crate::inventory::MergeSummary;
use colored::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Some(OutputFormat::Text),
            "json" => Some(OutputFormat::Json),
            "csv" => Some(OutputFormat::Csv),
            _ => None,
        }
    }
}

/// Renders run results to stdout or a file
pub struct OutputManager {
    format: OutputFormat,
    file: Option<PathBuf>,
}

impl OutputManager {
    pub fn new(format: OutputFormat) -> Self {
        Self { format, file: None }
    }

    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file = Some(path);
        self
    }

    /// Write the run in the configured format
    pub fn write_run(&self, run: &DiscoveryRun, merge: &MergeSummary) -> crate::Result<()> {
        let rendered = match self.format {
            OutputFormat::Text => self.render_text(run, merge),
            OutputFormat::Json => self.render_json(run, merge)?,
            OutputFormat::Csv => self.render_csv(run)?,
        };

        match &self.file {
            Some(path) => {
                let mut file = File::create(path)?;
                file.write_all(rendered.as_bytes())?;
                log::info!("results written to {}", path.display());
            }
            None => {
                io::stdout().write_all(rendered.as_bytes())?;
            }
        }

        Ok(())
    }

    fn render_text(&self, run: &DiscoveryRun, merge: &MergeSummary) -> String {
        let mut out = String::new();
        let summary = run.summary();

        for result in &run.results {
            out.push_str(&host_line(result));
            out.push('\n');
        }

        for skipped in &run.skipped {
            out.push_str(&format!(
                "{}  {}\n",
                skipped.address.to_string().bold(),
                skipped.reason.to_string().yellow()
            ));
        }

        out.push('\n');
        out.push_str(&format!(
            "{} {} hosts: {} healthy, {} degraded, {} unreachable, {} auth-failed, {} without credentials\n",
            if run.cancelled { "[cancelled]".red().to_string() } else { "[done]".green().to_string() },
            summary.total,
            summary.healthy.to_string().green(),
            summary.degraded,
            summary.unreachable,
            summary.auth_failed.to_string().red(),
            summary.no_credentials
        ));
        out.push_str(&format!(
            "inventory: {} inserted, {} updated, {} unchanged\n",
            merge.inserted, merge.updated, merge.unchanged
        ));
        out
    }

    fn render_json(&self, run: &DiscoveryRun, merge: &MergeSummary) -> crate::Result<String> {
        #[derive(Serialize)]
        struct Document<'a> {
            run: &'a DiscoveryRun,
            summary: crate::discovery::RunSummary,
            merge: &'a MergeSummary,
        }

        serde_json::to_string_pretty(&Document {
            run,
            summary: run.summary(),
            merge,
        })
        .map_err(|e| crate::DiscoveryError::OutputError(e.to_string()))
    }

    fn render_csv(&self, run: &DiscoveryRun) -> crate::Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record([
                "address",
                "hostname",
                "model",
                "service_tag",
                "bios_version",
                "idrac_version",
                "power_state",
                "healthiest_protocol",
                "readiness",
            ])
            .map_err(|e| crate::DiscoveryError::OutputError(e.to_string()))?;

        for result in &run.results {
            writer
                .write_record([
                    result.address.to_string(),
                    result.hostname.clone().unwrap_or_default(),
                    result.model.clone().unwrap_or_default(),
                    result.service_tag.clone().unwrap_or_default(),
                    result.bios_version.clone().unwrap_or_default(),
                    result.idrac_version.clone().unwrap_or_default(),
                    result.power_state.to_string(),
                    result
                        .healthiest_protocol
                        .as_ref()
                        .map(|c| c.protocol.to_string())
                        .unwrap_or_default(),
                    result
                        .compliance
                        .as_ref()
                        .map(|c| c.readiness.to_string())
                        .unwrap_or_default(),
                ])
                .map_err(|e| crate::DiscoveryError::OutputError(e.to_string()))?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| crate::DiscoveryError::OutputError(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| crate::DiscoveryError::OutputError(e.to_string()))
    }
}

fn host_line(result: &HostDiscoveryResult) -> String {
    let protocol = result
        .healthiest_protocol
        .as_ref()
        .map(|c| c.protocol.to_string())
        .unwrap_or_else(|| "none".to_string());
    let latency = result
        .healthiest_protocol
        .as_ref()
        .and_then(|c| c.latency)
        .map(|l| format!(" [{}ms]", l.as_millis()))
        .unwrap_or_default();
    let readiness = result
        .compliance
        .as_ref()
        .map(|c| format!(" {}", c.readiness))
        .unwrap_or_default();

    format!(
        "{}  {} {} via {}{}{}",
        result.address.to_string().bold(),
        result.model.as_deref().unwrap_or("unknown model"),
        result.service_tag.as_deref().unwrap_or("-"),
        protocol.cyan(),
        latency,
        readiness
    )
}
