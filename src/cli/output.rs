//! Output formatting for multiple formats
//!
//! JSON and YAML serialize the same structures the library returns; the human
//! format renders them as short terminal reports.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::ReposcopeConfig;
use crate::report::AnalysisReport;
use crate::tools::ToolMetadata;
use crate::workflow::WorkflowVerdict;

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";
const CHECK: &str = "\u{2713}";
const CROSS: &str = "\u{2717}";
const WARN: &str = "\u{26A0}";
const BRANCH: &str = "\u{251C}\u{2500}";
const LAST: &str = "\u{2514}\u{2500}";
const MAX_PAYLOAD_PREVIEW: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// YAML format (human-friendly, version-control friendly)
    Yaml,
    /// Human-readable formatted text
    Human,
}

/// Availability of the model backend or a tool
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub name: String,
    pub available: bool,
    pub message: String,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    fn serialize<T: Serialize>(&self, value: &T, what: &str) -> Result<Option<String>> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(value)
                .map(Some)
                .with_context(|| format!("Failed to serialize {} to JSON", what)),
            OutputFormat::Yaml => serde_yaml::to_string(value)
                .map(Some)
                .with_context(|| format!("Failed to serialize {} to YAML", what)),
            OutputFormat::Human => Ok(None),
        }
    }

    pub fn format_report(&self, report: &AnalysisReport) -> Result<String> {
        match self.serialize(report, "analysis report")? {
            Some(text) => Ok(text),
            None => Ok(self.format_report_human(report)),
        }
    }

    pub fn format_verdict(&self, verdict: &WorkflowVerdict) -> Result<String> {
        match self.serialize(verdict, "workflow verdict")? {
            Some(text) => Ok(text),
            None => {
                let symbol = if verdict.valid { CHECK } else { CROSS };
                let label = if verdict.valid { "valid" } else { "invalid" };
                Ok(format!("{} Workflow is {}\n  {}\n", symbol, label, verdict.message))
            }
        }
    }

    pub fn format_tools(&self, tools: &[ToolMetadata]) -> Result<String> {
        if let Some(text) = self.serialize(&tools, "tool list")? {
            return Ok(text);
        }

        let mut output = String::new();
        output.push_str("Registered Tools\n");
        output.push_str(RULE);
        output.push_str("\n\n");

        for tool in tools {
            let symbol = if tool.healthy { CHECK } else { CROSS };
            output.push_str(&format!("{} {} ({})\n", symbol, tool.name, tool.latency));
            output.push_str(&format!("  {}\n", tool.description));
            let capabilities: Vec<&str> = tool.capabilities.iter().map(|c| c.as_str()).collect();
            output.push_str(&format!("  Capabilities: {}\n", capabilities.join(", ")));
            if tool.languages.is_empty() {
                output.push_str("  Languages:    any\n");
            } else {
                output.push_str(&format!("  Languages:    {}\n", tool.languages.join(", ")));
            }
            output.push('\n');
        }
        Ok(output)
    }

    pub fn format_health(&self, statuses: &[HealthStatus]) -> Result<String> {
        if let Some(text) = self.serialize(&statuses, "health status")? {
            return Ok(text);
        }

        let mut output = String::new();
        output.push_str("Health Status\n");
        output.push_str(RULE);
        output.push_str("\n\n");

        for status in statuses {
            let symbol = if status.available { CHECK } else { CROSS };
            output.push_str(&format!("{} {}\n", symbol, status.name));
            output.push_str(&format!(
                "  Status: {}\n",
                if status.available {
                    "Available"
                } else {
                    "Unavailable"
                }
            ));
            output.push_str(&format!("  Message: {}\n\n", status.message));
        }
        Ok(output)
    }

    pub fn format_config(&self, config: &ReposcopeConfig) -> Result<String> {
        let map = config.to_display_map();
        if let Some(text) = self.serialize(&map, "config")? {
            return Ok(text);
        }
        Ok(config.to_string())
    }

    fn format_report_human(&self, report: &AnalysisReport) -> String {
        let mut output = String::new();

        if report.is_partial() {
            output.push_str(&format!("{} Analysis Report ({})\n", WARN, report.status));
        } else {
            output.push_str(&format!("{} Analysis Report\n", CHECK));
        }
        output.push_str(RULE);
        output.push_str("\n\n");

        output.push_str(&format!("Repository:  {}\n", report.repository));
        output.push_str(&format!("Request:     {}\n", report.request));
        output.push_str(&format!("Mode:        {}\n", report.mode));
        output.push_str(&format!("Finished:    {}\n", report.finished_at));
        if let Some(intent) = report.intent {
            output.push_str(&format!("Intent:      {}\n", intent));
        }
        if !report.target_languages.is_empty() {
            output.push_str(&format!(
                "Languages:   {}\n",
                report.target_languages.join(", ")
            ));
        }
        if let Some(turns) = report.turns {
            output.push_str(&format!("Turns:       {}\n", turns));
        }
        output.push('\n');

        if let Some(plan) = &report.plan {
            output.push_str("Plan:\n");
            for (i, batch) in plan.batches.iter().enumerate() {
                let connector = if i + 1 == plan.batches.len() { LAST } else { BRANCH };
                let kind = if batch.parallel { "parallel" } else { "sequential" };
                output.push_str(&format!(
                    "{} Batch {} ({}, {}): {}\n",
                    connector,
                    i + 1,
                    kind,
                    batch.latency,
                    batch.tools.join(", ")
                ));
            }
            output.push('\n');
        }

        output.push_str("Tool Results:\n");
        if report.results.is_empty() {
            output.push_str(&format!("{} (no tools ran)\n", LAST));
        }
        for (i, result) in report.results.iter().enumerate() {
            let connector = if i + 1 == report.results.len() { LAST } else { BRANCH };
            let symbol = if result.success { CHECK } else { CROSS };
            output.push_str(&format!(
                "{} {} {} ({}ms)\n",
                connector,
                symbol,
                result.tool_name,
                result.duration.as_millis()
            ));
            if let Some(error) = result.first_error() {
                output.push_str(&format!("     {}\n", error));
            }
            for warning in &result.warnings {
                output.push_str(&format!("     {} {}\n", WARN, warning));
            }
        }
        output.push('\n');

        if let Some(text) = report.final_text.as_deref().filter(|t| !t.trim().is_empty()) {
            output.push_str("Summary:\n");
            output.push_str(text.trim());
            output.push_str("\n\n");
        }

        let previews: Vec<String> = report
            .results
            .iter()
            .filter(|r| r.success && !r.payload.is_null())
            .map(|r| format!("--- {} ---\n{}", r.tool_name, preview(&r.payload)))
            .collect();
        if !previews.is_empty() {
            output.push_str("Findings:\n");
            output.push_str(&previews.join("\n"));
            output.push_str("\n\n");
        }

        output.push_str(&format!("{}\n", report.summary_line()));
        output
    }
}

fn preview(payload: &serde_json::Value) -> String {
    let text = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
    if text.chars().count() <= MAX_PAYLOAD_PREVIEW {
        return text;
    }
    let cut: String = text.chars().take(MAX_PAYLOAD_PREVIEW).collect();
    format!("{}... (truncated)", cut)
}
