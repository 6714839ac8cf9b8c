use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::common::{relative, truncate, walk_text_files, MAX_WALK_FILES};
use crate::context::{AnalysisContext, Depth};
use crate::tools::trait_def::{AnalysisTool, Capability};
use crate::tools::workspace::resolve_repo_path;

const MAX_FINDINGS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

pub struct Rule {
    pub id: &'static str,
    pub severity: Severity,
    pub description: &'static str,
    pub remediation: &'static str,
    pattern: Regex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub rule: String,
    pub severity: Severity,
    pub file: String,
    pub line: usize,
    pub snippet: String,
    pub description: String,
    pub remediation: String,
}

const RULE_TABLE: &[(&str, Severity, &str, &str, &str)] = &[
    (
        "private_key",
        Severity::Critical,
        r"-----BEGIN (?:RSA |EC |DSA |OPENSSH )?PRIVATE KEY-----",
        "Private key committed to the repository",
        "Remove the key, rotate it and load it from a secret store",
    ),
    (
        "aws_access_key",
        Severity::High,
        r"\bAKIA[0-9A-Z]{16}\b",
        "AWS access key id in source",
        "Revoke the key and read credentials from the environment",
    ),
    (
        "hardcoded_secret",
        Severity::High,
        r#"(?i)\b(?:password|passwd|secret|api_?key|token)\s*[:=]\s*["'][^"'\s]{6,}["']"#,
        "Hardcoded credential",
        "Move the value to configuration or a secret manager",
    ),
    (
        "shell_injection",
        Severity::High,
        r"subprocess\.\w+\(.*shell\s*=\s*True",
        "Subprocess invoked through the shell",
        "Pass an argument list and drop shell=True",
    ),
    (
        "eval_call",
        Severity::Medium,
        r"\beval\s*\(",
        "Dynamic code evaluation",
        "Replace eval with a parser for the expected input",
    ),
    (
        "os_system",
        Severity::Medium,
        r"\bos\.system\s*\(",
        "Command executed through os.system",
        "Use subprocess.run with an argument list",
    ),
    (
        "weak_hash",
        Severity::Low,
        r"(?i)\b(?:md5|sha1)\s*\(",
        "Weak hash function",
        "Use SHA-256 or a password hashing function",
    ),
    (
        "insecure_http",
        Severity::Low,
        r#"["']http://[^"'\s]*(?:api|auth|login)[^"'\s]*["']"#,
        "Plain HTTP endpoint for a sensitive service",
        "Use HTTPS",
    ),
    (
        "unsafe_block",
        Severity::Info,
        r"\bunsafe\s*\{",
        "Unsafe Rust block",
        "Document the invariants the block relies on",
    ),
];

pub fn builtin_rules() -> Result<Vec<Rule>> {
    RULE_TABLE
        .iter()
        .map(|&(id, severity, pattern, description, remediation)| {
            Ok(Rule {
                id,
                severity,
                description,
                remediation,
                pattern: Regex::new(pattern)
                    .with_context(|| format!("Invalid pattern for rule {}", id))?,
            })
        })
        .collect()
}

/// Runs every rule over every text file; findings are sorted most severe first
pub fn scan(root: &Path, rules: &[Rule], min_severity: Severity) -> (Vec<Finding>, usize, bool) {
    let (files, truncated) = walk_text_files(root, MAX_WALK_FILES);
    let mut findings = Vec::new();

    'files: for file in &files {
        let Ok(content) = fs::read_to_string(file) else {
            continue;
        };
        for (index, line) in content.lines().enumerate() {
            for rule in rules.iter().filter(|r| r.severity >= min_severity) {
                if rule.pattern.is_match(line) {
                    findings.push(Finding {
                        rule: rule.id.to_string(),
                        severity: rule.severity,
                        file: relative(root, file),
                        line: index + 1,
                        snippet: truncate(line.trim(), 120),
                        description: rule.description.to_string(),
                        remediation: rule.remediation.to_string(),
                    });
                    if findings.len() >= MAX_FINDINGS {
                        break 'files;
                    }
                }
            }
        }
    }

    findings.sort_by(|a, b| b.severity.cmp(&a.severity));
    let limited = truncated || findings.len() >= MAX_FINDINGS;
    (findings, files.len(), limited)
}

/// Regex rules for committed secrets and insecure calls
pub struct VulnerabilityScannerTool {
    rules: Arc<Vec<Rule>>,
}

impl VulnerabilityScannerTool {
    pub fn new() -> Result<Self> {
        Ok(Self {
            rules: Arc::new(builtin_rules()?),
        })
    }
}

#[async_trait]
impl AnalysisTool for VulnerabilityScannerTool {
    fn name(&self) -> &str {
        "vulnerability_scanner"
    }

    fn description(&self) -> &str {
        "Scan source files for committed secrets and insecure calls; returns findings with file, line, severity and remediation"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "repo_path": {
                    "type": "string",
                    "description": "Local repository directory"
                },
                "min_severity": {
                    "type": "string",
                    "enum": ["info", "low", "medium", "high", "critical"],
                    "description": "Drop findings below this severity. Default is low."
                }
            }
        })
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::VulnerabilityScanning, Capability::SecurityAudit]
    }

    fn estimate(&self, context: &AnalysisContext) -> Duration {
        match context.depth {
            Depth::Surface => Duration::from_secs(20),
            _ => Duration::from_secs(45),
        }
    }

    async fn execute(&self, context: &AnalysisContext, arguments: Value) -> Result<Value> {
        let root = resolve_repo_path(context, &arguments)?;
        let min_severity = arguments
            .get("min_severity")
            .cloned()
            .map(serde_json::from_value::<Severity>)
            .transpose()
            .context("Invalid min_severity")?
            .unwrap_or(Severity::Low);

        debug!(path = %root.display(), ?min_severity, "Scanning repository");
        let rules = Arc::clone(&self.rules);
        let (findings, files_scanned, limited) =
            tokio::task::spawn_blocking(move || scan(&root, &rules, min_severity))
                .await
                .context("Scanner panicked")?;

        let mut by_severity: BTreeMap<Severity, usize> = BTreeMap::new();
        for finding in &findings {
            *by_severity.entry(finding.severity).or_default() += 1;
        }

        Ok(json!({
            "files_scanned": files_scanned,
            "finding_count": findings.len(),
            "by_severity": by_severity,
            "limited": limited,
            "findings": findings,
        }))
    }
}
