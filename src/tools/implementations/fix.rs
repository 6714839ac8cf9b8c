use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::scanner::{builtin_rules, scan, Finding, Rule, Severity};
use crate::context::{AnalysisContext, Intent};
use crate::llm::{parse_json, LLMClient, LLMRequest};
use crate::tools::trait_def::{default_validation, AnalysisTool, Capability, Validation};
use crate::tools::workspace::resolve_repo_path;

const DEFAULT_MAX_FIXES: usize = 5;
const CONTEXT_LINES: usize = 3;

const SYSTEM_PROMPT: &str = "You are a security engineer proposing minimal source fixes. \
For each finding respond with the smallest change that removes the problem. \
Reply with JSON only: {\"fixes\": [{\"file\": str, \"line\": int, \"rule\": str, \"explanation\": str, \"patch\": str}]}";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedFix {
    pub file: String,
    pub line: usize,
    pub rule: String,
    pub explanation: String,
    #[serde(default)]
    pub patch: String,
}

#[derive(Debug, Deserialize)]
struct FixEnvelope {
    fixes: Vec<ProposedFix>,
}

fn excerpt(root: &Path, finding: &Finding) -> String {
    let Ok(content) = std::fs::read_to_string(root.join(&finding.file)) else {
        return finding.snippet.clone();
    };
    let start = finding.line.saturating_sub(CONTEXT_LINES + 1);
    content
        .lines()
        .enumerate()
        .skip(start)
        .take(CONTEXT_LINES * 2 + 1)
        .map(|(i, line)| format!("{:>5} | {}", i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn rule_based(findings: &[Finding]) -> Vec<ProposedFix> {
    findings
        .iter()
        .map(|f| ProposedFix {
            file: f.file.clone(),
            line: f.line,
            rule: f.rule.clone(),
            explanation: f.remediation.clone(),
            patch: String::new(),
        })
        .collect()
}

/// Proposes fixes for scanner findings, by model when available
pub struct FixGeneratorTool {
    llm: Option<Arc<dyn LLMClient>>,
    rules: Arc<Vec<Rule>>,
}

impl FixGeneratorTool {
    pub fn new(llm: Option<Arc<dyn LLMClient>>) -> Result<Self> {
        Ok(Self {
            llm,
            rules: Arc::new(builtin_rules()?),
        })
    }

    async fn propose(
        &self,
        llm: &dyn LLMClient,
        root: &Path,
        findings: &[Finding],
    ) -> Result<Vec<ProposedFix>> {
        let described: Vec<String> = findings
            .iter()
            .map(|f| {
                format!(
                    "- rule={} severity={:?} file={} line={}\n{}\n",
                    f.rule,
                    f.severity,
                    f.file,
                    f.line,
                    excerpt(root, f)
                )
            })
            .collect();

        let request = LLMRequest::prompt(
            SYSTEM_PROMPT,
            format!("Findings:\n{}", described.join("\n")),
        )
        .with_temperature(0.1);

        let response = llm.chat(request).await?;
        let envelope: FixEnvelope = parse_json(&response.content)?;
        Ok(envelope.fixes)
    }
}

#[async_trait]
impl AnalysisTool for FixGeneratorTool {
    fn name(&self) -> &str {
        "fix_generator"
    }

    fn description(&self) -> &str {
        "Propose source fixes for vulnerability findings. Pass findings from vulnerability_scanner, or omit them to scan first."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "repo_path": { "type": "string", "description": "Local repository directory" },
                "findings": {
                    "type": "array",
                    "description": "Findings as returned by vulnerability_scanner",
                    "items": { "type": "object" }
                },
                "max_fixes": { "type": "integer", "description": "Default is 5" }
            }
        })
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::SecurityAudit, Capability::CodeQuality]
    }

    fn validate(&self, context: &AnalysisContext) -> Validation {
        if context.intent != Intent::FixGeneration && !context.flag("generate_fixes") {
            return Validation::rejected("fix generation was not requested");
        }
        default_validation(self, context)
    }

    fn estimate(&self, _context: &AnalysisContext) -> Duration {
        Duration::from_secs(90)
    }

    async fn execute(&self, context: &AnalysisContext, arguments: Value) -> Result<Value> {
        let root = resolve_repo_path(context, &arguments)?;
        let max_fixes = arguments
            .get("max_fixes")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_FIXES);

        let mut findings: Vec<Finding> = match arguments.get("findings") {
            Some(raw) => serde_json::from_value(raw.clone()).context("Invalid findings")?,
            None => {
                let rules = Arc::clone(&self.rules);
                let scan_root = root.clone();
                tokio::task::spawn_blocking(move || scan(&scan_root, &rules, Severity::Medium).0)
                    .await
                    .context("Scanner panicked")?
            }
        };
        findings.sort_by(|a, b| b.severity.cmp(&a.severity));
        findings.truncate(max_fixes);

        if findings.is_empty() {
            return Ok(json!({ "fixes": [], "source": "none", "findings_considered": 0 }));
        }

        let (fixes, source, warning) = match &self.llm {
            Some(llm) => match self.propose(llm.as_ref(), &root, &findings).await {
                Ok(fixes) => (fixes, "model", None),
                Err(e) => {
                    warn!(error = %e, "Model fix proposal failed, using rule remediations");
                    (rule_based(&findings), "rules", Some(e.to_string()))
                }
            },
            None => (rule_based(&findings), "rules", None),
        };

        debug!(fixes = fixes.len(), source, "Generated fixes");
        Ok(json!({
            "fixes": fixes,
            "source": source,
            "findings_considered": findings.len(),
            "warning": warning,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLLMClient, MockResponse};
    use std::fs;
    use tempfile::TempDir;

    fn vulnerable_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("app.py"),
            "import os\n\ndef run(cmd):\n    os.system(cmd)\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_requires_fix_intent() {
        let tool = FixGeneratorTool::new(None).unwrap();
        let ctx = AnalysisContext::new("repo", "audit").with_intent(Intent::SecurityAudit);
        assert!(!tool.validate(&ctx).ok);
        assert!(tool.validate(&ctx.clone().with_intent(Intent::FixGeneration)).ok);
        assert!(tool
            .validate(&ctx.with_param("generate_fixes", json!(true)))
            .ok);
    }

    #[tokio::test]
    async fn test_rule_fallback_without_model() {
        let dir = vulnerable_repo();
        let tool = FixGeneratorTool::new(None).unwrap();
        let ctx = AnalysisContext::new("local", "fix").with_repo_path(dir.path());

        let result = tool.execute(&ctx, json!({})).await.unwrap();
        assert_eq!(result["source"], "rules");
        assert_eq!(result["fixes"][0]["rule"], "os_system");
        assert_eq!(result["fixes"][0]["line"], 4);
    }

    #[tokio::test]
    async fn test_model_fixes() {
        let dir = vulnerable_repo();
        let mock = Arc::new(MockLLMClient::new());
        mock.add_response(MockResponse::text(
            "```json\n{\"fixes\": [{\"file\": \"app.py\", \"line\": 4, \"rule\": \"os_system\", \"explanation\": \"use subprocess\", \"patch\": \"subprocess.run([cmd])\"}]}\n```",
        ));
        let tool = FixGeneratorTool::new(Some(mock.clone())).unwrap();
        let ctx = AnalysisContext::new("local", "fix").with_repo_path(dir.path());

        let result = tool.execute(&ctx, json!({})).await.unwrap();
        assert_eq!(result["source"], "model");
        assert_eq!(result["fixes"][0]["patch"], "subprocess.run([cmd])");

        let recorded = mock.recorded_requests();
        let prompt = &recorded[0].messages[1].content;
        assert!(prompt.contains("os.system(cmd)"));
    }

    #[tokio::test]
    async fn test_malformed_model_output_falls_back() {
        let dir = vulnerable_repo();
        let mock = Arc::new(MockLLMClient::new());
        mock.add_response(MockResponse::text("I cannot help with that"));
        let tool = FixGeneratorTool::new(Some(mock)).unwrap();
        let ctx = AnalysisContext::new("local", "fix").with_repo_path(dir.path());

        let result = tool.execute(&ctx, json!({})).await.unwrap();
        assert_eq!(result["source"], "rules");
        assert!(result["warning"].is_string());
    }

    #[tokio::test]
    async fn test_explicit_empty_findings() {
        let dir = vulnerable_repo();
        let tool = FixGeneratorTool::new(None).unwrap();
        let ctx = AnalysisContext::new("local", "fix").with_repo_path(dir.path());

        let result = tool.execute(&ctx, json!({"findings": []})).await.unwrap();
        assert_eq!(result["findings_considered"], 0);
    }
}
