use crate::context::AnalysisContext;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Fixed capability vocabulary tools declare and intents map onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    Exploration,
    VulnerabilityScanning,
    PerformanceAnalysis,
    CodeQuality,
    SecurityAudit,
    Documentation,
    DependencyAnalysis,
    ArchitectureReview,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Exploration => "exploration",
            Capability::VulnerabilityScanning => "vulnerability-scanning",
            Capability::PerformanceAnalysis => "performance-analysis",
            Capability::CodeQuality => "code-quality",
            Capability::SecurityAudit => "security-audit",
            Capability::Documentation => "documentation",
            Capability::DependencyAnalysis => "dependency-analysis",
            Capability::ArchitectureReview => "architecture-review",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const FAST_LIMIT: Duration = Duration::from_secs(30);
pub const SLOW_LIMIT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyClass {
    /// Under 30 seconds
    Fast,
    /// 30 seconds to 2 minutes inclusive
    Medium,
    /// Over 2 minutes
    Slow,
}

impl LatencyClass {
    pub fn from_estimate(estimate: Duration) -> Self {
        if estimate < FAST_LIMIT {
            LatencyClass::Fast
        } else if estimate <= SLOW_LIMIT {
            LatencyClass::Medium
        } else {
            LatencyClass::Slow
        }
    }
}

impl fmt::Display for LatencyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LatencyClass::Fast => "fast",
            LatencyClass::Medium => "medium",
            LatencyClass::Slow => "slow",
        };
        f.write_str(s)
    }
}

/// Outcome of checking a tool against a request context
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validation {
    pub ok: bool,
    pub reasons: Vec<String>,
}

impl Validation {
    pub fn ok() -> Self {
        Self {
            ok: true,
            reasons: Vec::new(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reasons: vec![reason.into()],
        }
    }

    fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.ok = false;
        self.reasons.push(reason.into());
        self
    }
}

/// Registry-facing snapshot of a tool
#[derive(Debug, Clone, Serialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub capabilities: Vec<Capability>,
    /// Empty means any language
    pub languages: Vec<String>,
    pub latency: LatencyClass,
    pub healthy: bool,
}

/// A pluggable analysis tool
///
/// Tools are stateless with respect to requests: everything request-specific
/// arrives through the [`AnalysisContext`] and the JSON arguments.
#[async_trait]
pub trait AnalysisTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the arguments, exposed to the model in agentic mode
    fn schema(&self) -> Value;

    /// First entry is the primary capability
    fn capabilities(&self) -> &[Capability];

    /// Lowercase language names; empty means any language
    fn languages(&self) -> &[&str] {
        &[]
    }

    fn validate(&self, context: &AnalysisContext) -> Validation {
        default_validation(self, context)
    }

    fn health(&self) -> bool {
        true
    }

    fn estimate(&self, context: &AnalysisContext) -> Duration;

    async fn execute(&self, context: &AnalysisContext, arguments: Value) -> Result<Value>;

    fn primary_capability(&self) -> Option<Capability> {
        self.capabilities().first().copied()
    }

    fn latency(&self, context: &AnalysisContext) -> LatencyClass {
        LatencyClass::from_estimate(self.estimate(context))
    }
}

/// Capability relevance plus language overlap
pub fn default_validation<T: AnalysisTool + ?Sized>(
    tool: &T,
    context: &AnalysisContext,
) -> Validation {
    let mut validation = Validation::ok();

    let relevant = context.relevant_capabilities();
    if !tool.capabilities().iter().any(|c| relevant.contains(c)) {
        validation = validation.with_reason(format!(
            "{} declares no capability relevant to intent {} with scope {}",
            tool.name(),
            context.intent,
            context.scope.as_str()
        ));
    }

    let languages = tool.languages();
    if !languages.is_empty()
        && !context.target_languages.is_empty()
        && !languages
            .iter()
            .any(|l| context.target_languages.iter().any(|t| t == l))
    {
        validation = validation.with_reason(format!(
            "{} supports [{}], request targets [{}]",
            tool.name(),
            languages.join(", "),
            context.target_languages.join(", ")
        ));
    }

    validation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Intent, Scope};
    use yare::parameterized;

    struct GoScanner;

    #[async_trait]
    impl AnalysisTool for GoScanner {
        fn name(&self) -> &str {
            "go_scanner"
        }
        fn description(&self) -> &str {
            "scans go"
        }
        fn schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        fn capabilities(&self) -> &[Capability] {
            &[Capability::VulnerabilityScanning]
        }
        fn languages(&self) -> &[&str] {
            &["go"]
        }
        fn estimate(&self, _context: &AnalysisContext) -> Duration {
            Duration::from_secs(10)
        }
        async fn execute(&self, _context: &AnalysisContext, _arguments: Value) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    #[parameterized(
        zero = { 0, LatencyClass::Fast },
        just_under = { 29, LatencyClass::Fast },
        boundary_low = { 30, LatencyClass::Medium },
        boundary_high = { 120, LatencyClass::Medium },
        slow = { 121, LatencyClass::Slow },
    )]
    fn test_latency_buckets(secs: u64, expected: LatencyClass) {
        assert_eq!(
            LatencyClass::from_estimate(Duration::from_secs(secs)),
            expected
        );
    }

    #[test]
    fn test_default_validation_requires_relevant_capability() {
        let ctx = AnalysisContext::new("repo", "explore");
        let validation = GoScanner.validate(&ctx);
        assert!(!validation.ok);
        assert_eq!(validation.reasons.len(), 1);

        let ctx = ctx.with_intent(Intent::VulnerabilityScan);
        assert!(GoScanner.validate(&ctx).ok);
    }

    #[test]
    fn test_default_validation_language_overlap() {
        let ctx = AnalysisContext::new("repo", "scan")
            .with_scope(Scope::SecurityFocused)
            .with_languages(["python"]);
        let validation = GoScanner.validate(&ctx);
        assert!(!validation.ok);
        assert!(validation.reasons[0].contains("supports [go]"));

        let ctx = ctx.with_languages(Vec::<String>::new());
        assert!(GoScanner.validate(&ctx).ok);
    }

    #[test]
    fn test_capability_serialization() {
        let json = serde_json::to_string(&Capability::VulnerabilityScanning).unwrap();
        assert_eq!(json, "\"vulnerability-scanning\"");
        assert_eq!(Capability::CodeQuality.to_string(), "code-quality");
    }
}
