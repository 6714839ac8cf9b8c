//! Compiled output of one analysis request

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::context::{AnalysisContext, Intent};
use crate::conversation::ConversationStatus;
use crate::execution::ExecutionPlan;
use crate::tools::ToolResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    Static,
    Agentic,
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisMode::Static => f.write_str("static"),
            AnalysisMode::Agentic => f.write_str("agentic"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Completed,
    Truncated,
    BudgetExhausted,
    Cancelled,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Completed => "completed",
            ReportStatus::Truncated => "completed, truncated",
            ReportStatus::BudgetExhausted => "completed, budget exhausted",
            ReportStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ConversationStatus> for ReportStatus {
    fn from(status: ConversationStatus) -> Self {
        match status {
            ConversationStatus::Completed => ReportStatus::Completed,
            ConversationStatus::Truncated => ReportStatus::Truncated,
            ConversationStatus::BudgetExhausted => ReportStatus::BudgetExhausted,
            ConversationStatus::Cancelled => ReportStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub request_id: String,
    pub mode: AnalysisMode,
    pub status: ReportStatus,
    pub repository: String,
    pub request: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    pub target_languages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<ExecutionPlan>,
    pub results: Vec<ToolResult>,
    pub succeeded: usize,
    pub failed: usize,
    #[serde(with = "crate::util::duration_ms")]
    pub duration: Duration,
    /// RFC 3339 timestamp taken when the report was compiled
    pub finished_at: String,
    /// Last model text, agentic runs only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turns: Option<usize>,
}

impl AnalysisReport {
    pub fn new(
        mode: AnalysisMode,
        status: ReportStatus,
        context: &AnalysisContext,
        results: Vec<ToolResult>,
        duration: Duration,
    ) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = results.len() - succeeded;
        Self {
            request_id: context.request_id.clone(),
            mode,
            status,
            repository: context.repository.clone(),
            request: context.request.clone(),
            intent: None,
            target_languages: context.target_languages.clone(),
            plan: None,
            results,
            succeeded,
            failed,
            duration,
            finished_at: chrono::Utc::now().to_rfc3339(),
            final_text: None,
            turns: None,
        }
    }

    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = Some(intent);
        self
    }

    pub fn with_plan(mut self, plan: ExecutionPlan) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn with_conversation(mut self, final_text: String, turns: usize) -> Self {
        self.final_text = Some(final_text);
        self.turns = Some(turns);
        self
    }

    pub fn failures(&self) -> impl Iterator<Item = &ToolResult> {
        self.results.iter().filter(|r| !r.success)
    }

    /// Some tool failed or the run did not finish on its own terms
    pub fn is_partial(&self) -> bool {
        self.failed > 0 || self.status != ReportStatus::Completed
    }

    pub fn summary_line(&self) -> String {
        format!(
            "{} ({} mode): {} succeeded, {} failed in {:.1}s",
            self.status,
            self.mode,
            self.succeeded,
            self.failed,
            self.duration.as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report(status: ReportStatus) -> AnalysisReport {
        let ctx = AnalysisContext::new("https://github.com/a/b", "scan");
        AnalysisReport::new(
            AnalysisMode::Static,
            status,
            &ctx,
            vec![
                ToolResult::success("explorer", json!({}), Duration::from_millis(5)),
                ToolResult::timed_out("scanner", Duration::from_secs(1)),
            ],
            Duration::from_millis(1500),
        )
    }

    #[test]
    fn test_counts_and_failures() {
        let report = report(ReportStatus::Completed);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures().next().unwrap().tool_name, "scanner");
        assert!(report.is_partial());
        assert_eq!(
            report.summary_line(),
            "completed (static mode): 1 succeeded, 1 failed in 1.5s"
        );
    }

    #[test]
    fn test_truncated_label() {
        let report = report(ReportStatus::from(ConversationStatus::Truncated));
        assert_eq!(report.status.to_string(), "completed, truncated");
    }

    #[test]
    fn test_serialization_skips_absent_fields() {
        let value = serde_json::to_value(report(ReportStatus::Completed)).unwrap();
        assert_eq!(value["mode"], "static");
        assert_eq!(value["duration"], 1500);
        assert!(value.get("final_text").is_none());
        assert!(value.get("plan").is_none());
    }
}
