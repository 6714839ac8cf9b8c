use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::tools::ToolResult;

/// Where the loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    TurnStart,
    AwaitingModel,
    ToolDispatch,
    Completed,
    Aborted,
}

/// How an agentic run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    /// Completion phrase seen with every precondition met
    Completed,
    /// Hard turn ceiling reached
    Truncated,
    /// Cost budget reached before the model finished
    BudgetExhausted,
    Cancelled,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Completed => "completed",
            ConversationStatus::Truncated => "completed, truncated",
            ConversationStatus::BudgetExhausted => "completed, budget exhausted",
            ConversationStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dispatched tool call as seen by the loop
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    pub turn: usize,
    pub call_id: String,
    pub tool: String,
    pub arguments: Value,
    pub success: bool,
    #[serde(with = "crate::util::duration_ms")]
    pub duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationState {
    pub turn: usize,
    pub phase: Phase,
    pub history: Vec<ToolCallRecord>,
    /// Errors handed back to the model, in order
    pub errors: Vec<String>,
    pub terminated: bool,
    /// Local repository path reported by the clone tool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_path: Option<PathBuf>,
    pub teardown_done: bool,
    /// Tool executions, failed ones included
    pub tools_run: usize,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            turn: 0,
            phase: Phase::TurnStart,
            history: Vec::new(),
            errors: Vec::new(),
            terminated: false,
            repo_path: None,
            teardown_done: false,
            tools_run: 0,
        }
    }
}

impl ConversationState {
    pub fn record(&mut self, record: ToolCallRecord) {
        if let Some(error) = &record.error {
            self.errors.push(format!("{}: {}", record.tool, error));
        }
        self.history.push(record);
    }

    pub fn finish(&mut self, phase: Phase) {
        self.phase = phase;
        self.terminated = true;
    }
}

/// Result of a finished (not failed) agentic run
#[derive(Debug, Clone, Serialize)]
pub struct ConversationOutcome {
    pub status: ConversationStatus,
    pub final_text: String,
    pub turns: usize,
    pub results: Vec<ToolResult>,
    pub state: ConversationState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_labels() {
        assert_eq!(ConversationStatus::Truncated.to_string(), "completed, truncated");
        assert_eq!(
            ConversationStatus::BudgetExhausted.as_str(),
            "completed, budget exhausted"
        );
        assert_eq!(
            serde_json::to_value(ConversationStatus::BudgetExhausted).unwrap(),
            "budget_exhausted"
        );
    }

    #[test]
    fn test_record_collects_errors() {
        let mut state = ConversationState::default();
        state.record(ToolCallRecord {
            turn: 1,
            call_id: "c1".to_string(),
            tool: "scanner".to_string(),
            arguments: Value::Null,
            success: false,
            duration: Duration::ZERO,
            error: Some("timed out".to_string()),
        });
        assert_eq!(state.errors, vec!["scanner: timed out"]);
        assert_eq!(state.history.len(), 1);

        state.finish(Phase::Completed);
        assert!(state.terminated);
        assert_eq!(state.phase, Phase::Completed);
    }
}
