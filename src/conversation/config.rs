use std::time::Duration;

use crate::tools::implementations::TEARDOWN_TOOL;

/// Phrases that mark a final answer, matched case-insensitively
pub const DEFAULT_COMPLETION_PHRASES: &[&str] = &[
    "analysis complete",
    "analysis is complete",
    "task complete",
    "final report",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationConfig {
    /// Hard ceiling on model turns; reaching it truncates the run
    pub max_turns: usize,
    /// Tool executions required before a completion phrase is honoured
    pub min_tools_before_completion: usize,
    /// Turn count at which the cost budget is checked
    pub budget_turn_threshold: usize,
    /// Tool count that, together with the turn threshold, exhausts the budget
    pub budget_tool_threshold: usize,
    /// Minimum spacing between consecutive model calls
    pub min_call_interval: Duration,
    pub tool_timeout: Duration,
    /// Tool that must have run before the run may complete
    pub teardown_tool: String,
    pub completion_phrases: Vec<String>,
    pub max_error_chars: usize,
    pub max_output_chars: usize,
    pub temperature: f32,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_turns: 30,
            min_tools_before_completion: 4,
            budget_turn_threshold: 20,
            budget_tool_threshold: 12,
            min_call_interval: Duration::from_secs(2),
            tool_timeout: Duration::from_secs(300),
            teardown_tool: TEARDOWN_TOOL.to_string(),
            completion_phrases: DEFAULT_COMPLETION_PHRASES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            max_error_chars: 500,
            max_output_chars: 4000,
            temperature: 0.2,
        }
    }
}

impl ConversationConfig {
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    pub fn with_min_tools_before_completion(mut self, min_tools: usize) -> Self {
        self.min_tools_before_completion = min_tools;
        self
    }

    pub fn with_budget(mut self, turns: usize, tools: usize) -> Self {
        self.budget_turn_threshold = turns;
        self.budget_tool_threshold = tools;
        self
    }

    pub fn with_min_call_interval(mut self, interval: Duration) -> Self {
        self.min_call_interval = interval;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_teardown_tool(mut self, name: impl Into<String>) -> Self {
        self.teardown_tool = name.into();
        self
    }

    pub fn with_completion_phrases<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.completion_phrases = phrases
            .into_iter()
            .map(|p| p.into().to_lowercase())
            .filter(|p| !p.trim().is_empty())
            .collect();
        self
    }

    pub fn mentions_completion(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.completion_phrases
            .iter()
            .any(|phrase| text.contains(phrase.as_str()))
    }

    /// Phrase quoted to the model when asking it to finish
    pub fn primary_completion_phrase(&self) -> &str {
        self.completion_phrases
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_COMPLETION_PHRASES[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConversationConfig::default();
        assert_eq!(config.max_turns, 30);
        assert_eq!(config.min_tools_before_completion, 4);
        assert_eq!(config.min_call_interval, Duration::from_secs(2));
        assert_eq!(config.teardown_tool, "cleanup_workspace");
    }

    #[test]
    fn test_completion_matching() {
        let config = ConversationConfig::default();
        assert!(config.mentions_completion("Summary...\n\nANALYSIS COMPLETE."));
        assert!(!config.mentions_completion("Analysis continues with the scanner"));

        let custom = config.with_completion_phrases(["All Done", " "]);
        assert_eq!(custom.completion_phrases, vec!["all done"]);
        assert!(custom.mentions_completion("all done here"));
        assert!(!custom.mentions_completion("analysis complete"));
        assert_eq!(custom.primary_completion_phrase(), "all done");
    }

    #[test]
    fn test_empty_phrase_list_still_has_primary() {
        let config = ConversationConfig::default().with_completion_phrases(Vec::<String>::new());
        assert_eq!(config.primary_completion_phrase(), "analysis complete");
        assert!(!config.mentions_completion("analysis complete"));
    }

    #[test]
    fn test_builder() {
        let config = ConversationConfig::default()
            .with_max_turns(0)
            .with_budget(5, 3)
            .with_min_call_interval(Duration::ZERO)
            .with_teardown_tool("teardown");
        assert_eq!(config.max_turns, 1);
        assert_eq!(config.budget_turn_threshold, 5);
        assert_eq!(config.budget_tool_threshold, 3);
        assert_eq!(config.teardown_tool, "teardown");
    }
}
