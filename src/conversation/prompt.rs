use super::config::ConversationConfig;
use crate::tools::implementations::CLONE_TOOL;

pub fn system_prompt(config: &ConversationConfig, tool_names: &[&str]) -> String {
    format!(
        r#"You are a repository analyst with access to analysis tools.

Available tools: {tools}

Workflow:
1. Call {clone} first. It returns repo_path; later tools receive it automatically.
2. Run the analysis tools that fit the request. Call several tools per turn when they are independent.
3. Call {teardown} once you no longer need the repository.
4. Reply with a concise report of your findings that ends with the phrase "{phrase}".

Rules:
- Use only the tools listed above, with JSON object arguments.
- When a tool returns an error, adjust and continue; do not repeat a failing call unchanged.
- Do not write "{phrase}" until the report is final."#,
        tools = tool_names.join(", "),
        clone = CLONE_TOOL,
        teardown = config.teardown_tool,
        phrase = config.primary_completion_phrase().to_uppercase(),
    )
}

pub fn user_prompt(repository: &str, request: &str) -> String {
    format!("Repository: {}\nRequest: {}", repository, request)
}

/// Nudge appended when the model stops calling tools without finishing
pub fn reminder(
    config: &ConversationConfig,
    tools_run: usize,
    teardown_pending: bool,
) -> String {
    if tools_run < config.min_tools_before_completion {
        format!(
            "Only {} tool call(s) have run so far; at least {} are needed. Continue the analysis by calling tools.",
            tools_run, config.min_tools_before_completion
        )
    } else if teardown_pending {
        format!(
            "Call {} to release the workspace before finishing.",
            config.teardown_tool
        )
    } else {
        format!(
            "If the analysis is done, reply with your report ending in \"{}\". Otherwise call the next tool.",
            config.primary_completion_phrase().to_uppercase()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_mentions_workflow() {
        let prompt = system_prompt(&ConversationConfig::default(), &["clone_repository", "code_metrics"]);
        assert!(prompt.contains("clone_repository, code_metrics"));
        assert!(prompt.contains("cleanup_workspace"));
        assert!(prompt.contains("ANALYSIS COMPLETE"));
    }

    #[test]
    fn test_reminder_priorities() {
        let config = ConversationConfig::default();
        assert!(reminder(&config, 1, true).contains("at least 4"));
        assert!(reminder(&config, 5, true).contains("cleanup_workspace"));
        assert!(reminder(&config, 5, false).contains("ANALYSIS COMPLETE"));
    }
}
