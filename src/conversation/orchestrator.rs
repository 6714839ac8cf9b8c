//! Model-directed tool loop
//!
//! The model proposes tool calls; the loop owns every policy decision: pacing
//! model calls, timeboxing tools, feeding failures back as messages, deciding
//! when the run is finished and forcing a stop when it runs too long.

use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::ConversationConfig;
use super::prompt;
use super::state::{
    ConversationOutcome, ConversationState, ConversationStatus, Phase, ToolCallRecord,
};
use crate::context::AnalysisContext;
use crate::execution::run_tool;
use crate::llm::{BackendError, ChatMessage, LLMClient, LLMRequest, ToolCall, ToolDefinition};
use crate::progress::{scaled, ProgressEvent, ProgressReporter};
use crate::tools::implementations::CLONE_TOOL;
use crate::tools::{ToolRegistry, ToolResult};

const LOOP_END_PERCENT: u8 = 95;
const SUGGESTION_THRESHOLD: f64 = 0.5;
const FORCED_TEARDOWN_CALL_ID: &str = "forced-teardown";

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("Model call failed on turn {turn}: {source}")]
    Model {
        turn: usize,
        #[source]
        source: BackendError,
    },

    #[error("No healthy tools available for an agentic run")]
    NoTools,
}

/// Per-run mutable bookkeeping shared by the loop helpers
struct Run<'a> {
    context: &'a mut AnalysisContext,
    state: ConversationState,
    results: Vec<ToolResult>,
    reporter: &'a mut ProgressReporter,
    cancel: &'a CancellationToken,
}

pub struct ConversationalOrchestrator {
    llm: Arc<dyn LLMClient>,
    registry: Arc<ToolRegistry>,
    config: ConversationConfig,
}

impl ConversationalOrchestrator {
    pub fn new(
        llm: Arc<dyn LLMClient>,
        registry: Arc<ToolRegistry>,
        config: ConversationConfig,
    ) -> Self {
        Self {
            llm,
            registry,
            config,
        }
    }

    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.registry
            .healthy_tools()
            .iter()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.schema(),
            })
            .collect()
    }

    /// Runs the loop to completion, a forced stop or cancellation
    ///
    /// Only a failed model call is an error; tool problems are reported back to
    /// the model and the loop carries on.
    pub async fn run(
        &self,
        context: &mut AnalysisContext,
        reporter: &mut ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<ConversationOutcome, ConversationError> {
        let definitions = self.tool_definitions();
        if definitions.is_empty() {
            return Err(ConversationError::NoTools);
        }
        let names: Vec<&str> = definitions.iter().map(|d| d.name.as_str()).collect();
        let teardown_required = names.contains(&self.config.teardown_tool.as_str());

        let mut messages = vec![
            ChatMessage::system(prompt::system_prompt(&self.config, &names)),
            ChatMessage::user(prompt::user_prompt(&context.repository, &context.request)),
        ];

        let mut run = Run {
            context,
            state: ConversationState::default(),
            results: Vec::new(),
            reporter,
            cancel,
        };
        let mut final_text = String::new();
        let mut last_call: Option<Instant> = None;

        info!(
            request_id = %run.context.request_id,
            tools = names.len(),
            max_turns = self.config.max_turns,
            "Starting agentic run"
        );

        loop {
            run.state.turn += 1;
            run.state.phase = Phase::TurnStart;
            let turn = run.state.turn;

            if cancel.is_cancelled() || !self.pace(last_call, cancel).await {
                return Ok(self.finish(run, ConversationStatus::Cancelled, final_text));
            }

            run.state.phase = Phase::AwaitingModel;
            let request = LLMRequest::new(messages.clone())
                .with_tools(definitions.clone())
                .with_temperature(self.config.temperature);
            last_call = Some(Instant::now());
            debug!(turn, messages = messages.len(), "Sending request to model");

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Ok(self.finish(run, ConversationStatus::Cancelled, final_text));
                }
                response = self.llm.chat(request) => response,
            };

            let response = match response {
                Ok(response) => response,
                Err(source) => {
                    error!(turn, error = %source, "Model call failed, aborting run");
                    run.state.finish(Phase::Aborted);
                    let percent = run.reporter.percent();
                    run.reporter.emit(ProgressEvent::Error {
                        message: format!("Model call failed on turn {}: {}", turn, source),
                        percent,
                    });
                    return Err(ConversationError::Model { turn, source });
                }
            };

            debug!(
                turn,
                tool_calls = response.tool_calls.len(),
                response_ms = response.response_time.as_millis(),
                "Model responded"
            );
            if !response.content.trim().is_empty() {
                final_text = response.content.clone();
            }

            if response.has_tool_calls() {
                messages.push(ChatMessage::assistant_with_tools(
                    &response.content,
                    response.tool_calls.clone(),
                ));
            } else {
                messages.push(ChatMessage::assistant(&response.content));
            }

            run.state.phase = Phase::ToolDispatch;
            for call in &response.tool_calls {
                if cancel.is_cancelled() {
                    return Ok(self.finish(run, ConversationStatus::Cancelled, final_text));
                }
                match self.dispatch(call, turn, &mut run).await {
                    Some(content) => messages.push(ChatMessage::tool_response(&call.call_id, content)),
                    None => return Ok(self.finish(run, ConversationStatus::Cancelled, final_text)),
                }
            }

            run.reporter.emit(ProgressEvent::TurnUpdate {
                turn,
                max_turns: self.config.max_turns,
                tool_calls: response.tool_calls.len(),
                percent: scaled(0, LOOP_END_PERCENT, turn, self.config.max_turns),
            });

            let teardown_pending = teardown_required && !run.state.teardown_done;
            if self.config.mentions_completion(&response.content)
                && !teardown_pending
                && run.state.tools_run >= self.config.min_tools_before_completion
            {
                info!(turn, tools_run = run.state.tools_run, "Model finished the analysis");
                return Ok(self.finish(run, ConversationStatus::Completed, final_text));
            }

            if !response.has_tool_calls() {
                let nudge = prompt::reminder(&self.config, run.state.tools_run, teardown_pending);
                debug!(turn, reminder = %nudge, "Model paused without finishing");
                messages.push(ChatMessage::user(nudge));
            }

            let forced = if turn >= self.config.budget_turn_threshold
                && run.state.tools_run >= self.config.budget_tool_threshold
            {
                Some(ConversationStatus::BudgetExhausted)
            } else if turn >= self.config.max_turns {
                Some(ConversationStatus::Truncated)
            } else {
                None
            };

            if let Some(status) = forced {
                warn!(turn, tools_run = run.state.tools_run, status = %status, "Forcing stop");
                if teardown_pending && !self.forced_teardown(&mut run).await {
                    return Ok(self.finish(run, ConversationStatus::Cancelled, final_text));
                }
                return Ok(self.finish(run, status, final_text));
            }
        }
    }

    /// Waits out the minimum spacing since the previous model call; false if cancelled
    async fn pace(&self, last_call: Option<Instant>, cancel: &CancellationToken) -> bool {
        let Some(last) = last_call else {
            return true;
        };
        let elapsed = last.elapsed();
        if elapsed >= self.config.min_call_interval {
            return true;
        }

        let wait = self.config.min_call_interval - elapsed;
        debug!(wait_ms = wait.as_millis(), "Spacing model calls");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(wait) => true,
        }
    }

    async fn forced_teardown(&self, run: &mut Run<'_>) -> bool {
        info!(tool = %self.config.teardown_tool, "Running teardown before stopping");
        let call = ToolCall::new(
            FORCED_TEARDOWN_CALL_ID,
            self.config.teardown_tool.clone(),
            json!({}),
        );
        let turn = run.state.turn;
        self.dispatch(&call, turn, run).await.is_some()
    }

    fn finish(
        &self,
        mut run: Run<'_>,
        status: ConversationStatus,
        final_text: String,
    ) -> ConversationOutcome {
        let phase = match status {
            ConversationStatus::Cancelled => Phase::Aborted,
            _ => Phase::Completed,
        };
        run.state.finish(phase);
        info!(
            request_id = %run.context.request_id,
            status = %status,
            turns = run.state.turn,
            tools_run = run.state.tools_run,
            "Agentic run finished"
        );

        ConversationOutcome {
            status,
            final_text,
            turns: run.state.turn,
            results: run.results,
            state: run.state,
        }
    }

    /// Executes one requested call and returns the message for the model
    ///
    /// `None` means cancellation was observed while the tool was running.
    async fn dispatch(&self, call: &ToolCall, turn: usize, run: &mut Run<'_>) -> Option<String> {
        let arguments = match self.prepare(call, &run.state) {
            Ok(arguments) => arguments,
            Err(message) => {
                warn!(tool = %call.name, call_id = %call.call_id, error = %message, "Rejected tool call");
                run.state.record(ToolCallRecord {
                    turn,
                    call_id: call.call_id.clone(),
                    tool: call.name.clone(),
                    arguments: call.arguments.clone(),
                    success: false,
                    duration: Duration::ZERO,
                    error: Some(message.clone()),
                });
                return Some(self.error_message(&message));
            }
        };

        // prepare() already checked the tool exists
        let tool = self.registry.get(&call.name)?;

        let percent = run.reporter.percent();
        run.reporter.emit(ProgressEvent::ToolStarted {
            tool: call.name.clone(),
            percent,
        });
        debug!(tool = %call.name, call_id = %call.call_id, "Executing tool");

        let result = tokio::select! {
            biased;
            _ = run.cancel.cancelled() => return None,
            result = run_tool(tool, run.context, arguments.clone(), self.config.tool_timeout) => result,
        };

        run.state.tools_run += 1;
        let percent = run.reporter.percent();
        run.reporter.emit(ProgressEvent::ToolCompleted {
            tool: result.tool_name.clone(),
            success: result.success,
            duration: result.duration,
            error: result.first_error().map(str::to_string),
            percent,
        });

        if result.success {
            self.absorb(&call.name, &result, run);
        } else {
            warn!(tool = %call.name, error = result.first_error().unwrap_or_default(), "Tool failed, returning error to model");
        }

        let message = if result.success {
            bounded(&result.payload.to_string(), self.config.max_output_chars)
        } else {
            self.error_message(result.first_error().unwrap_or("tool failed"))
        };

        run.state.record(ToolCallRecord {
            turn,
            call_id: call.call_id.clone(),
            tool: call.name.clone(),
            arguments,
            success: result.success,
            duration: result.duration,
            error: result.first_error().map(str::to_string),
        });
        run.results.push(result);
        Some(message)
    }

    /// Resolves the tool and builds its final arguments, or explains why not
    fn prepare(&self, call: &ToolCall, state: &ConversationState) -> Result<Value, String> {
        let Some(tool) = self.registry.get(&call.name) else {
            return Err(self.unknown_tool_message(&call.name));
        };
        if !tool.health() {
            return Err(format!("Tool '{}' is currently unavailable", call.name));
        }

        let mut arguments = match &call.arguments {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                return Err(format!(
                    "Invalid arguments for {}: expected a JSON object, got {}",
                    call.name, other
                ))
            }
        };

        let schema = tool.schema();
        let accepts_repo_path = schema.pointer("/properties/repo_path").is_some();
        if accepts_repo_path && !arguments.contains_key("repo_path") {
            if let Some(path) = &state.repo_path {
                debug!(tool = %call.name, repo_path = %path.display(), "Injecting repo_path");
                arguments.insert(
                    "repo_path".to_string(),
                    Value::String(path.display().to_string()),
                );
            }
        }

        let missing: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|required| {
                required
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|key| !arguments.contains_key(*key))
                    .collect()
            })
            .unwrap_or_default();
        if !missing.is_empty() {
            return Err(format!(
                "Invalid arguments for {}: missing required field(s): {}",
                call.name,
                missing.join(", ")
            ));
        }

        Ok(Value::Object(arguments))
    }

    /// Carries facts reported by a successful tool into the run
    fn absorb(&self, tool: &str, result: &ToolResult, run: &mut Run<'_>) {
        if tool == CLONE_TOOL {
            if let Some(path) = result.payload.get("repo_path").and_then(Value::as_str) {
                info!(repo_path = %path, "Repository materialized");
                run.state.repo_path = Some(PathBuf::from(path));
                run.context.repo_path = Some(PathBuf::from(path));
            }
        }
        if tool == self.config.teardown_tool {
            run.state.teardown_done = true;
        }

        let added = run.context.add_languages(result.detected_languages());
        if added > 0 {
            debug!(tool, languages = ?run.context.target_languages, "Refined target languages");
        }
    }

    fn unknown_tool_message(&self, name: &str) -> String {
        let names = self.registry.tool_names();
        let suggestion = names
            .iter()
            .map(|candidate| (strsim::normalized_levenshtein(name, candidate), *candidate))
            .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
            .max_by(|a, b| a.0.total_cmp(&b.0));

        match suggestion {
            Some((_, candidate)) => format!("Unknown tool '{}'. Did you mean '{}'?", name, candidate),
            None => format!(
                "Unknown tool '{}'. Available tools: {}",
                name,
                names.join(", ")
            ),
        }
    }

    fn error_message(&self, message: &str) -> String {
        json!({ "error": bounded(message, self.config.max_error_chars) }).to_string()
    }
}

/// Caps text at `max` characters, marking the cut
fn bounded(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max).collect();
    cut.push_str("... [truncated]");
    cut
}
