//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{debug, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::PlanCreated {
                request_id,
                batches,
                tools,
                percent,
            } => {
                info!(request_id = %request_id, batches, tools, percent, "Execution plan created");
            }
            ProgressEvent::BatchStarted {
                index,
                total,
                tools,
                parallel,
                percent,
            } => {
                info!(
                    batch = format!("{}/{}", index + 1, total),
                    tools = ?tools,
                    parallel,
                    percent,
                    "Starting batch"
                );
            }
            ProgressEvent::ToolStarted { tool, percent } => {
                debug!(tool = %tool, percent, "Tool started");
            }
            ProgressEvent::ToolCompleted {
                tool,
                success,
                duration,
                error,
                percent,
            } => {
                if *success {
                    info!(
                        tool = %tool,
                        duration_ms = duration.as_millis(),
                        percent,
                        "Tool completed"
                    );
                } else {
                    warn!(
                        tool = %tool,
                        duration_ms = duration.as_millis(),
                        error = error.as_deref().unwrap_or("unknown"),
                        percent,
                        "Tool failed"
                    );
                }
            }
            ProgressEvent::TurnUpdate {
                turn,
                max_turns,
                tool_calls,
                percent,
            } => {
                debug!(turn, max_turns, tool_calls, percent, "Turn finished");
            }
            ProgressEvent::Completed {
                status,
                succeeded,
                failed,
                duration,
                ..
            } => {
                info!(
                    status = %status,
                    succeeded,
                    failed,
                    total_time_ms = duration.as_millis(),
                    "Analysis complete"
                );
            }
            ProgressEvent::Error { message, percent } => {
                warn!(error = %message, percent, "Analysis aborted");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_logging_all_events() {
        let handler = LoggingHandler;

        let events = vec![
            ProgressEvent::PlanCreated {
                request_id: "r1".to_string(),
                batches: 2,
                tools: 4,
                percent: 5,
            },
            ProgressEvent::BatchStarted {
                index: 0,
                total: 2,
                tools: vec!["explorer".to_string()],
                parallel: true,
                percent: 5,
            },
            ProgressEvent::ToolStarted {
                tool: "explorer".to_string(),
                percent: 5,
            },
            ProgressEvent::ToolCompleted {
                tool: "explorer".to_string(),
                success: false,
                duration: Duration::from_millis(10),
                error: Some("timed out".to_string()),
                percent: 50,
            },
            ProgressEvent::TurnUpdate {
                turn: 1,
                max_turns: 30,
                tool_calls: 2,
                percent: 50,
            },
            ProgressEvent::Completed {
                status: "completed".to_string(),
                succeeded: 1,
                failed: 1,
                duration: Duration::from_secs(1),
                percent: 100,
            },
            ProgressEvent::Error {
                message: "model unreachable".to_string(),
                percent: 100,
            },
        ];

        for event in events {
            handler.on_progress(&event);
        }
    }
}
