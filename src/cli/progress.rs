//! Terminal progress bar driven by progress events

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::progress::{ProgressEvent, ProgressHandler};

const TEMPLATE: &str = "{spinner:.cyan} [{bar:30.cyan/blue}] {pos:>3}% {wide_msg}";

pub struct ProgressBarHandler {
    bar: ProgressBar,
}

impl ProgressBarHandler {
    /// Bar drawn on stderr so stdout stays clean for the report
    pub fn new() -> Self {
        let bar = ProgressBar::with_draw_target(Some(100), ProgressDrawTarget::stderr());
        if let Ok(style) = ProgressStyle::with_template(TEMPLATE) {
            bar.set_style(style.progress_chars("=> "));
        }
        Self { bar }
    }

    /// Handler that tracks state without drawing anything
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    fn message(event: &ProgressEvent) -> String {
        match event {
            ProgressEvent::PlanCreated { batches, tools, .. } => {
                format!("planned {} tool(s) in {} batch(es)", tools, batches)
            }
            ProgressEvent::BatchStarted { index, total, tools, .. } => {
                format!("batch {}/{}: {}", index + 1, total, tools.join(", "))
            }
            ProgressEvent::ToolStarted { tool, .. } => format!("running {}", tool),
            ProgressEvent::ToolCompleted { tool, success, .. } => {
                if *success {
                    format!("{} done", tool)
                } else {
                    format!("{} failed", tool)
                }
            }
            ProgressEvent::TurnUpdate {
                turn,
                max_turns,
                tool_calls,
                ..
            } => format!("turn {}/{} ({} tool call(s))", turn, max_turns, tool_calls),
            ProgressEvent::Completed { status, .. } => status.clone(),
            ProgressEvent::Error { message, .. } => format!("error: {}", message),
        }
    }
}

impl Default for ProgressBarHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressHandler for ProgressBarHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        self.bar.set_position(u64::from(event.percent()));
        self.bar.set_message(Self::message(event));
        match event {
            ProgressEvent::Completed { .. } => self.bar.finish_and_clear(),
            ProgressEvent::Error { .. } => self.bar.abandon(),
            ProgressEvent::ToolCompleted { .. } | ProgressEvent::TurnUpdate { .. } => {
                self.bar.tick()
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_bar_tracks_percent() {
        let handler = ProgressBarHandler::hidden();
        handler.on_progress(&ProgressEvent::ToolStarted {
            tool: "explorer".to_string(),
            percent: 40,
        });
        assert_eq!(handler.position(), 40);
    }

    #[test]
    fn test_messages() {
        let event = ProgressEvent::TurnUpdate {
            turn: 2,
            max_turns: 30,
            tool_calls: 1,
            percent: 6,
        };
        assert_eq!(ProgressBarHandler::message(&event), "turn 2/30 (1 tool call(s))");
    }
}
