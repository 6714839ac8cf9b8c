//! Progress handler trait and events

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Events emitted while a request runs
///
/// Every event carries the overall completion percentage. Within one request
/// the percentages never decrease; [`ProgressReporter`] enforces that.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ProgressEvent {
    /// Execution plan built (static mode)
    PlanCreated {
        request_id: String,
        batches: usize,
        tools: usize,
        percent: u8,
    },

    /// A batch is about to run
    BatchStarted {
        index: usize,
        total: usize,
        tools: Vec<String>,
        parallel: bool,
        percent: u8,
    },

    /// Tool dispatched
    ToolStarted { tool: String, percent: u8 },

    /// Tool finished, successfully or not
    ToolCompleted {
        tool: String,
        success: bool,
        #[serde(with = "crate::util::duration_ms")]
        duration: Duration,
        error: Option<String>,
        percent: u8,
    },

    /// Agentic turn boundary
    TurnUpdate {
        turn: usize,
        max_turns: usize,
        tool_calls: usize,
        percent: u8,
    },

    /// Request finished
    Completed {
        status: String,
        succeeded: usize,
        failed: usize,
        #[serde(with = "crate::util::duration_ms")]
        duration: Duration,
        percent: u8,
    },

    /// Request aborted
    Error { message: String, percent: u8 },
}

impl ProgressEvent {
    pub fn percent(&self) -> u8 {
        match self {
            ProgressEvent::PlanCreated { percent, .. }
            | ProgressEvent::BatchStarted { percent, .. }
            | ProgressEvent::ToolStarted { percent, .. }
            | ProgressEvent::ToolCompleted { percent, .. }
            | ProgressEvent::TurnUpdate { percent, .. }
            | ProgressEvent::Completed { percent, .. }
            | ProgressEvent::Error { percent, .. } => *percent,
        }
    }

    fn percent_mut(&mut self) -> &mut u8 {
        match self {
            ProgressEvent::PlanCreated { percent, .. }
            | ProgressEvent::BatchStarted { percent, .. }
            | ProgressEvent::ToolStarted { percent, .. }
            | ProgressEvent::ToolCompleted { percent, .. }
            | ProgressEvent::TurnUpdate { percent, .. }
            | ProgressEvent::Completed { percent, .. }
            | ProgressEvent::Error { percent, .. } => percent,
        }
    }

    /// Same event with the percentage raised to at least `floor`, capped at 100
    pub fn at_least(mut self, floor: u8) -> Self {
        let percent = self.percent_mut();
        *percent = (*percent).max(floor).min(100);
        self
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::PlanCreated { .. } => "plan-created",
            ProgressEvent::BatchStarted { .. } => "batch-started",
            ProgressEvent::ToolStarted { .. } => "tool-started",
            ProgressEvent::ToolCompleted { .. } => "tool-completed",
            ProgressEvent::TurnUpdate { .. } => "turn-update",
            ProgressEvent::Completed { .. } => "completed",
            ProgressEvent::Error { .. } => "error",
        }
    }
}

/// Trait for handling progress events
pub trait ProgressHandler: Send + Sync {
    /// Called when a progress event occurs
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

/// Per-request emitter that keeps percentages monotonic
pub struct ProgressReporter {
    handler: Arc<dyn ProgressHandler>,
    last: u8,
}

impl ProgressReporter {
    pub fn new(handler: Arc<dyn ProgressHandler>) -> Self {
        Self { handler, last: 0 }
    }

    pub fn silent() -> Self {
        Self::new(Arc::new(NoOpHandler))
    }

    /// Last percentage emitted
    pub fn percent(&self) -> u8 {
        self.last
    }

    pub fn emit(&mut self, event: ProgressEvent) {
        let event = event.at_least(self.last);
        self.last = event.percent();
        self.handler.on_progress(&event);
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("last", &self.last)
            .finish()
    }
}

/// Linear progress between `start` and `end` after `done` of `total` steps
pub fn scaled(start: u8, end: u8, done: usize, total: usize) -> u8 {
    if total == 0 {
        return end;
    }
    let span = end.saturating_sub(start) as usize;
    let step = span * done.min(total) / total;
    start.saturating_add(step as u8)
}
