//! Batch executor
//!
//! Batches run strictly in order. Members of a parallel batch are awaited
//! concurrently inside the request task; a sequential batch awaits them one at
//! a time. Every invocation is wrapped in the same timeout, and failures of any
//! kind (error, timeout, panic) become failed [`ToolResult`]s so siblings keep
//! running.

use futures_util::stream::{FuturesUnordered, StreamExt};
use futures_util::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::plan::{Batch, ExecutionPlan};
use crate::context::AnalysisContext;
use crate::progress::{scaled, ProgressEvent, ProgressReporter};
use crate::tools::{AnalysisTool, ToolRegistry, ToolResult};

/// Upper bound of the percentage range the engine reports in
const ENGINE_END_PERCENT: u8 = 95;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub tool_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tool_timeout: Duration::from_secs(300),
        }
    }
}

impl EngineConfig {
    pub fn with_tool_timeout(mut self, tool_timeout: Duration) -> Self {
        self.tool_timeout = tool_timeout;
        self
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// Cancellation observed; `completed` holds results gathered so far
    #[error("Execution cancelled after {} tool result(s)", completed.len())]
    Cancelled { completed: Vec<ToolResult> },
}

/// Runs one tool under a timeout, converting every failure mode into a result
pub async fn run_tool(
    tool: Arc<dyn AnalysisTool>,
    context: &AnalysisContext,
    arguments: Value,
    timeout: Duration,
) -> ToolResult {
    let name = tool.name().to_string();
    let started = Instant::now();

    let call = AssertUnwindSafe(tool.execute(context, arguments)).catch_unwind();
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(Ok(payload))) => {
            ToolResult::success(name, payload, started.elapsed()).with_partial_warning()
        }
        Ok(Ok(Err(e))) => ToolResult::failure(name, format!("{:#}", e), started.elapsed()),
        Ok(Err(_panic)) => {
            warn!(tool = %name, "Tool panicked");
            ToolResult::failure(name, "tool panicked during execution", started.elapsed())
        }
        Err(_) => ToolResult::timed_out(name, timeout),
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionEngine {
    config: EngineConfig,
}

struct Tally {
    done: usize,
    total: usize,
    start: u8,
}

impl Tally {
    fn percent(&self) -> u8 {
        scaled(self.start, ENGINE_END_PERCENT, self.done, self.total)
    }
}

impl ExecutionEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Executes the plan, refining the context's languages between batches
    ///
    /// Returns every result in completion order. On cancellation no further
    /// tool is started and in-flight calls are dropped.
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        context: &mut AnalysisContext,
        registry: &ToolRegistry,
        reporter: &mut ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<Vec<ToolResult>, EngineError> {
        let mut results = Vec::with_capacity(plan.tool_count());
        let mut tally = Tally {
            done: 0,
            total: plan.tool_count(),
            start: reporter.percent(),
        };

        for (index, batch) in plan.batches.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled { completed: results });
            }

            info!(
                request_id = %context.request_id,
                batch = index + 1,
                of = plan.batches.len(),
                tools = ?batch.tools,
                parallel = batch.parallel,
                "Running batch"
            );
            reporter.emit(ProgressEvent::BatchStarted {
                index,
                total: plan.batches.len(),
                tools: batch.tools.clone(),
                parallel: batch.parallel,
                percent: tally.percent(),
            });

            let finished = results.len();
            let outcome = if batch.parallel {
                self.run_parallel(batch, context, registry, reporter, cancel, &mut tally, &mut results)
                    .await
            } else {
                self.run_sequential(batch, context, registry, reporter, cancel, &mut tally, &mut results)
                    .await
            };
            if outcome.is_err() {
                return Err(EngineError::Cancelled { completed: results });
            }

            refine_languages(context, &results[finished..]);
        }

        Ok(results)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_parallel(
        &self,
        batch: &Batch,
        context: &AnalysisContext,
        registry: &ToolRegistry,
        reporter: &mut ProgressReporter,
        cancel: &CancellationToken,
        tally: &mut Tally,
        results: &mut Vec<ToolResult>,
    ) -> Result<(), ()> {
        let mut pending = FuturesUnordered::new();
        for name in &batch.tools {
            reporter.emit(ProgressEvent::ToolStarted {
                tool: name.clone(),
                percent: tally.percent(),
            });
            pending.push(self.dispatch(name, context, registry));
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(in_flight = pending.len(), "Dropping in-flight tools on cancellation");
                    return Err(());
                }
                next = pending.next() => match next {
                    Some(result) => record(result, reporter, tally, results),
                    None => return Ok(()),
                },
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_sequential(
        &self,
        batch: &Batch,
        context: &AnalysisContext,
        registry: &ToolRegistry,
        reporter: &mut ProgressReporter,
        cancel: &CancellationToken,
        tally: &mut Tally,
        results: &mut Vec<ToolResult>,
    ) -> Result<(), ()> {
        for name in &batch.tools {
            if cancel.is_cancelled() {
                return Err(());
            }
            reporter.emit(ProgressEvent::ToolStarted {
                tool: name.clone(),
                percent: tally.percent(),
            });

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(()),
                result = self.dispatch(name, context, registry) => record(result, reporter, tally, results),
            }
        }
        Ok(())
    }

    async fn dispatch(
        &self,
        name: &str,
        context: &AnalysisContext,
        registry: &ToolRegistry,
    ) -> ToolResult {
        match registry.get(name) {
            Some(tool) => {
                run_tool(tool, context, context.tool_arguments(), self.config.tool_timeout).await
            }
            None => ToolResult::failure(name, format!("Unknown tool: {}", name), Duration::ZERO),
        }
    }
}

fn record(
    result: ToolResult,
    reporter: &mut ProgressReporter,
    tally: &mut Tally,
    results: &mut Vec<ToolResult>,
) {
    tally.done += 1;
    reporter.emit(ProgressEvent::ToolCompleted {
        tool: result.tool_name.clone(),
        success: result.success,
        duration: result.duration,
        error: result.first_error().map(str::to_string),
        percent: tally.percent(),
    });
    results.push(result);
}

fn refine_languages(context: &mut AnalysisContext, batch_results: &[ToolResult]) {
    for result in batch_results.iter().filter(|r| r.success) {
        let added = context.add_languages(result.detected_languages());
        if added > 0 {
            info!(
                tool = %result.tool_name,
                added,
                languages = ?context.target_languages,
                "Refined target languages"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{ExecutionPlanner, PlannerConfig};
    use crate::tools::testing::{ScriptedTool, ToolBehavior};
    use serde_json::json;

    fn registry(tools: Vec<ScriptedTool>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(Arc::new(tool)).unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn test_hanging_tool_times_out_without_blocking_siblings() {
        let registry = registry(vec![
            ScriptedTool::new("stuck").with_behavior(ToolBehavior::Hang),
            ScriptedTool::new("quick"),
            ScriptedTool::new("broken").with_behavior(ToolBehavior::Fail("bad input".into())),
        ]);
        let mut ctx = AnalysisContext::new("repo", "explore");
        let plan = ExecutionPlanner::default().plan(&registry, &ctx, &["stuck", "quick", "broken"]);
        let engine =
            ExecutionEngine::new(EngineConfig::default().with_tool_timeout(Duration::from_millis(100)));

        let started = Instant::now();
        let results = engine
            .execute(
                &plan,
                &mut ctx,
                &registry,
                &mut ProgressReporter::silent(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(results.len(), 3);
        let stuck = results.iter().find(|r| r.tool_name == "stuck").unwrap();
        assert!(!stuck.success);
        assert!(stuck.first_error().unwrap().contains("timed out"));
        assert!(results.iter().any(|r| r.tool_name == "quick" && r.success));
        let broken = results.iter().find(|r| r.tool_name == "broken").unwrap();
        assert_eq!(broken.first_error(), Some("bad input"));
    }

    #[tokio::test]
    async fn test_languages_refined_between_batches() {
        let first = ScriptedTool::new("first").with_behavior(ToolBehavior::Succeed(
            json!({ "detected_languages": ["rust", "go"] }),
        ));
        let second = ScriptedTool::new("second");
        let probe = second.argument_probe();
        let registry = registry(vec![first, second]);

        let mut ctx = AnalysisContext::new("repo", "explore").with_languages(["go"]);
        let planner = ExecutionPlanner::new(PlannerConfig::default().with_max_parallel(1));
        let plan = planner.plan(&registry, &ctx, &["first", "second"]);
        assert_eq!(plan.batches.len(), 2);

        ExecutionEngine::default()
            .execute(
                &plan,
                &mut ctx,
                &registry,
                &mut ProgressReporter::silent(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(ctx.target_languages, vec!["go", "rust"]);
        assert!(probe.lock().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let tool = ScriptedTool::new("never");
        let calls = tool.call_counter();
        let registry = registry(vec![tool]);
        let mut ctx = AnalysisContext::new("repo", "explore");
        let plan = ExecutionPlanner::default().plan(&registry, &ctx, &["never"]);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = ExecutionEngine::default()
            .execute(&plan, &mut ctx, &registry, &mut ProgressReporter::silent(), &cancel)
            .await
            .unwrap_err();

        let EngineError::Cancelled { completed } = err;
        assert!(completed.is_empty());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_tool_reports_success_duration() {
        let tool: Arc<dyn AnalysisTool> = Arc::new(ScriptedTool::new("t").with_behavior(
            ToolBehavior::Delay(Duration::from_millis(20), json!({"ok": true})),
        ));
        let ctx = AnalysisContext::new("repo", "explore");
        let result = run_tool(tool, &ctx, json!({}), Duration::from_secs(1)).await;
        assert!(result.success);
        assert!(result.duration >= Duration::from_millis(20));
        assert_eq!(result.payload["ok"], true);
        assert!(result.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_run_tool_warns_on_truncated_walk() {
        let tool: Arc<dyn AnalysisTool> = Arc::new(
            ScriptedTool::new("explorer")
                .with_behavior(ToolBehavior::Succeed(json!({"file_count": 3, "truncated": true}))),
        );
        let ctx = AnalysisContext::new("repo", "explore");
        let result = run_tool(tool, &ctx, json!({}), Duration::from_secs(1)).await;
        assert!(result.success);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("partial results"));
    }
}
