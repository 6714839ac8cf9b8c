//! Request-level orchestration
//!
//! [`AnalysisService`] is the entry point embedders call. It owns the shared
//! tool registry and the per-request cancellation tokens and runs a request in
//! one of two modes:
//!
//! - **Static**: analyze the request, materialize the repository, select tools,
//!   plan batches and execute them.
//! - **Agentic**: hand the tool catalog to the model and let the conversational
//!   loop decide what to run.
//!
//! Tool failures never fail a request; they show up in the report. Only a model
//! that cannot be reached, a repository that cannot be materialized and
//! cancellation end a request with an error.
//!
//! # Example
//!
//! ```no_run
//! use reposcope::service::{AnalysisRequest, AnalysisService};
//! use reposcope::progress::LoggingHandler;
//! use reposcope::ReposcopeConfig;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ReposcopeConfig::default();
//! let service = AnalysisService::from_config(&config).await?;
//!
//! let request = AnalysisRequest::new("https://github.com/owner/repo", "scan for vulnerabilities");
//! let report = service.analyze(request, Arc::new(LoggingHandler)).await?;
//! println!("{}", report.summary_line());
//! # Ok(())
//! # }
//! ```

use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{ConfigError, ReposcopeConfig};
use crate::context::{AnalysisContext, ContextAnalyzer};
use crate::conversation::{ConversationConfig, ConversationError, ConversationalOrchestrator};
use crate::execution::{CancellationRegistry, EngineError, ExecutionEngine, ExecutionPlanner};
use crate::llm::{select_llm_client, LLMClient};
use crate::progress::{ProgressEvent, ProgressHandler, ProgressReporter};
use crate::report::{AnalysisMode, AnalysisReport, ReportStatus};
use crate::tools::implementations::builtin_factories;
use crate::tools::{ToolRegistry, Workspace};
use crate::workflow::{WorkflowGraph, WorkflowGraphValidator, WorkflowVerdict};

const PLAN_PERCENT: u8 = 5;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("No LLM backend available: {0}")]
    NoBackend(String),

    #[error("Repository could not be materialized: {repository}: {reason}")]
    Materialize { repository: String, reason: String },

    #[error(transparent)]
    Conversation(#[from] ConversationError),

    /// Partial results gathered before the request was cancelled
    #[error("Request {request_id} was cancelled")]
    Cancelled {
        request_id: String,
        partial: Box<AnalysisReport>,
    },
}

impl ServiceError {
    /// Returns a user-friendly error message with troubleshooting hints
    pub fn help_message(&self) -> String {
        match self {
            ServiceError::Config(e) => format!(
                "{}\n\nCheck the REPOSCOPE_* environment variables and command-line flags.",
                e
            ),
            ServiceError::NoBackend(msg) => format!(
                "No model backend could be initialized: {}\n\n\
                 Troubleshooting:\n\
                 - Set REPOSCOPE_PROVIDER and the provider's API key variable\n\
                 - Or start Ollama locally: ollama serve\n\
                 - Static analysis without a model: reposcope analyze --no-model <repo>",
                msg
            ),
            ServiceError::Materialize { repository, reason } => format!(
                "Could not prepare repository {}: {}\n\n\
                 Troubleshooting:\n\
                 - Local paths must point to an existing directory\n\
                 - Remote URLs need git on PATH and network access\n\
                 - Private repositories need credentials configured for git",
                repository, reason
            ),
            ServiceError::Conversation(ConversationError::Model { turn, source }) => format!(
                "The model stopped responding on turn {}: {}\n\n\
                 Troubleshooting:\n\
                 - Verify the provider is reachable and the API key is valid\n\
                 - Increase REPOSCOPE_REQUEST_TIMEOUT for slow local models",
                turn, source
            ),
            ServiceError::Conversation(ConversationError::NoTools) => {
                "No healthy tools are registered; run `reposcope health` to see which tools failed."
                    .to_string()
            }
            ServiceError::Cancelled {
                request_id,
                partial,
            } => format!(
                "Request {} was cancelled after {} tool(s) finished.",
                request_id,
                partial.results.len()
            ),
        }
    }
}

/// What to analyze and how to identify the request
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub repository: String,
    pub request: String,
    pub request_id: String,
    pub params: Map<String, Value>,
}

impl AnalysisRequest {
    pub fn new(repository: impl Into<String>, request: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            request: request.into(),
            request_id: uuid::Uuid::new_v4().to_string(),
            params: Map::new(),
        }
    }

    /// Fixes the id up front so the caller can cancel the request while it runs
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    fn apply(&self, mut context: AnalysisContext) -> AnalysisContext {
        context.request_id = self.request_id.clone();
        context.params.extend(self.params.clone());
        context
    }
}

/// Removes the request's token however the request ends
struct Registration<'a> {
    registry: &'a CancellationRegistry,
    request_id: String,
}

impl<'a> Registration<'a> {
    fn new(registry: &'a CancellationRegistry, request_id: &str) -> (Self, CancellationToken) {
        let token = registry.register(request_id);
        (
            Self {
                registry,
                request_id: request_id.to_string(),
            },
            token,
        )
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.remove(&self.request_id);
    }
}

pub struct AnalysisService {
    registry: Arc<ToolRegistry>,
    llm: Option<Arc<dyn LLMClient>>,
    analyzer: ContextAnalyzer,
    planner: ExecutionPlanner,
    engine: ExecutionEngine,
    conversation: ConversationConfig,
    workspace: Workspace,
    cancellations: Arc<CancellationRegistry>,
}

impl AnalysisService {
    /// Assembles a service from already-built parts
    pub fn new(
        registry: Arc<ToolRegistry>,
        llm: Option<Arc<dyn LLMClient>>,
        workspace: Workspace,
        config: &ReposcopeConfig,
    ) -> Self {
        let analyzer = match &llm {
            Some(llm) => ContextAnalyzer::new(Arc::clone(llm)),
            None => ContextAnalyzer::without_model(),
        };
        Self {
            registry,
            llm,
            analyzer,
            planner: ExecutionPlanner::new(config.planner_config()),
            engine: ExecutionEngine::new(config.engine_config()),
            conversation: config.conversation_config(),
            workspace,
            cancellations: Arc::new(CancellationRegistry::new()),
        }
    }

    /// Selects a model backend and discovers the built-in tools
    pub async fn from_config(config: &ReposcopeConfig) -> Result<Self, ServiceError> {
        config.validate()?;
        let selected = select_llm_client(config)
            .await
            .map_err(|e| ServiceError::NoBackend(e.to_string()))?;
        info!(backend = %selected.description, "Model backend selected");
        Ok(Self::with_builtin_tools(config, Some(selected.client)))
    }

    /// Built-in tools with an optional model; static mode works without one
    pub fn with_builtin_tools(config: &ReposcopeConfig, llm: Option<Arc<dyn LLMClient>>) -> Self {
        let workspace = Workspace::new(&config.workspace_dir);
        let registry = ToolRegistry::discover(builtin_factories(workspace.clone(), llm.clone()));
        Self::new(Arc::new(registry), llm, workspace, config)
    }

    pub fn with_conversation_config(mut self, conversation: ConversationConfig) -> Self {
        self.conversation = conversation;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn has_model(&self) -> bool {
        self.llm.is_some()
    }

    /// Shared handle for cancelling requests from another task
    pub fn cancellations(&self) -> Arc<CancellationRegistry> {
        Arc::clone(&self.cancellations)
    }

    /// Cancels a running request; false when no such request is active
    pub fn cancel(&self, request_id: &str) -> bool {
        self.cancellations.cancel(request_id)
    }

    /// Static mode: intent analysis, planning and batched execution
    pub async fn analyze(
        &self,
        request: AnalysisRequest,
        handler: Arc<dyn ProgressHandler>,
    ) -> Result<AnalysisReport, ServiceError> {
        let started = Instant::now();
        let (_registration, cancel) = Registration::new(&self.cancellations, &request.request_id);
        let mut reporter = ProgressReporter::new(handler);

        let mut context = request.apply(
            self.analyzer
                .analyze(&request.repository, &request.request)
                .await,
        );

        let materialized = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let report = AnalysisReport::new(
                    AnalysisMode::Static,
                    ReportStatus::Cancelled,
                    &context,
                    Vec::new(),
                    started.elapsed(),
                );
                return Err(self.cancelled(report, &mut reporter));
            }
            result = self.workspace.materialize(&context.repository) => result,
        };
        let materialized = match materialized {
            Ok(materialized) => materialized,
            Err(e) => {
                let reason = format!("{:#}", e);
                let percent = reporter.percent();
                reporter.emit(ProgressEvent::Error {
                    message: reason.clone(),
                    percent,
                });
                return Err(ServiceError::Materialize {
                    repository: context.repository.clone(),
                    reason,
                });
            }
        };
        context.repo_path = Some(materialized.path.clone());

        let selected = self.analyzer.select_tools(&self.registry, &context);
        let plan = self.planner.plan_tools(&self.registry, &context, &selected);
        reporter.emit(ProgressEvent::PlanCreated {
            request_id: context.request_id.clone(),
            batches: plan.batches.len(),
            tools: plan.tool_count(),
            percent: PLAN_PERCENT,
        });

        let executed = self
            .engine
            .execute(&plan, &mut context, &self.registry, &mut reporter, &cancel)
            .await;

        if materialized.cloned {
            self.release(&materialized.path).await;
        }

        let (status, results) = match executed {
            Ok(results) => (ReportStatus::Completed, results),
            Err(EngineError::Cancelled { completed }) => (ReportStatus::Cancelled, completed),
        };
        let report = AnalysisReport::new(
            AnalysisMode::Static,
            status,
            &context,
            results,
            started.elapsed(),
        )
        .with_intent(context.intent)
        .with_plan(plan);

        if status == ReportStatus::Cancelled {
            return Err(self.cancelled(report, &mut reporter));
        }
        Ok(self.completed(report, &mut reporter))
    }

    /// Agentic mode: the model drives tool selection turn by turn
    pub async fn run_agent(
        &self,
        request: AnalysisRequest,
        handler: Arc<dyn ProgressHandler>,
    ) -> Result<AnalysisReport, ServiceError> {
        let llm = self.llm.clone().ok_or_else(|| {
            ServiceError::NoBackend("agentic mode requires a model".to_string())
        })?;

        let started = Instant::now();
        let (_registration, cancel) = Registration::new(&self.cancellations, &request.request_id);
        let mut reporter = ProgressReporter::new(handler);
        let mut context = request.apply(AnalysisContext::new(
            request.repository.clone(),
            request.request.clone(),
        ));

        let orchestrator = ConversationalOrchestrator::new(
            llm,
            Arc::clone(&self.registry),
            self.conversation.clone(),
        );
        let outcome = orchestrator.run(&mut context, &mut reporter, &cancel).await;

        // A clone the model never tore down is ours to remove
        let teardown_done = outcome.as_ref().map_or(false, |o| o.state.teardown_done);
        if !teardown_done {
            if let Some(path) = context.repo_path.clone() {
                self.release(&path).await;
            }
        }

        let outcome = outcome?;
        let status = ReportStatus::from(outcome.status);
        let report = AnalysisReport::new(
            AnalysisMode::Agentic,
            status,
            &context,
            outcome.results,
            started.elapsed(),
        )
        .with_conversation(outcome.final_text, outcome.turns);

        if status == ReportStatus::Cancelled {
            return Err(self.cancelled(report, &mut reporter));
        }
        Ok(self.completed(report, &mut reporter))
    }

    /// Structural, cycle and model coherence checks for a tool pipeline
    pub async fn validate_workflow(
        &self,
        graph: &WorkflowGraph,
    ) -> Result<WorkflowVerdict, ServiceError> {
        let llm = self.llm.clone().ok_or_else(|| {
            ServiceError::NoBackend("workflow validation requires a model".to_string())
        })?;
        Ok(WorkflowGraphValidator::new(llm).validate(graph).await)
    }

    async fn release(&self, path: &std::path::Path) {
        if let Err(e) = self.workspace.cleanup(path).await {
            warn!(path = %path.display(), error = %e, "Failed to remove workspace");
        }
    }

    fn completed(&self, report: AnalysisReport, reporter: &mut ProgressReporter) -> AnalysisReport {
        info!(
            request_id = %report.request_id,
            mode = %report.mode,
            status = %report.status,
            succeeded = report.succeeded,
            failed = report.failed,
            duration_ms = report.duration.as_millis() as u64,
            "Request finished"
        );
        reporter.emit(ProgressEvent::Completed {
            status: report.status.to_string(),
            succeeded: report.succeeded,
            failed: report.failed,
            duration: report.duration,
            percent: 100,
        });
        report
    }

    fn cancelled(&self, report: AnalysisReport, reporter: &mut ProgressReporter) -> ServiceError {
        warn!(
            request_id = %report.request_id,
            finished = report.results.len(),
            "Request cancelled"
        );
        let percent = reporter.percent();
        reporter.emit(ProgressEvent::Error {
            message: "request cancelled".to_string(),
            percent,
        });
        ServiceError::Cancelled {
            request_id: report.request_id.clone(),
            partial: Box::new(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{BackendError, MockLLMClient, MockResponse};
    use crate::progress::{ChannelHandler, NoOpHandler};
    use crate::tools::testing::{ScriptedTool, ToolBehavior};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_stream::StreamExt;

    fn config(dir: &TempDir) -> ReposcopeConfig {
        ReposcopeConfig {
            workspace_dir: dir.path().join("ws"),
            ..ReposcopeConfig::default()
        }
    }

    fn service(dir: &TempDir, tools: Vec<ScriptedTool>, llm: Option<Arc<dyn LLMClient>>) -> AnalysisService {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(Arc::new(tool)).unwrap();
        }
        let config = config(dir);
        AnalysisService::new(
            Arc::new(registry),
            llm,
            Workspace::new(&config.workspace_dir),
            &config,
        )
    }

    #[tokio::test]
    async fn test_static_run_reports_failures_without_failing() {
        let dir = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        let service = service(
            &dir,
            vec![
                ScriptedTool::new("explorer"),
                ScriptedTool::new("broken")
                    .with_behavior(ToolBehavior::Fail("parse error".to_string())),
            ],
            None,
        );

        let (handler, mut events) = ChannelHandler::new();
        let report = service
            .analyze(
                AnalysisRequest::new(repo.path().to_str().unwrap(), "look around"),
                Arc::new(handler),
            )
            .await
            .unwrap();

        assert_eq!(report.status, ReportStatus::Completed);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert!(report.plan.is_some());
        drop(service);

        let mut last = 0;
        let mut names = Vec::new();
        while let Some(event) = events.next().await {
            assert!(event.percent() >= last);
            last = event.percent();
            names.push(event.name());
        }
        assert_eq!(names.first(), Some(&"plan-created"));
        assert_eq!(names.last(), Some(&"completed"));
        assert_eq!(last, 100);
    }

    #[tokio::test]
    async fn test_missing_local_repository_is_terminal() {
        let dir = TempDir::new().unwrap();
        let service = service(
            &dir,
            vec![ScriptedTool::new("explorer")],
            None,
        );
        let err = service
            .analyze(
                AnalysisRequest::new("/no/such/repository", "explore"),
                Arc::new(NoOpHandler),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Materialize { .. }));
        assert!(err.help_message().contains("existing directory"));
    }

    #[tokio::test]
    async fn test_cancel_returns_partial_report() {
        let dir = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        let service = Arc::new(service(
            &dir,
            vec![
                ScriptedTool::new("explorer"),
                ScriptedTool::new("slow")
                    .with_estimate(Duration::from_secs(600))
                    .with_behavior(ToolBehavior::Hang),
            ],
            None,
        ));

        let runner = Arc::clone(&service);
        let path = repo.path().to_str().unwrap().to_string();
        let task = tokio::spawn(async move {
            runner
                .analyze(
                    AnalysisRequest::new(path, "explore").with_request_id("req-1"),
                    Arc::new(NoOpHandler),
                )
                .await
        });

        while !service.cancellations().active().contains(&"req-1".to_string()) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(service.cancel("req-1"));

        match task.await.unwrap() {
            Err(ServiceError::Cancelled { partial, .. }) => {
                assert_eq!(partial.status, ReportStatus::Cancelled);
                assert!(partial.results.iter().all(|r| r.tool_name != "slow"));
            }
            other => panic!("expected cancellation, got {:?}", other.map(|r| r.status)),
        }
        assert!(service.cancellations().active().is_empty());
    }

    #[tokio::test]
    async fn test_agent_requires_model() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, Vec::new(), None);
        let err = service
            .run_agent(AnalysisRequest::new("repo", "explore"), Arc::new(NoOpHandler))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NoBackend(_)));
    }

    #[tokio::test]
    async fn test_agent_model_failure_is_terminal() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockLLMClient::new());
        mock.add_response(MockResponse::error(BackendError::TimeoutError { seconds: 5 }));
        let service = service(
            &dir,
            vec![ScriptedTool::new("explorer")],
            Some(mock as Arc<dyn LLMClient>),
        )
        .with_conversation_config(
            ConversationConfig::default().with_min_call_interval(Duration::ZERO),
        );

        let err = service
            .run_agent(AnalysisRequest::new("repo", "explore"), Arc::new(NoOpHandler))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Conversation(ConversationError::Model { turn: 1, .. })
        ));
    }
}
