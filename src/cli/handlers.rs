//! Command handlers; each returns the process exit code

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::commands::{
    AgentArgs, AnalyzeArgs, HealthArgs, ModelArgs, OutputArgs, ToolsArgs, ValidateWorkflowArgs,
};
use super::output::{HealthStatus, OutputFormat, OutputFormatter};
use super::progress::ProgressBarHandler;
use crate::config::ReposcopeConfig;
use crate::llm::{select_llm_client, LLMClient};
use crate::progress::{LoggingHandler, ProgressHandler};
use crate::report::AnalysisReport;
use crate::service::{AnalysisRequest, AnalysisService, ServiceError};
use crate::tools::implementations::builtin_factories;
use crate::tools::{ToolRegistry, Workspace};
use crate::workflow::WorkflowGraph;

const EXIT_OK: i32 = 0;
const EXIT_FAILURE: i32 = 1;
const EXIT_INVALID: i32 = 2;
const EXIT_CANCELLED: i32 = 130;

fn build_config(model: &ModelArgs) -> ReposcopeConfig {
    let mut config = ReposcopeConfig::default();
    if let Some(provider) = model.provider {
        config.provider = provider;
    }
    if let Some(name) = &model.model {
        config.model = name.clone();
    }
    if let Some(timeout) = model.timeout {
        config.request_timeout_secs = timeout;
    }
    config
}

fn finish_config(config: ReposcopeConfig) -> Result<ReposcopeConfig, i32> {
    match config.validate() {
        Ok(()) => Ok(config),
        Err(e) => {
            eprintln!("Error: {}", e);
            Err(EXIT_FAILURE)
        }
    }
}

fn write_output(text: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, text)
                .with_context(|| format!("Failed to write output to {}", path.display()))?;
            info!(path = %path.display(), "Output written");
        }
        None => println!("{}", text.trim_end()),
    }
    Ok(())
}

fn progress_handler(format: OutputFormat, quiet: bool, no_progress: bool) -> Arc<dyn ProgressHandler> {
    if quiet || no_progress || format != OutputFormat::Human {
        Arc::new(LoggingHandler)
    } else {
        Arc::new(ProgressBarHandler::new())
    }
}

/// Cancels the request on Ctrl-C
fn cancel_on_interrupt(service: &AnalysisService, request_id: &str) {
    let cancellations = service.cancellations();
    let request_id = request_id.to_string();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(request_id = %request_id, "Interrupted, cancelling request");
            cancellations.cancel(&request_id);
        }
    });
}

/// Parameter values that parse as JSON keep their type; anything else is a string
fn param_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn emit_report(report: &AnalysisReport, output: &OutputArgs) -> i32 {
    let formatter = OutputFormatter::new(output.format.into());
    match formatter
        .format_report(report)
        .and_then(|text| write_output(&text, output.output.as_deref()))
    {
        Ok(()) => EXIT_OK,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_FAILURE
        }
    }
}

fn report_failure(error: ServiceError, output: &OutputArgs) -> i32 {
    match error {
        ServiceError::Cancelled { partial, .. } => {
            eprintln!("Request cancelled; partial results follow.");
            emit_report(&partial, output);
            EXIT_CANCELLED
        }
        other => {
            eprintln!("Error: {}\n", other);
            eprintln!("{}", other.help_message());
            EXIT_FAILURE
        }
    }
}

pub async fn handle_analyze(args: &AnalyzeArgs, quiet: bool) -> i32 {
    let mut config = build_config(&args.model);
    if let Some(max_parallel) = args.max_parallel {
        config.max_parallel = max_parallel;
    }
    if let Some(timeout) = args.tool_timeout {
        config.tool_timeout_secs = timeout;
    }
    let config = match finish_config(config) {
        Ok(config) => config,
        Err(code) => return code,
    };

    let llm: Option<Arc<dyn LLMClient>> = if args.no_model {
        None
    } else {
        match select_llm_client(&config).await {
            Ok(selected) => {
                info!(backend = %selected.description, "Model backend selected");
                Some(selected.client)
            }
            Err(e) => {
                warn!(error = %e, "No model backend; requests are classified as exploration");
                None
            }
        }
    };

    let service = AnalysisService::with_builtin_tools(&config, llm);
    let mut request = AnalysisRequest::new(&args.repository, &args.request);
    for (key, value) in &args.params {
        request = request.with_param(key, param_value(value));
    }
    debug!(request_id = %request.request_id, "Starting static analysis");

    cancel_on_interrupt(&service, &request.request_id);
    let handler = progress_handler(args.output.format.into(), quiet, args.no_progress);
    match service.analyze(request, handler).await {
        Ok(report) => emit_report(&report, &args.output),
        Err(e) => report_failure(e, &args.output),
    }
}

pub async fn handle_agent(args: &AgentArgs, quiet: bool) -> i32 {
    let mut config = build_config(&args.model);
    if let Some(max_turns) = args.max_turns {
        config.max_turns = max_turns;
        config.budget_turn_threshold = config.budget_turn_threshold.min(max_turns);
    }
    if let Some(min_tools) = args.min_tools {
        config.min_tools_before_completion = min_tools;
    }
    if let Some(timeout) = args.tool_timeout {
        config.tool_timeout_secs = timeout;
    }
    let config = match finish_config(config) {
        Ok(config) => config,
        Err(code) => return code,
    };

    let service = match AnalysisService::from_config(&config).await {
        Ok(service) => service,
        Err(e) => return report_failure(e, &args.output),
    };

    let request = AnalysisRequest::new(&args.repository, &args.request);
    cancel_on_interrupt(&service, &request.request_id);
    let handler = progress_handler(args.output.format.into(), quiet, args.no_progress);
    match service.run_agent(request, handler).await {
        Ok(report) => emit_report(&report, &args.output),
        Err(e) => report_failure(e, &args.output),
    }
}

/// JSON unless the extension says YAML
pub fn load_workflow(path: &Path) -> Result<WorkflowGraph> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read workflow file {}", path.display()))?;
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

    if is_yaml {
        serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid workflow YAML in {}", path.display()))
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid workflow JSON in {}", path.display()))
    }
}

pub async fn handle_validate_workflow(args: &ValidateWorkflowArgs) -> i32 {
    let graph = match load_workflow(&args.file) {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return EXIT_FAILURE;
        }
    };

    let config = match finish_config(build_config(&args.model)) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let service = match AnalysisService::from_config(&config).await {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, e.help_message());
            return EXIT_FAILURE;
        }
    };

    let verdict = match service.validate_workflow(&graph).await {
        Ok(verdict) => verdict,
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, e.help_message());
            return EXIT_FAILURE;
        }
    };

    let formatter = OutputFormatter::new(args.format.into());
    match formatter.format_verdict(&verdict) {
        Ok(text) => println!("{}", text.trim_end()),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return EXIT_FAILURE;
        }
    }
    if verdict.valid {
        EXIT_OK
    } else {
        EXIT_INVALID
    }
}

fn builtin_registry(config: &ReposcopeConfig) -> ToolRegistry {
    ToolRegistry::discover(builtin_factories(
        Workspace::new(&config.workspace_dir),
        None,
    ))
}

pub async fn handle_tools(args: &ToolsArgs) -> i32 {
    let config = ReposcopeConfig::default();
    let registry = builtin_registry(&config);
    let formatter = OutputFormatter::new(args.format.into());
    match formatter.format_tools(&registry.metadata()) {
        Ok(text) => {
            println!("{}", text.trim_end());
            EXIT_OK
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_FAILURE
        }
    }
}

pub async fn handle_health(args: &HealthArgs) -> i32 {
    let config = build_config(&args.model);

    let mut statuses = Vec::new();
    let backend_ok = match select_llm_client(&config).await {
        Ok(selected) => {
            statuses.push(HealthStatus {
                name: "model backend".to_string(),
                available: true,
                message: selected.description,
            });
            true
        }
        Err(e) => {
            statuses.push(HealthStatus {
                name: "model backend".to_string(),
                available: false,
                message: e.to_string(),
            });
            false
        }
    };

    for tool in builtin_registry(&config).metadata() {
        statuses.push(HealthStatus {
            name: format!("tool: {}", tool.name),
            available: tool.healthy,
            message: if tool.healthy {
                "Ready".to_string()
            } else {
                "Unavailable; it will not be planned or offered to the model".to_string()
            },
        });
    }

    let formatter = OutputFormatter::new(args.format.into());
    match formatter.format_health(&statuses) {
        Ok(text) => println!("{}", text.trim_end()),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return EXIT_FAILURE;
        }
    }
    if args.show_config {
        match formatter.format_config(&config) {
            Ok(text) => println!("{}", text.trim_end()),
            Err(e) => {
                eprintln!("Error: {:#}", e);
                return EXIT_FAILURE;
            }
        }
    }

    if backend_ok {
        EXIT_OK
    } else {
        EXIT_FAILURE
    }
}
