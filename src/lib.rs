//! reposcope - tool orchestration for repository analysis
//!
//! Turns a natural-language request about a repository ("scan this repo for
//! vulnerabilities") into a coordinated run of analysis tools and collects
//! their results.
//!
//! # Core Concepts
//!
//! - **Tools**: pluggable analyzers implementing [`AnalysisTool`], registered in
//!   a [`ToolRegistry`] indexed by capability and language
//! - **Context**: the [`AnalysisContext`] derived from a request (intent, scope,
//!   depth, target languages) that drives tool selection
//! - **Static mode**: the [`ExecutionPlanner`] groups selected tools into
//!   latency-ordered batches and the [`ExecutionEngine`] runs them
//! - **Agentic mode**: the [`ConversationalOrchestrator`] lets a model pick
//!   tools turn by turn under turn, budget and teardown rules
//! - **Workflows**: the [`WorkflowGraphValidator`] checks user-assembled tool
//!   pipelines for cycles and logical order
//!
//! # Example Usage
//!
//! ```ignore
//! use reposcope::{AnalysisRequest, AnalysisService, ReposcopeConfig};
//! use reposcope::progress::LoggingHandler;
//! use std::sync::Arc;
//!
//! async fn scan() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ReposcopeConfig::default();
//!     let service = AnalysisService::with_builtin_tools(&config, None);
//!
//!     let request = AnalysisRequest::new(".", "explore the repository");
//!     let report = service.analyze(request, Arc::new(LoggingHandler)).await?;
//!     for result in &report.results {
//!         println!("{}: {}", result.tool_name, result.success);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Project Structure
//!
//! - [`llm`]: model client abstraction, GenAI adapter and scripted mock
//! - [`tools`]: tool trait, registry, workspace handling and built-in tools
//! - [`context`]: request analysis and tool selection
//! - [`execution`]: batch planning, execution and cancellation
//! - [`conversation`]: the model-directed tool loop
//! - [`workflow`]: workflow graph checks
//! - [`service`]: request-level entry points tying the above together

pub mod cli;
pub mod config;
pub mod context;
pub mod conversation;
pub mod execution;
pub mod llm;
pub mod progress;
pub mod report;
pub mod service;
pub mod tools;
pub mod util;
pub mod workflow;

pub use config::{ConfigError, ReposcopeConfig};
pub use context::{AnalysisContext, ContextAnalyzer, Intent};
pub use conversation::{ConversationConfig, ConversationalOrchestrator};
pub use execution::{ExecutionEngine, ExecutionPlan, ExecutionPlanner};
pub use llm::{BackendError, LLMClient};
pub use report::{AnalysisMode, AnalysisReport, ReportStatus};
pub use service::{AnalysisRequest, AnalysisService, ServiceError};
pub use tools::{AnalysisTool, Capability, LatencyClass, ToolRegistry, ToolResult};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};
pub use workflow::{WorkflowGraph, WorkflowGraphValidator, WorkflowVerdict};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
