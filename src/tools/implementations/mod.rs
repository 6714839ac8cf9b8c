//! Built-in analysis tools
//!
//! Thin bodies: repository walking, manifest parsing and regex scanning run on
//! the blocking pool; the pull-request tool is a single GitHub REST call.

mod common;
mod dependencies;
mod explorer;
mod fix;
mod metrics;
mod pull_request;
mod scanner;
mod workspace_tools;

use std::sync::Arc;

pub use dependencies::{Dependency, DependencyAnalyzerTool};
pub use explorer::RepositoryExplorerTool;
pub use fix::{FixGeneratorTool, ProposedFix};
pub use metrics::{CodeMetricsTool, LineCounts};
pub use pull_request::CreatePullRequestTool;
pub use scanner::{Finding, Severity, VulnerabilityScannerTool};
pub use workspace_tools::{CleanupWorkspaceTool, CloneRepositoryTool, CLONE_TOOL, TEARDOWN_TOOL};

use super::registry::ToolFactory;
use super::trait_def::AnalysisTool;
use super::workspace::Workspace;
use crate::llm::LLMClient;

/// Factories for every built-in tool, in registration order
pub fn builtin_factories(
    workspace: Workspace,
    llm: Option<Arc<dyn LLMClient>>,
) -> Vec<ToolFactory> {
    let clone_ws = workspace.clone();
    let cleanup_ws = workspace;

    vec![
        Box::new(move || Ok(Arc::new(CloneRepositoryTool::new(clone_ws)) as Arc<dyn AnalysisTool>)),
        Box::new(|| Ok(Arc::new(RepositoryExplorerTool) as Arc<dyn AnalysisTool>)),
        Box::new(|| Ok(Arc::new(DependencyAnalyzerTool) as Arc<dyn AnalysisTool>)),
        Box::new(|| Ok(Arc::new(VulnerabilityScannerTool::new()?) as Arc<dyn AnalysisTool>)),
        Box::new(|| Ok(Arc::new(CodeMetricsTool) as Arc<dyn AnalysisTool>)),
        Box::new(move || Ok(Arc::new(FixGeneratorTool::new(llm)?) as Arc<dyn AnalysisTool>)),
        Box::new(|| Ok(Arc::new(CreatePullRequestTool::new()?) as Arc<dyn AnalysisTool>)),
        Box::new(move || {
            Ok(Arc::new(CleanupWorkspaceTool::new(cleanup_ws)) as Arc<dyn AnalysisTool>)
        }),
    ]
}
