//! Workspace lifecycle tools for agentic runs: `clone_repository` materializes
//! the repository, `cleanup_workspace` is the designated teardown step.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::context::AnalysisContext;
use crate::tools::trait_def::{AnalysisTool, Capability, Validation};
use crate::tools::workspace::Workspace;

pub const CLONE_TOOL: &str = "clone_repository";
pub const TEARDOWN_TOOL: &str = "cleanup_workspace";

fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub struct CloneRepositoryTool {
    workspace: Workspace,
    git_available: bool,
}

impl CloneRepositoryTool {
    pub fn new(workspace: Workspace) -> Self {
        let git_available = git_available();
        if !git_available {
            warn!("git not found on PATH, remote repositories cannot be cloned");
        }
        Self {
            workspace,
            git_available,
        }
    }
}

#[async_trait]
impl AnalysisTool for CloneRepositoryTool {
    fn name(&self) -> &str {
        CLONE_TOOL
    }

    fn description(&self) -> &str {
        "Materialize the repository locally (shallow git clone for URLs, path resolution for local directories). Call this first; returns repo_path for the other tools."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "repo_url": {
                    "type": "string",
                    "description": "Repository URL or local path. Defaults to the repository under analysis."
                }
            }
        })
    }

    fn capabilities(&self) -> &[Capability] {
        &[]
    }

    fn validate(&self, _context: &AnalysisContext) -> Validation {
        Validation::rejected("workspace tool, invoked by the orchestrator only")
    }

    fn health(&self) -> bool {
        self.git_available
    }

    fn estimate(&self, _context: &AnalysisContext) -> Duration {
        Duration::from_secs(60)
    }

    async fn execute(&self, context: &AnalysisContext, arguments: Value) -> Result<Value> {
        let location = arguments
            .get("repo_url")
            .and_then(Value::as_str)
            .unwrap_or(&context.repository);

        let materialized = self.workspace.materialize(location).await?;
        Ok(json!({
            "repo_path": materialized.path.display().to_string(),
            "cloned": materialized.cloned,
        }))
    }
}

pub struct CleanupWorkspaceTool {
    workspace: Workspace,
}

impl CleanupWorkspaceTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl AnalysisTool for CleanupWorkspaceTool {
    fn name(&self) -> &str {
        TEARDOWN_TOOL
    }

    fn description(&self) -> &str {
        "Remove the cloned repository from the workspace. Call this once all analysis is finished."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "repo_path": {
                    "type": "string",
                    "description": "Directory returned by clone_repository"
                }
            }
        })
    }

    fn capabilities(&self) -> &[Capability] {
        &[]
    }

    fn validate(&self, _context: &AnalysisContext) -> Validation {
        Validation::rejected("workspace tool, invoked by the orchestrator only")
    }

    fn estimate(&self, _context: &AnalysisContext) -> Duration {
        Duration::from_secs(2)
    }

    async fn execute(&self, context: &AnalysisContext, arguments: Value) -> Result<Value> {
        let path = arguments
            .get("repo_path")
            .and_then(Value::as_str)
            .map(PathBuf::from)
            .or_else(|| context.repo_path.clone());

        let Some(path) = path else {
            return Ok(json!({ "removed": false, "reason": "nothing to clean up" }));
        };

        let removed = self.workspace.cleanup(&path).await?;
        Ok(json!({
            "removed": removed,
            "repo_path": path.display().to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_clone_resolves_local_path() {
        let dir = TempDir::new().unwrap();
        let tool = CloneRepositoryTool::new(Workspace::new(dir.path().join("ws")));
        let ctx = AnalysisContext::new(dir.path().to_str().unwrap(), "explore");

        let result = tool.execute(&ctx, json!({})).await.unwrap();
        assert_eq!(result["cloned"], false);
        assert!(result["repo_path"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_cleanup_removes_managed_clone_only() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::new(dir.path().join("ws"));
        let managed = workspace.root().join("demo-0123456789ab");
        std::fs::create_dir_all(&managed).unwrap();

        let tool = CleanupWorkspaceTool::new(workspace);
        let ctx = AnalysisContext::new("https://github.com/a/demo", "explore");

        let kept = tool
            .execute(&ctx, json!({"repo_path": dir.path().to_str().unwrap()}))
            .await
            .unwrap();
        assert_eq!(kept["removed"], false);

        let removed = tool
            .execute(&ctx.clone().with_repo_path(&managed), json!({}))
            .await
            .unwrap();
        assert_eq!(removed["removed"], true);
        assert!(!managed.exists());

        let nothing = tool.execute(&ctx, json!({})).await.unwrap();
        assert_eq!(nothing["removed"], false);
    }

    #[tokio::test]
    async fn test_cleanup_ignores_path_escaping_the_workspace() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::new(dir.path().join("ws"));
        std::fs::create_dir_all(workspace.root()).unwrap();
        let project = dir.path().join("user_project");
        std::fs::create_dir_all(&project).unwrap();

        let tool = CleanupWorkspaceTool::new(workspace.clone());
        let ctx = AnalysisContext::new("https://github.com/a/demo", "explore");
        let escaping = workspace.root().join("..").join("user_project");
        let result = tool
            .execute(&ctx, json!({"repo_path": escaping.to_str().unwrap()}))
            .await
            .unwrap();

        assert_eq!(result["removed"], false);
        assert!(project.exists());
    }

    #[test]
    fn test_workspace_tools_excluded_from_static_selection() {
        let dir = TempDir::new().unwrap();
        let ctx = AnalysisContext::new("repo", "explore");
        let workspace = Workspace::new(dir.path());
        assert!(!CloneRepositoryTool::new(workspace.clone()).validate(&ctx).ok);
        assert!(!CleanupWorkspaceTool::new(workspace).validate(&ctx).ok);
    }
}
