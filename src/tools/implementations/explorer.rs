use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use super::common::{language_for_path, relative, walk_text_files, MAX_WALK_FILES};
use crate::context::{AnalysisContext, Depth};
use crate::tools::trait_def::{AnalysisTool, Capability};
use crate::tools::workspace::resolve_repo_path;

const MANIFESTS: &[&str] = &[
    "Cargo.toml",
    "package.json",
    "requirements.txt",
    "pyproject.toml",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "Gemfile",
    "composer.json",
    "Dockerfile",
];

/// Walks the repository and summarizes layout, languages and documentation
pub struct RepositoryExplorerTool;

fn explore(root: &Path) -> Value {
    let (files, truncated) = walk_text_files(root, MAX_WALK_FILES);

    let mut by_language: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut manifests = BTreeSet::new();
    let mut top_level = BTreeSet::new();
    let mut total_bytes = 0u64;
    let mut readme = false;
    let mut docs_files = 0usize;

    for file in &files {
        let rel = relative(root, file);
        if let Some(first) = rel.split('/').next() {
            top_level.insert(first.to_string());
        }
        if let Some(language) = language_for_path(file) {
            *by_language.entry(language).or_default() += 1;
        }
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if MANIFESTS.contains(&name) {
            manifests.insert(rel.clone());
        }
        if name.to_lowercase().starts_with("readme") && !rel.contains('/') {
            readme = true;
        }
        if rel.starts_with("docs/") || name.ends_with(".md") {
            docs_files += 1;
        }
        total_bytes += std::fs::metadata(file).map(|m| m.len()).unwrap_or(0);
    }

    let mut ranked: Vec<(&str, usize)> = by_language.iter().map(|(l, c)| (*l, *c)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    let detected: Vec<&str> = ranked.iter().map(|(l, _)| *l).collect();

    json!({
        "repo_path": root.display().to_string(),
        "file_count": files.len(),
        "total_bytes": total_bytes,
        "truncated": truncated,
        "languages": by_language,
        "detected_languages": detected,
        "top_level": top_level,
        "manifests": manifests,
        "documentation": {
            "readme": readme,
            "markdown_files": docs_files,
        },
    })
}

#[async_trait]
impl AnalysisTool for RepositoryExplorerTool {
    fn name(&self) -> &str {
        "repository_explorer"
    }

    fn description(&self) -> &str {
        "Walk the repository and report file counts, languages, manifests, top-level layout and documentation presence"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "repo_path": {
                    "type": "string",
                    "description": "Local repository directory (returned by clone_repository)"
                }
            }
        })
    }

    fn capabilities(&self) -> &[Capability] {
        &[
            Capability::Exploration,
            Capability::ArchitectureReview,
            Capability::Documentation,
        ]
    }

    fn estimate(&self, context: &AnalysisContext) -> Duration {
        match context.depth {
            Depth::Surface => Duration::from_secs(5),
            Depth::Deep => Duration::from_secs(15),
            Depth::Comprehensive => Duration::from_secs(20),
        }
    }

    async fn execute(&self, context: &AnalysisContext, arguments: Value) -> Result<Value> {
        let root = resolve_repo_path(context, &arguments)?;
        debug!(path = %root.display(), "Exploring repository");

        tokio::task::spawn_blocking(move || explore(&root))
            .await
            .context("Repository walk panicked")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_explore_reports_languages_and_manifests() {
        let dir = TempDir::new().unwrap();
        let base = dir.path();
        fs::create_dir_all(base.join("src")).unwrap();
        fs::create_dir_all(base.join("scripts")).unwrap();
        fs::write(base.join("Cargo.toml"), "[package]\nname = \"demo\"\n").unwrap();
        fs::write(base.join("README.md"), "# demo").unwrap();
        fs::write(base.join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(base.join("src/lib.rs"), "pub fn f() {}").unwrap();
        fs::write(base.join("scripts/build.py"), "print(1)").unwrap();

        let ctx = AnalysisContext::new(base.to_str().unwrap(), "explore");
        let result = RepositoryExplorerTool
            .execute(&ctx, json!({}))
            .await
            .unwrap();

        assert_eq!(result["file_count"], 5);
        assert_eq!(result["detected_languages"][0], "rust");
        assert_eq!(result["languages"]["python"], 1);
        assert_eq!(result["manifests"][0], "Cargo.toml");
        assert_eq!(result["documentation"]["readme"], true);
    }

    #[tokio::test]
    async fn test_missing_repository_is_error() {
        let ctx = AnalysisContext::new("https://github.com/a/b", "explore");
        assert!(RepositoryExplorerTool.execute(&ctx, json!({})).await.is_err());
    }
}
