use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use super::common::{relative, walk_text_files, MAX_WALK_FILES};
use crate::context::AnalysisContext;
use crate::tools::trait_def::{AnalysisTool, Capability};
use crate::tools::workspace::resolve_repo_path;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Dependency {
    pub name: String,
    pub version: Option<String>,
    pub dev: bool,
}

#[derive(Debug, Serialize)]
struct ManifestReport {
    path: String,
    ecosystem: &'static str,
    language: &'static str,
    dependencies: Vec<Dependency>,
}

fn dep(name: impl Into<String>, version: Option<String>, dev: bool) -> Dependency {
    Dependency {
        name: name.into(),
        version,
        dev,
    }
}

pub fn parse_cargo_toml(content: &str) -> Result<Vec<Dependency>> {
    let manifest: toml::Value = toml::from_str(content).context("Invalid Cargo.toml")?;
    let mut deps = Vec::new();

    for (section, dev) in [("dependencies", false), ("dev-dependencies", true)] {
        let Some(table) = manifest.get(section).and_then(toml::Value::as_table) else {
            continue;
        };
        for (name, spec) in table {
            let version = match spec {
                toml::Value::String(v) => Some(v.clone()),
                toml::Value::Table(t) => t.get("version").and_then(|v| v.as_str()).map(String::from),
                _ => None,
            };
            deps.push(dep(name, version, dev));
        }
    }
    Ok(deps)
}

pub fn parse_package_json(content: &str) -> Result<Vec<Dependency>> {
    let manifest: Value = serde_json::from_str(content).context("Invalid package.json")?;
    let mut deps = Vec::new();

    for (section, dev) in [("dependencies", false), ("devDependencies", true)] {
        if let Some(map) = manifest.get(section).and_then(Value::as_object) {
            for (name, version) in map {
                deps.push(dep(name, version.as_str().map(String::from), dev));
            }
        }
    }
    Ok(deps)
}

pub fn parse_requirements(content: &str) -> Vec<Dependency> {
    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty() && !line.starts_with('-'))
        .map(|line| {
            match line.find(|c| matches!(c, '=' | '>' | '<' | '~' | '!')) {
                Some(idx) => dep(
                    line[..idx].trim(),
                    Some(line[idx..].trim().to_string()),
                    false,
                ),
                None => dep(line, None, false),
            }
        })
        .collect()
}

pub fn parse_go_mod(content: &str) -> Vec<Dependency> {
    let Ok(re) = Regex::new(r"^\s*(?:require\s+)?([A-Za-z0-9._~\-/]+\.[A-Za-z0-9._~\-/]+)\s+(v[0-9][\w.\-+]*)")
    else {
        return Vec::new();
    };

    content
        .lines()
        .filter(|line| !line.trim_start().starts_with("module"))
        .filter_map(|line| re.captures(line))
        .map(|caps| dep(&caps[1], Some(caps[2].to_string()), false))
        .collect()
}

pub fn parse_pom(content: &str) -> Result<Vec<Dependency>> {
    let doc = roxmltree::Document::parse(content).context("Invalid pom.xml")?;
    let child_text = |node: roxmltree::Node, tag: &str| {
        node.children()
            .find(|c| c.tag_name().name() == tag)
            .and_then(|c| c.text())
            .map(|t| t.trim().to_string())
    };

    Ok(doc
        .descendants()
        .filter(|n| n.tag_name().name() == "dependency")
        .filter_map(|n| {
            let group = child_text(n, "groupId")?;
            let artifact = child_text(n, "artifactId")?;
            let dev = child_text(n, "scope").is_some_and(|s| s == "test");
            Some(dep(
                format!("{}:{}", group, artifact),
                child_text(n, "version"),
                dev,
            ))
        })
        .collect())
}

fn analyze_manifest(root: &Path, path: &Path) -> Option<ManifestReport> {
    let name = path.file_name()?.to_str()?;
    let (ecosystem, language) = match name {
        "Cargo.toml" => ("cargo", "rust"),
        "package.json" => ("npm", "javascript"),
        "requirements.txt" => ("pip", "python"),
        "go.mod" => ("go", "go"),
        "pom.xml" => ("maven", "java"),
        _ => return None,
    };

    let content = fs::read_to_string(path).ok()?;
    let parsed = match ecosystem {
        "cargo" => parse_cargo_toml(&content),
        "npm" => parse_package_json(&content),
        "pip" => Ok(parse_requirements(&content)),
        "go" => Ok(parse_go_mod(&content)),
        _ => parse_pom(&content),
    };

    match parsed {
        Ok(dependencies) => Some(ManifestReport {
            path: relative(root, path),
            ecosystem,
            language,
            dependencies,
        }),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Skipping unparseable manifest");
            None
        }
    }
}

fn analyze(root: &Path) -> Value {
    let (files, _) = walk_text_files(root, MAX_WALK_FILES);
    let reports: Vec<ManifestReport> = files
        .iter()
        .filter_map(|f| analyze_manifest(root, f))
        .collect();

    let total: usize = reports.iter().map(|r| r.dependencies.len()).sum();
    let unpinned: usize = reports
        .iter()
        .flat_map(|r| &r.dependencies)
        .filter(|d| d.version.is_none())
        .count();
    let mut languages: Vec<&str> = reports.iter().map(|r| r.language).collect();
    languages.sort_unstable();
    languages.dedup();

    json!({
        "manifests": reports,
        "total_dependencies": total,
        "unpinned_dependencies": unpinned,
        "detected_languages": languages,
    })
}

/// Reads Cargo.toml, package.json, requirements.txt, go.mod and pom.xml manifests
pub struct DependencyAnalyzerTool;

#[async_trait]
impl AnalysisTool for DependencyAnalyzerTool {
    fn name(&self) -> &str {
        "dependency_analyzer"
    }

    fn description(&self) -> &str {
        "List declared dependencies from Cargo.toml, package.json, requirements.txt, go.mod and pom.xml manifests"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "repo_path": {
                    "type": "string",
                    "description": "Local repository directory"
                }
            }
        })
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::DependencyAnalysis]
    }

    fn languages(&self) -> &[&str] {
        &["rust", "javascript", "typescript", "python", "go", "java"]
    }

    fn estimate(&self, _context: &AnalysisContext) -> Duration {
        Duration::from_secs(10)
    }

    async fn execute(&self, context: &AnalysisContext, arguments: Value) -> Result<Value> {
        let root = resolve_repo_path(context, &arguments)?;
        debug!(path = %root.display(), "Analyzing dependencies");

        tokio::task::spawn_blocking(move || analyze(&root))
            .await
            .context("Dependency analysis panicked")
    }
}
