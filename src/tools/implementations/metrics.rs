use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use super::common::{language_for_path, relative, walk_text_files, MAX_WALK_FILES};
use crate::context::AnalysisContext;
use crate::tools::trait_def::{AnalysisTool, Capability};
use crate::tools::workspace::resolve_repo_path;

const LONG_FILE_LINES: usize = 500;
const LARGEST_FILES: usize = 10;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineCounts {
    pub files: usize,
    pub code: usize,
    pub comments: usize,
    pub blank: usize,
}

impl LineCounts {
    fn add(&mut self, other: LineCounts) {
        self.files += other.files;
        self.code += other.code;
        self.comments += other.comments;
        self.blank += other.blank;
    }

    fn total(&self) -> usize {
        self.code + self.comments + self.blank
    }
}

fn comment_prefixes(language: &str) -> &'static [&'static str] {
    match language {
        "python" | "ruby" | "shell" => &["#"],
        _ => &["//", "/*", "*", "*/"],
    }
}

pub fn count_lines(content: &str, language: &str) -> LineCounts {
    let prefixes = comment_prefixes(language);
    let mut counts = LineCounts {
        files: 1,
        ..LineCounts::default()
    };

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            counts.blank += 1;
        } else if prefixes.iter().any(|p| trimmed.starts_with(p)) {
            counts.comments += 1;
        } else {
            counts.code += 1;
        }
    }
    counts
}

fn measure(root: &Path) -> Value {
    let (files, truncated) = walk_text_files(root, MAX_WALK_FILES);
    let mut per_language: BTreeMap<&'static str, LineCounts> = BTreeMap::new();
    let mut sizes: Vec<(String, usize)> = Vec::new();

    for file in &files {
        let Some(language) = language_for_path(file) else {
            continue;
        };
        let Ok(content) = fs::read_to_string(file) else {
            continue;
        };
        let counts = count_lines(&content, language);
        sizes.push((relative(root, file), counts.total()));
        per_language.entry(language).or_default().add(counts);
    }

    let mut overall = LineCounts::default();
    for counts in per_language.values() {
        overall.add(*counts);
    }

    sizes.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let long_files = sizes.iter().filter(|(_, n)| *n > LONG_FILE_LINES).count();
    let average = if overall.files == 0 {
        0.0
    } else {
        overall.total() as f64 / overall.files as f64
    };
    let comment_ratio = if overall.code == 0 {
        0.0
    } else {
        overall.comments as f64 / overall.code as f64
    };

    json!({
        "overall": overall,
        "languages": per_language,
        "average_file_lines": (average * 10.0).round() / 10.0,
        "comment_ratio": (comment_ratio * 100.0).round() / 100.0,
        "long_files": long_files,
        "largest_files": sizes
            .iter()
            .take(LARGEST_FILES)
            .map(|(path, lines)| json!({"path": path, "lines": lines}))
            .collect::<Vec<_>>(),
        "truncated": truncated,
    })
}

/// Line counts, comment ratio and oversized files per language
pub struct CodeMetricsTool;

#[async_trait]
impl AnalysisTool for CodeMetricsTool {
    fn name(&self) -> &str {
        "code_metrics"
    }

    fn description(&self) -> &str {
        "Count code, comment and blank lines per language and list the largest source files"
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
        &[Capability::CodeQuality, Capability::PerformanceAnalysis]
    }

    fn estimate(&self, _context: &AnalysisContext) -> Duration {
        Duration::from_secs(15)
    }

    async fn execute(&self, context: &AnalysisContext, arguments: Value) -> Result<Value> {
        let root = resolve_repo_path(context, &arguments)?;
        tokio::task::spawn_blocking(move || measure(&root))
            .await
            .context("Metrics collection panicked")
    }
}
