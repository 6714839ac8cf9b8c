use crate::tools::Capability;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// What the user wants done with the repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Explore,
    DependencyAnalysis,
    VulnerabilityScan,
    SecurityAudit,
    PerformanceAnalysis,
    CodeQuality,
    Documentation,
    ArchitectureReview,
    FixGeneration,
    CreatePullRequest,
}

impl Intent {
    pub const ALL: [Intent; 10] = [
        Intent::Explore,
        Intent::DependencyAnalysis,
        Intent::VulnerabilityScan,
        Intent::SecurityAudit,
        Intent::PerformanceAnalysis,
        Intent::CodeQuality,
        Intent::Documentation,
        Intent::ArchitectureReview,
        Intent::FixGeneration,
        Intent::CreatePullRequest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Explore => "explore",
            Intent::DependencyAnalysis => "dependency_analysis",
            Intent::VulnerabilityScan => "vulnerability_scan",
            Intent::SecurityAudit => "security_audit",
            Intent::PerformanceAnalysis => "performance_analysis",
            Intent::CodeQuality => "code_quality",
            Intent::Documentation => "documentation",
            Intent::ArchitectureReview => "architecture_review",
            Intent::FixGeneration => "fix_generation",
            Intent::CreatePullRequest => "create_pull_request",
        }
    }

    /// Capabilities a tool needs to serve this intent; the first entry is the primary one
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Intent::Explore => &[Capability::Exploration],
            Intent::DependencyAnalysis => &[Capability::DependencyAnalysis],
            Intent::VulnerabilityScan => &[
                Capability::VulnerabilityScanning,
                Capability::DependencyAnalysis,
            ],
            Intent::SecurityAudit => &[
                Capability::SecurityAudit,
                Capability::VulnerabilityScanning,
            ],
            Intent::PerformanceAnalysis => &[Capability::PerformanceAnalysis],
            Intent::CodeQuality => &[Capability::CodeQuality],
            Intent::Documentation => &[Capability::Documentation],
            Intent::ArchitectureReview => &[Capability::ArchitectureReview],
            Intent::FixGeneration => &[Capability::SecurityAudit],
            Intent::CreatePullRequest => &[],
        }
    }

    pub fn is_security(&self) -> bool {
        matches!(
            self,
            Intent::VulnerabilityScan | Intent::SecurityAudit | Intent::FixGeneration
        )
    }

    pub fn is_performance(&self) -> bool {
        matches!(self, Intent::PerformanceAnalysis)
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        Intent::ALL
            .iter()
            .copied()
            .find(|intent| intent.as_str() == normalized)
            .ok_or_else(|| format!("Unknown intent: {}", s))
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    SecurityFocused,
    PerformanceFocused,
    Full,
}

impl Scope {
    /// Capabilities implied by the scope on top of those of the intent
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Scope::SecurityFocused => &[
                Capability::VulnerabilityScanning,
                Capability::SecurityAudit,
                Capability::DependencyAnalysis,
            ],
            Scope::PerformanceFocused => {
                &[Capability::PerformanceAnalysis, Capability::CodeQuality]
            }
            Scope::Full => &[],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::SecurityFocused => "security_focused",
            Scope::PerformanceFocused => "performance_focused",
            Scope::Full => "full",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Depth {
    Surface,
    Deep,
    Comprehensive,
}

impl Depth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Depth::Surface => "surface",
            Depth::Deep => "deep",
            Depth::Comprehensive => "comprehensive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

impl FromStr for Complexity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simple" | "low" => Ok(Complexity::Simple),
            "moderate" | "medium" => Ok(Complexity::Moderate),
            "complex" | "high" => Ok(Complexity::Complex),
            other => Err(format!("Unknown complexity: {}", other)),
        }
    }
}

/// One analysis action proposed for a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedIntent {
    pub intent: Intent,
    /// Clamped to [0, 1]
    pub confidence: f32,
    pub priority: u8,
    pub reasoning: String,
}

impl RankedIntent {
    pub fn new(intent: Intent, confidence: f32, priority: u8, reasoning: impl Into<String>) -> Self {
        Self {
            intent,
            confidence: confidence.clamp(0.0, 1.0),
            priority,
            reasoning: reasoning.into(),
        }
    }
}

/// Per-request description of what to analyze and how
///
/// Created by the context analyzer, enriched while the request runs (the local
/// repository path once materialized, languages reported by tools) and dropped
/// when the request ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisContext {
    pub request_id: String,
    /// Remote URL or local path as given by the caller
    pub repository: String,
    pub request: String,
    pub intent: Intent,
    pub primary_confidence: f32,
    pub secondary_intents: Vec<RankedIntent>,
    /// Lowercase language names
    pub target_languages: Vec<String>,
    pub scope: Scope,
    pub depth: Depth,
    pub complexity: Complexity,
    pub reasoning: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_path: Option<PathBuf>,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl AnalysisContext {
    pub fn new(repository: impl Into<String>, request: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            repository: repository.into(),
            request: request.into(),
            intent: Intent::Explore,
            primary_confidence: 1.0,
            secondary_intents: Vec::new(),
            target_languages: Vec::new(),
            scope: Scope::Full,
            depth: Depth::Comprehensive,
            complexity: Complexity::Moderate,
            reasoning: String::new(),
            repo_path: None,
            params: Map::new(),
        }
    }

    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = intent;
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_depth(mut self, depth: Depth) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.target_languages = Vec::new();
        self.add_languages(languages);
        self
    }

    pub fn with_repo_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.repo_path = Some(path.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Appends languages not yet present; returns how many were new
    pub fn add_languages<I, S>(&mut self, languages: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for language in languages {
            let language = language.as_ref().trim().to_lowercase();
            if !language.is_empty() && !self.target_languages.contains(&language) {
                self.target_languages.push(language);
                added += 1;
            }
        }
        added
    }

    pub fn flag(&self, key: &str) -> bool {
        self.params.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Intent capabilities, scope capabilities and exploration
    pub fn relevant_capabilities(&self) -> BTreeSet<Capability> {
        let mut relevant: BTreeSet<Capability> = self
            .intent
            .capabilities()
            .iter()
            .chain(self.scope.capabilities())
            .copied()
            .collect();
        relevant.insert(Capability::Exploration);
        relevant
    }

    /// Copy of this context re-targeted at a secondary intent
    pub fn for_intent(&self, intent: Intent) -> Self {
        let mut derived = self.clone();
        derived.intent = intent;
        derived
    }

    /// Arguments passed to tools in static mode
    pub fn tool_arguments(&self) -> Value {
        let mut args = Map::new();
        args.insert(
            "repository".to_string(),
            Value::String(self.repository.clone()),
        );
        if let Some(path) = &self.repo_path {
            args.insert(
                "repo_path".to_string(),
                Value::String(path.display().to_string()),
            );
        }
        args.insert(
            "depth".to_string(),
            Value::String(self.depth.as_str().to_string()),
        );
        Value::Object(args)
    }
}
