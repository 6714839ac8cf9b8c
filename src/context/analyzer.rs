//! Free-text request to structured analysis context
//!
//! The model ranks analysis actions; everything else (languages, scope, depth)
//! is derived deterministically. Model failures never surface: the analyzer
//! degrades to a single low-confidence exploration action.

use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::languages::LanguageDetector;
use super::types::{AnalysisContext, Complexity, Depth, Intent, RankedIntent, Scope};
use crate::llm::{parse_json, LLMClient, LLMRequest, ParseError};
use crate::tools::{AnalysisTool, ToolRegistry};

const FALLBACK_CONFIDENCE: f32 = 0.3;

const SECURITY_KEYWORDS: &[&str] = &[
    "security",
    "vulnerab",
    "cve",
    "secret",
    "exploit",
    "injection",
];
const PERFORMANCE_KEYWORDS: &[&str] = &[
    "performance",
    "slow",
    "latency",
    "optimi",
    "throughput",
    "memory leak",
    "profil",
];

#[derive(Debug, Deserialize)]
struct RawAction {
    intent: String,
    confidence: Option<f32>,
    priority: Option<i64>,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    actions: Vec<RawAction>,
    complexity: Option<String>,
    #[serde(default)]
    reasoning: String,
}

/// Ranked actions as reported by the model
#[derive(Debug, Clone, PartialEq)]
pub struct ActionPlan {
    pub actions: Vec<RankedIntent>,
    pub complexity: Complexity,
    pub reasoning: String,
}

impl ActionPlan {
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            actions: vec![RankedIntent::new(
                Intent::Explore,
                FALLBACK_CONFIDENCE,
                1,
                reason,
            )],
            complexity: Complexity::Moderate,
            reasoning: String::new(),
        }
    }

    /// Priority descending, then confidence descending
    fn ranked(mut self) -> Self {
        self.actions.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.confidence.total_cmp(&a.confidence))
        });
        self
    }
}

/// Parses model output into a plan; unknown intents are skipped
pub fn parse_action_plan(raw: &str) -> Result<ActionPlan, ParseError> {
    let parsed: RawAnalysis = parse_json(raw)?;

    let actions: Vec<RankedIntent> = parsed
        .actions
        .into_iter()
        .filter_map(|action| match action.intent.parse::<Intent>() {
            Ok(intent) => Some(RankedIntent::new(
                intent,
                action.confidence.unwrap_or(0.5),
                action.priority.unwrap_or(1).clamp(0, u8::MAX as i64) as u8,
                action.reasoning,
            )),
            Err(e) => {
                warn!(intent = %action.intent, "Skipping action: {}", e);
                None
            }
        })
        .collect();

    if actions.is_empty() {
        return Err(ParseError::InvalidJson(
            "no recognisable actions in model output".to_string(),
        ));
    }

    let complexity = parsed
        .complexity
        .and_then(|c| c.parse().ok())
        .unwrap_or(Complexity::Moderate);

    Ok(ActionPlan {
        actions,
        complexity,
        reasoning: parsed.reasoning,
    })
}

/// True when a keyword starts a word of `text`; keywords may be stems
fn contains_any(text: &str, keywords: &[&str]) -> bool {
    let alternatives: Vec<String> = keywords.iter().map(|k| regex::escape(k)).collect();
    Regex::new(&format!(r"(?i)\b(?:{})", alternatives.join("|")))
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

pub fn derive_scope(intent: Intent, request: &str) -> Scope {
    let text = request.to_lowercase();
    if contains_any(&text, SECURITY_KEYWORDS) {
        Scope::SecurityFocused
    } else if contains_any(&text, PERFORMANCE_KEYWORDS) {
        Scope::PerformanceFocused
    } else if intent.is_security() {
        Scope::SecurityFocused
    } else if intent.is_performance() {
        Scope::PerformanceFocused
    } else {
        Scope::Full
    }
}

pub fn derive_depth(intent: Intent, request: &str) -> Depth {
    let text = request.to_lowercase();
    if contains_any(&text, &["quick", "brief"]) {
        Depth::Surface
    } else if contains_any(&text, &["thorough", "complete"]) {
        Depth::Comprehensive
    } else if contains_any(&text, &["deep", "detailed"]) {
        Depth::Deep
    } else if intent.is_security() {
        Depth::Deep
    } else {
        Depth::Comprehensive
    }
}

fn system_prompt() -> String {
    let vocabulary: Vec<&str> = Intent::ALL.iter().map(Intent::as_str).collect();
    format!(
        "You plan repository analyses. Map the user's request to one or more actions.\n\
         Allowed intents: {}.\n\
         Reply with JSON only:\n\
         {{\"actions\": [{{\"intent\": str, \"confidence\": 0.0-1.0, \"priority\": 0-10, \"reasoning\": str}}], \
         \"complexity\": \"simple\"|\"moderate\"|\"complex\", \"reasoning\": str}}\n\
         Use priority 0 for actions that are merely nice to have.",
        vocabulary.join(", ")
    )
}

pub struct ContextAnalyzer {
    llm: Option<Arc<dyn LLMClient>>,
    languages: LanguageDetector,
}

impl ContextAnalyzer {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self {
            llm: Some(llm),
            languages: LanguageDetector::new(),
        }
    }

    /// Analyzer that always takes the deterministic path
    pub fn without_model() -> Self {
        Self {
            llm: None,
            languages: LanguageDetector::new(),
        }
    }

    async fn plan(&self, repository: &str, request: &str) -> ActionPlan {
        let Some(llm) = &self.llm else {
            return ActionPlan::fallback("No model configured; defaulting to exploration");
        };

        let prompt = format!("Repository: {}\nRequest: {}", repository, request);
        let llm_request = LLMRequest::prompt(system_prompt(), prompt).with_temperature(0.1);

        match llm.chat(llm_request).await {
            Ok(response) => match parse_action_plan(&response.content) {
                Ok(plan) => plan,
                Err(e) => {
                    warn!(error = %e, "Unusable action plan from model, falling back");
                    ActionPlan::fallback("Model output was malformed; defaulting to exploration")
                }
            },
            Err(e) => {
                warn!(error = %e, "Context analysis model call failed, falling back");
                ActionPlan::fallback("Model unavailable; defaulting to exploration")
            }
        }
    }

    /// Builds the request context; never fails
    pub async fn analyze(&self, repository: &str, request: &str) -> AnalysisContext {
        let plan = self.plan(repository, request).await.ranked();

        let mut actions = plan.actions.into_iter();
        let primary = actions.next().unwrap_or_else(|| {
            RankedIntent::new(Intent::Explore, FALLBACK_CONFIDENCE, 1, "")
        });
        let secondary: Vec<RankedIntent> = actions.collect();

        let detected = self.languages.detect(request, repository);
        debug!(languages = ?detected, "Detected languages");

        let mut context = AnalysisContext::new(repository, request)
            .with_intent(primary.intent)
            .with_scope(derive_scope(primary.intent, request))
            .with_depth(derive_depth(primary.intent, request))
            .with_languages(detected.iter().map(|(name, _)| name.as_str()));
        context.primary_confidence = primary.confidence;
        context.secondary_intents = secondary;
        context.complexity = plan.complexity;
        context.reasoning = if plan.reasoning.is_empty() {
            primary.reasoning
        } else {
            plan.reasoning
        };

        info!(
            request_id = %context.request_id,
            intent = %context.intent,
            secondary = context.secondary_intents.len(),
            scope = context.scope.as_str(),
            depth = context.depth.as_str(),
            languages = ?context.target_languages,
            "Analyzed request"
        );
        context
    }

    /// Tools for the primary intent unioned with those of every secondary intent
    /// whose priority is above zero
    pub fn select_tools(
        &self,
        registry: &ToolRegistry,
        context: &AnalysisContext,
    ) -> Vec<Arc<dyn AnalysisTool>> {
        let mut seen = HashSet::new();
        let mut selected = Vec::new();

        let secondary_contexts = context
            .secondary_intents
            .iter()
            .filter(|action| action.priority > 0)
            .map(|action| context.for_intent(action.intent));

        for ctx in std::iter::once(context.clone()).chain(secondary_contexts) {
            for tool in registry.find_suitable_tools(&ctx) {
                if seen.insert(tool.name().to_string()) {
                    selected.push(tool);
                }
            }
        }

        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{BackendError, MockLLMClient, MockResponse};
    use crate::tools::testing::ScriptedTool;
    use crate::tools::Capability;
    use yare::parameterized;

    #[test]
    fn test_parse_action_plan_skips_unknown() {
        let plan = parse_action_plan(
            r#"{"actions": [
                {"intent": "vulnerability_scan", "confidence": 0.9, "priority": 3, "reasoning": "asked"},
                {"intent": "make_coffee", "confidence": 1.0, "priority": 9},
                {"intent": "dependency_analysis", "confidence": 1.4}
            ], "complexity": "complex", "reasoning": "security review"}"#,
        )
        .unwrap();

        assert_eq!(plan.actions.len(), 2);
        assert_eq!(plan.actions[1].confidence, 1.0);
        assert_eq!(plan.complexity, Complexity::Complex);
    }

    #[test]
    fn test_parse_action_plan_requires_actions() {
        assert!(parse_action_plan(r#"{"actions": [{"intent": "dance"}]}"#).is_err());
        assert!(parse_action_plan("sorry, no").is_err());
    }

    #[test]
    fn test_ranking_priority_then_confidence() {
        let plan = ActionPlan {
            actions: vec![
                RankedIntent::new(Intent::Documentation, 0.9, 1, ""),
                RankedIntent::new(Intent::CodeQuality, 0.4, 5, ""),
                RankedIntent::new(Intent::SecurityAudit, 0.8, 5, ""),
            ],
            complexity: Complexity::Simple,
            reasoning: String::new(),
        }
        .ranked();

        let order: Vec<Intent> = plan.actions.iter().map(|a| a.intent).collect();
        assert_eq!(
            order,
            vec![Intent::SecurityAudit, Intent::CodeQuality, Intent::Documentation]
        );
    }

    #[parameterized(
        explore = { Intent::Explore, "explore this repo", Scope::Full },
        security_intent = { Intent::VulnerabilityScan, "check it", Scope::SecurityFocused },
        perf_intent = { Intent::PerformanceAnalysis, "check it", Scope::PerformanceFocused },
        keyword_override = { Intent::Explore, "look for leaked secrets", Scope::SecurityFocused },
        perf_keyword = { Intent::CodeQuality, "why is this so slow", Scope::PerformanceFocused },
        stem = { Intent::Explore, "any vulnerabilities here?", Scope::SecurityFocused },
        quality_audit = { Intent::CodeQuality, "code quality audit", Scope::Full },
        inside_word = { Intent::Explore, "the unprofiled build", Scope::Full },
    )]
    fn test_derive_scope(intent: Intent, request: &str, expected: Scope) {
        assert_eq!(derive_scope(intent, request), expected);
    }

    #[parameterized(
        default_full = { Intent::Explore, "explore", Depth::Comprehensive },
        security_deep = { Intent::SecurityAudit, "audit", Depth::Deep },
        quick = { Intent::SecurityAudit, "quick audit", Depth::Surface },
        thorough = { Intent::Explore, "a thorough look", Depth::Comprehensive },
        detailed = { Intent::Explore, "a detailed look", Depth::Deep },
        incomplete = { Intent::SecurityAudit, "the incomplete auth module", Depth::Deep },
        mixed_case = { Intent::Explore, "Quick overview", Depth::Surface },
    )]
    fn test_derive_depth(intent: Intent, request: &str, expected: Depth) {
        assert_eq!(derive_depth(intent, request), expected);
    }

    #[tokio::test]
    async fn test_analyze_with_model() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_response(MockResponse::text(
            "```json\n{\"actions\": [{\"intent\": \"dependency_analysis\", \"confidence\": 0.6, \"priority\": 1}, {\"intent\": \"vulnerability_scan\", \"confidence\": 0.9, \"priority\": 2}], \"complexity\": \"moderate\", \"reasoning\": \"deps and vulns\"}\n```",
        ));
        let analyzer = ContextAnalyzer::new(mock.clone());

        let ctx = analyzer
            .analyze("https://github.com/acme/api", "scan the python service for CVEs")
            .await;

        assert_eq!(ctx.intent, Intent::VulnerabilityScan);
        assert_eq!(ctx.secondary_intents.len(), 1);
        assert_eq!(ctx.secondary_intents[0].intent, Intent::DependencyAnalysis);
        assert_eq!(ctx.scope, Scope::SecurityFocused);
        assert_eq!(ctx.depth, Depth::Deep);
        assert_eq!(ctx.target_languages, vec!["python"]);
        assert_eq!(ctx.reasoning, "deps and vulns");
        assert!(mock.recorded_requests()[0].messages[0]
            .content
            .contains("vulnerability_scan"));
    }

    #[tokio::test]
    async fn test_analyze_falls_back_on_model_error() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_response(MockResponse::error(BackendError::TimeoutError { seconds: 5 }));
        let analyzer = ContextAnalyzer::new(mock);

        let ctx = analyzer.analyze("/tmp/repo", "what is in here?").await;
        assert_eq!(ctx.intent, Intent::Explore);
        assert_eq!(ctx.primary_confidence, FALLBACK_CONFIDENCE);
        assert!(ctx.secondary_intents.is_empty());
    }

    #[tokio::test]
    async fn test_analyze_falls_back_on_malformed_output() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_response(MockResponse::text("I'd start by exploring."));
        let ctx = ContextAnalyzer::new(mock).analyze("/tmp/repo", "hm").await;
        assert_eq!(ctx.intent, Intent::Explore);
        assert_eq!(ctx.primary_confidence, FALLBACK_CONFIDENCE);
    }

    #[test]
    fn test_select_tools_unions_secondary_intents() {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(
                ScriptedTool::new("explorer").with_capabilities(&[Capability::Exploration]),
            ))
            .unwrap();
        registry
            .register(Arc::new(
                ScriptedTool::new("deps").with_capabilities(&[Capability::DependencyAnalysis]),
            ))
            .unwrap();
        registry
            .register(Arc::new(
                ScriptedTool::new("docs").with_capabilities(&[Capability::Documentation]),
            ))
            .unwrap();

        let mut ctx = AnalysisContext::new("repo", "explore and check deps");
        ctx.secondary_intents = vec![
            RankedIntent::new(Intent::DependencyAnalysis, 0.7, 1, ""),
            RankedIntent::new(Intent::Documentation, 0.9, 0, ""),
        ];

        let selected = ContextAnalyzer::without_model().select_tools(&registry, &ctx);
        let names: Vec<&str> = selected.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["explorer", "deps"]);
    }
}
