//! Tool registry
//!
//! Owns every registered [`AnalysisTool`], keeps reverse indices by capability
//! and language, and matches tools against request contexts. Built once and
//! shared read-only behind an `Arc` across requests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::trait_def::{AnalysisTool, Capability, ToolMetadata};
use crate::context::AnalysisContext;
use crate::llm::ToolDefinition;

const LANGUAGE_MATCH_SCORE: i32 = 10;
const PRIMARY_CAPABILITY_SCORE: i32 = 20;

/// Produces one tool instance during discovery
pub type ToolFactory = Box<dyn FnOnce() -> anyhow::Result<Arc<dyn AnalysisTool>> + Send>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Tool '{0}' is already registered")]
    Duplicate(String),

    #[error("Tool '{0}' is not registered")]
    NotFound(String),

    #[error("Failed to instantiate tool: {0}")]
    Factory(String),
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn AnalysisTool>>,
    by_name: HashMap<String, usize>,
    capability_index: BTreeMap<Capability, Vec<String>>,
    language_index: BTreeMap<String, Vec<String>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiates every factory; failures are logged and skipped
    pub fn discover(factories: impl IntoIterator<Item = ToolFactory>) -> Self {
        let mut registry = Self::new();

        for factory in factories {
            let outcome = factory()
                .map_err(|e| RegistryError::Factory(format!("{:#}", e)))
                .and_then(|tool| registry.register(tool));

            if let Err(e) = outcome {
                warn!(error = %e, "Skipping tool during discovery");
            }
        }

        info!(
            tools = registry.len(),
            names = ?registry.tool_names(),
            "Tool discovery complete"
        );
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn AnalysisTool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }

        debug!(tool = %name, capabilities = ?tool.capabilities(), "Registering tool");
        self.tools.push(tool);
        self.rebuild_indices();
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> Result<Arc<dyn AnalysisTool>, RegistryError> {
        let position = self
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

        let removed = self.tools.remove(position);
        self.rebuild_indices();
        debug!(tool = %name, "Unregistered tool");
        Ok(removed)
    }

    fn rebuild_indices(&mut self) {
        let mut by_name = HashMap::with_capacity(self.tools.len());
        let mut capability_index: BTreeMap<Capability, Vec<String>> = BTreeMap::new();
        let mut language_index: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (position, tool) in self.tools.iter().enumerate() {
            let name = tool.name().to_string();
            by_name.insert(name.clone(), position);

            for capability in tool.capabilities() {
                capability_index
                    .entry(*capability)
                    .or_default()
                    .push(name.clone());
            }
            for language in tool.languages() {
                language_index
                    .entry(language.to_lowercase())
                    .or_default()
                    .push(name.clone());
            }
        }

        self.by_name = by_name;
        self.capability_index = capability_index;
        self.language_index = language_index;
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AnalysisTool>> {
        self.by_name.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Names in registration order
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn capability_index(&self) -> &BTreeMap<Capability, Vec<String>> {
        &self.capability_index
    }

    pub fn language_index(&self) -> &BTreeMap<String, Vec<String>> {
        &self.language_index
    }

    pub fn tools_with_capability(&self, capability: Capability) -> Vec<Arc<dyn AnalysisTool>> {
        self.capability_index
            .get(&capability)
            .map(|names| names.iter().filter_map(|n| self.get(n)).collect())
            .unwrap_or_default()
    }

    /// Tools declaring the language plus tools that accept any language
    pub fn tools_for_language(&self, language: &str) -> Vec<Arc<dyn AnalysisTool>> {
        let language = language.to_lowercase();
        let declared = self.language_index.get(&language);

        self.tools
            .iter()
            .filter(|tool| {
                tool.languages().is_empty()
                    || declared.is_some_and(|names| names.iter().any(|n| n == tool.name()))
            })
            .cloned()
            .collect()
    }

    pub fn healthy_tools(&self) -> Vec<Arc<dyn AnalysisTool>> {
        self.tools.iter().filter(|t| t.health()).cloned().collect()
    }

    /// Snapshot of every tool; latency is computed against a default context
    pub fn metadata(&self) -> Vec<ToolMetadata> {
        let probe = AnalysisContext::new("", "");
        self.tools
            .iter()
            .map(|tool| ToolMetadata {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                capabilities: tool.capabilities().to_vec(),
                languages: tool.languages().iter().map(|l| l.to_string()).collect(),
                latency: tool.latency(&probe),
                healthy: tool.health(),
            })
            .collect()
    }

    pub fn as_tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.schema(),
            })
            .collect()
    }

    fn score(tool: &dyn AnalysisTool, context: &AnalysisContext) -> i32 {
        let language_matches = tool
            .languages()
            .iter()
            .filter(|l| context.target_languages.iter().any(|t| t == *l))
            .count() as i32;

        let primary_match = tool
            .primary_capability()
            .is_some_and(|c| context.intent.capabilities().contains(&c));

        language_matches * LANGUAGE_MATCH_SCORE
            + if primary_match {
                PRIMARY_CAPABILITY_SCORE
            } else {
                0
            }
    }

    /// Healthy tools valid for the context, best match first
    ///
    /// Falls back to the first healthy exploration tool when nothing matches.
    pub fn find_suitable_tools(&self, context: &AnalysisContext) -> Vec<Arc<dyn AnalysisTool>> {
        let mut candidates: Vec<(i32, Arc<dyn AnalysisTool>)> = self
            .tools
            .iter()
            .filter(|tool| {
                if !tool.health() {
                    debug!(tool = tool.name(), "Excluding unhealthy tool");
                    return false;
                }
                let validation = tool.validate(context);
                if !validation.ok {
                    debug!(tool = tool.name(), reasons = ?validation.reasons, "Tool rejected for context");
                }
                validation.ok
            })
            .map(|tool| (Self::score(tool.as_ref(), context), Arc::clone(tool)))
            .collect();

        if !context.target_languages.is_empty() {
            candidates.sort_by(|a, b| b.0.cmp(&a.0));
        }

        if candidates.is_empty() {
            return match self.fallback_tool() {
                Some(tool) => {
                    info!(
                        tool = tool.name(),
                        intent = %context.intent,
                        "No suitable tools, falling back to exploration"
                    );
                    vec![tool]
                }
                None => {
                    warn!(intent = %context.intent, "No suitable tools and no healthy exploration tool");
                    Vec::new()
                }
            };
        }

        candidates.into_iter().map(|(_, tool)| tool).collect()
    }

    fn fallback_tool(&self) -> Option<Arc<dyn AnalysisTool>> {
        self.tools
            .iter()
            .find(|t| t.health() && t.capabilities().contains(&Capability::Exploration))
            .cloned()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}
