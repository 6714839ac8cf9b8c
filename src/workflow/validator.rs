//! Structural and semantic checks for user-assembled tool pipelines

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::graph::WorkflowGraph;
use crate::llm::{parse_json, LLMClient, LLMRequest};

const SYSTEM_PROMPT: &str = r#"You review repository-analysis pipelines assembled by users.
Judge whether the steps, in the given order, form a logically coherent workflow.
A step must not run before the steps that produce what it needs: for example a
pull request can only be created after a repository was cloned and changes were
produced, and scanners need a cloned repository.

Reply with JSON only: {"valid": true|false, "message": "<one or two sentences>"}"#;

/// Result returned to callers of workflow validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowVerdict {
    pub valid: bool,
    pub message: String,
}

impl WorkflowVerdict {
    pub fn valid(message: impl Into<String>) -> Self {
        Self {
            valid: true,
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ModelVerdict {
    valid: bool,
    #[serde(default)]
    message: String,
}

pub struct WorkflowGraphValidator {
    llm: Arc<dyn LLMClient>,
}

impl WorkflowGraphValidator {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self { llm }
    }

    /// Structure first, then cycles, then the model's coherence judgement
    ///
    /// Anything short of an explicit approval from the model is a rejection.
    pub async fn validate(&self, graph: &WorkflowGraph) -> WorkflowVerdict {
        let errors = graph.structural_errors();
        if !errors.is_empty() {
            debug!(errors = ?errors, "Workflow failed structural checks");
            return WorkflowVerdict::invalid(errors.join("; "));
        }

        if graph.has_cycle() {
            return WorkflowVerdict::invalid("Workflow contains a cycle");
        }

        let request = LLMRequest::prompt(SYSTEM_PROMPT, graph.describe()).with_temperature(0.0);
        let response = match self.llm.chat(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Workflow coherence check failed");
                return WorkflowVerdict::invalid(format!(
                    "Workflow could not be validated: model call failed: {}",
                    e
                ));
            }
        };

        match parse_json::<ModelVerdict>(&response.content) {
            Ok(verdict) => {
                info!(valid = verdict.valid, nodes = graph.nodes.len(), "Workflow judged");
                let message = if verdict.message.trim().is_empty() {
                    if verdict.valid {
                        "Workflow is coherent".to_string()
                    } else {
                        "Workflow steps are not in a logical order".to_string()
                    }
                } else {
                    verdict.message
                };
                WorkflowVerdict {
                    valid: verdict.valid,
                    message,
                }
            }
            Err(e) => {
                warn!(error = %e, "Malformed workflow verdict from model");
                WorkflowVerdict::invalid(format!(
                    "Workflow could not be validated: malformed model response ({})",
                    e
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{BackendError, MockLLMClient, MockResponse};
    use crate::workflow::{WorkflowEdge, WorkflowNode};

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> WorkflowGraph {
        WorkflowGraph::new(
            nodes.iter().map(|n| WorkflowNode::new(*n)).collect(),
            edges.iter().map(|(a, b)| WorkflowEdge::new(*a, *b)).collect(),
        )
    }

    #[tokio::test]
    async fn test_structural_failure_skips_model() {
        let mock = Arc::new(MockLLMClient::new());
        let verdict = WorkflowGraphValidator::new(mock.clone())
            .validate(&graph(&["a"], &[("a", "b")]))
            .await;
        assert!(!verdict.valid);
        assert!(verdict.message.contains("unknown node 'b'"));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cycle_rejected_without_model() {
        let mock = Arc::new(MockLLMClient::new());
        let verdict = WorkflowGraphValidator::new(mock.clone())
            .validate(&graph(&["a", "b"], &[("a", "b"), ("b", "a")]))
            .await;
        assert_eq!(verdict, WorkflowVerdict::invalid("Workflow contains a cycle"));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_model_approval() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_response(MockResponse::text(
            r#"Sure: {"valid": true, "message": "Clone, scan, then open a PR."}"#,
        ));
        let verdict = WorkflowGraphValidator::new(mock.clone())
            .validate(&graph(&["clone", "scan", "create_pr"], &[("clone", "scan"), ("scan", "create_pr")]))
            .await;
        assert!(verdict.valid);

        let recorded = mock.recorded_requests();
        let prompt = &recorded[0].messages[1].content;
        assert!(prompt.contains("1. clone\n2. scan\n3. create_pr"));
    }

    #[tokio::test]
    async fn test_malformed_response_is_rejection() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_response(MockResponse::text("Looks fine to me!"));
        let verdict = WorkflowGraphValidator::new(mock)
            .validate(&graph(&["clone"], &[]))
            .await;
        assert!(!verdict.valid);
        assert!(verdict.message.contains("malformed"));
    }

    #[tokio::test]
    async fn test_model_failure_is_rejection() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_response(MockResponse::error(BackendError::TimeoutError { seconds: 30 }));
        let verdict = WorkflowGraphValidator::new(mock)
            .validate(&graph(&["clone"], &[]))
            .await;
        assert!(!verdict.valid);
        assert!(verdict.message.contains("model call failed"));
    }
}
