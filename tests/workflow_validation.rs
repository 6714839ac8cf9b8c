//! Workflow graph checks, directly and through the service

use proptest::prelude::*;
use reposcope::llm::{MockLLMClient, MockResponse};
use reposcope::tools::Workspace;
use reposcope::workflow::{WorkflowEdge, WorkflowNode};
use reposcope::{
    AnalysisService, LLMClient, ReposcopeConfig, ServiceError, ToolRegistry, WorkflowGraph,
    WorkflowGraphValidator,
};
use std::collections::VecDeque;
use std::sync::Arc;

fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> WorkflowGraph {
    WorkflowGraph::new(
        nodes.iter().map(|n| WorkflowNode::new(*n)).collect(),
        edges.iter().map(|(a, b)| WorkflowEdge::new(*a, *b)).collect(),
    )
}

#[tokio::test]
async fn test_clone_scan_pr_pipeline_is_approved() {
    let mock = Arc::new(MockLLMClient::new());
    mock.add_response(MockResponse::text(
        r#"{"valid": true, "message": "scan needs the clone and the PR needs the scan"}"#,
    ));
    let workflow = graph(
        &["clone", "scan", "create_pr"],
        &[("clone", "scan"), ("scan", "create_pr")],
    );
    assert!(!workflow.has_cycle());

    let verdict = WorkflowGraphValidator::new(mock.clone()).validate(&workflow).await;
    assert!(verdict.valid);
    assert!(verdict.message.contains("scan needs the clone"));

    let recorded = mock.recorded_requests();
    let prompt = &recorded[0].messages.last().unwrap().content;
    assert!(prompt.contains("1. clone\n2. scan\n3. create_pr"));
}

#[tokio::test]
async fn test_pull_request_before_clone_is_rejected() {
    let mock = Arc::new(MockLLMClient::new());
    mock.add_response(MockResponse::text(
        "```json\n{\"valid\": false, \"message\": \"create_pr runs before the clone it depends on\"}\n```",
    ));
    let workflow = graph(&["create_pr", "clone"], &[("create_pr", "clone")]);
    assert!(!workflow.has_cycle());

    let verdict = WorkflowGraphValidator::new(mock).validate(&workflow).await;
    assert!(!verdict.valid);
    assert!(verdict.message.contains("before the clone"));
}

#[tokio::test]
async fn test_cycle_is_rejected_before_the_model_is_asked() {
    let mock = Arc::new(MockLLMClient::new());
    let workflow = graph(
        &["clone", "scan", "fix"],
        &[("clone", "scan"), ("scan", "fix"), ("fix", "scan")],
    );

    let verdict = WorkflowGraphValidator::new(mock.clone()).validate(&workflow).await;
    assert!(!verdict.valid);
    assert!(verdict.message.contains("cycle"));
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_service_requires_a_model_for_workflows() {
    let service = AnalysisService::new(
        Arc::new(ToolRegistry::new()),
        None,
        Workspace::new(std::env::temp_dir().join("reposcope-unused")),
        &ReposcopeConfig::default(),
    );
    let outcome = service.validate_workflow(&graph(&["clone"], &[])).await;
    assert!(matches!(outcome, Err(ServiceError::NoBackend(_))));

    let mock = Arc::new(MockLLMClient::new());
    mock.add_response(MockResponse::text(r#"{"valid": true}"#));
    let service = AnalysisService::new(
        Arc::new(ToolRegistry::new()),
        Some(mock as Arc<dyn LLMClient>),
        Workspace::new(std::env::temp_dir().join("reposcope-unused")),
        &ReposcopeConfig::default(),
    );
    let verdict = service
        .validate_workflow(&graph(&["clone"], &[]))
        .await
        .unwrap();
    assert!(verdict.valid);
    assert_eq!(verdict.message, "Workflow is coherent");
}

/// Kahn's algorithm: acyclic iff every node can be peeled off
fn acyclic_by_peeling(nodes: usize, edges: &[(usize, usize)]) -> bool {
    let mut indegree = vec![0usize; nodes];
    let mut adjacency = vec![Vec::new(); nodes];
    for &(from, to) in edges {
        adjacency[from].push(to);
        indegree[to] += 1;
    }

    let mut ready: VecDeque<usize> = (0..nodes).filter(|&n| indegree[n] == 0).collect();
    let mut peeled = 0;
    while let Some(node) = ready.pop_front() {
        peeled += 1;
        for &to in &adjacency[node] {
            indegree[to] -= 1;
            if indegree[to] == 0 {
                ready.push_back(to);
            }
        }
    }
    peeled == nodes
}

fn to_graph(nodes: usize, edges: &[(usize, usize)]) -> WorkflowGraph {
    WorkflowGraph::new(
        (0..nodes).map(|n| WorkflowNode::new(format!("n{}", n))).collect(),
        edges
            .iter()
            .map(|(a, b)| WorkflowEdge::new(format!("n{}", a), format!("n{}", b)))
            .collect(),
    )
}

fn arbitrary_graph() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (1usize..=20).prop_flat_map(|nodes| {
        (
            Just(nodes),
            prop::collection::vec((0..nodes, 0..nodes), 0..40),
        )
    })
}

proptest! {
    #[test]
    fn prop_cycle_detection_matches_peeling((nodes, edges) in arbitrary_graph()) {
        let workflow = to_graph(nodes, &edges);
        prop_assert_eq!(workflow.has_cycle(), !acyclic_by_peeling(nodes, &edges));
    }

    #[test]
    fn prop_acyclic_order_respects_every_edge((nodes, raw) in arbitrary_graph()) {
        // Pointing every edge from the lower to the higher index rules out cycles
        let edges: Vec<(usize, usize)> = raw
            .into_iter()
            .filter(|(a, b)| a != b)
            .map(|(a, b)| (a.min(b), a.max(b)))
            .collect();
        let workflow = to_graph(nodes, &edges);
        prop_assert!(!workflow.has_cycle());
        let order: Vec<&str> = workflow
            .connection_order()
            .into_iter()
            .map(|node| node.id.as_str())
            .collect();
        prop_assert_eq!(order.len(), nodes);

        for edge in &workflow.edges {
            let from = order.iter().position(|id| *id == edge.from);
            let to = order.iter().position(|id| *id == edge.to);
            prop_assert!(from < to, "{} must precede {}", edge.from, edge.to);
        }
    }
}
