//! Planning and batched execution, in isolation and through the service

mod support;

use reposcope::context::AnalysisContext;
use reposcope::execution::{EngineConfig, EngineError, ExecutionEngine, ExecutionPlanner, PlannerConfig};
use reposcope::llm::{MockLLMClient, MockResponse};
use reposcope::progress::{ChannelHandler, ProgressEvent, ProgressReporter};
use reposcope::tools::testing::{ScriptedTool, ToolBehavior};
use reposcope::{AnalysisRequest, AnalysisService, LLMClient, ReportStatus, ReposcopeConfig};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

async fn drain(mut events: tokio_stream::wrappers::UnboundedReceiverStream<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut collected = Vec::new();
    while let Some(event) = events.next().await {
        collected.push(event);
    }
    collected
}

fn service_config(dir: &TempDir) -> ReposcopeConfig {
    ReposcopeConfig {
        workspace_dir: dir.path().join("workspaces"),
        ..ReposcopeConfig::default()
    }
}

#[test]
fn test_five_fast_tools_make_two_parallel_batches() {
    let names = ["t1", "t2", "t3", "t4", "t5"];
    let registry = support::registry(names.iter().map(|n| ScriptedTool::new(*n)).collect());
    let planner = ExecutionPlanner::new(PlannerConfig::default().with_max_parallel(3));

    let plan = planner.plan(&registry, &AnalysisContext::new("repo", "explore"), &names);

    assert_eq!(plan.batches.len(), 2);
    assert_eq!(plan.batches[0].tools, vec!["t1", "t2", "t3"]);
    assert_eq!(plan.batches[1].tools, vec!["t4", "t5"]);
    assert!(plan.batches.iter().all(|b| b.parallel));
}

#[tokio::test]
async fn test_timed_out_tool_does_not_sink_the_batch() {
    let registry = support::registry(vec![
        ScriptedTool::new("stuck").with_behavior(ToolBehavior::Hang),
        ScriptedTool::new("quick"),
    ]);
    let mut ctx = AnalysisContext::new("repo", "explore");
    let plan = ExecutionPlanner::new(PlannerConfig::default()).plan(&registry, &ctx, &["stuck", "quick"]);
    let engine = ExecutionEngine::new(EngineConfig::default().with_tool_timeout(Duration::from_millis(100)));

    let results = engine
        .execute(&plan, &mut ctx, &registry, &mut ProgressReporter::silent(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    let stuck = results.iter().find(|r| r.tool_name == "stuck").unwrap();
    assert!(!stuck.success);
    assert!(stuck.first_error().unwrap().contains("timed out"));
    assert!(results.iter().any(|r| r.tool_name == "quick" && r.success));
}

#[tokio::test]
async fn test_no_tool_starts_after_cancellation() {
    let registry = support::registry(vec![
        ScriptedTool::new("first"),
        ScriptedTool::new("blocking")
            .with_estimate(Duration::from_secs(300))
            .with_behavior(ToolBehavior::Hang),
        ScriptedTool::new("never").with_estimate(Duration::from_secs(400)),
    ]);
    let mut ctx = AnalysisContext::new("repo", "explore");
    let plan = ExecutionPlanner::new(PlannerConfig::default())
        .plan(&registry, &ctx, &["first", "blocking", "never"]);
    assert_eq!(plan.batches.len(), 3);

    let engine = ExecutionEngine::new(EngineConfig::default());
    let (handler, events) = ChannelHandler::new();
    let mut reporter = ProgressReporter::new(Arc::new(handler));
    let cancel = CancellationToken::new();

    let canceller = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    };
    let (outcome, ()) = tokio::join!(
        engine.execute(&plan, &mut ctx, &registry, &mut reporter, &cancel),
        canceller
    );
    drop(reporter);

    match outcome {
        Err(EngineError::Cancelled { completed }) => {
            assert_eq!(completed.len(), 1);
            assert_eq!(completed[0].tool_name, "first");
        }
        Ok(_) => panic!("expected cancellation"),
    }

    let started: Vec<String> = drain(events)
        .await
        .into_iter()
        .filter_map(|event| match event {
            ProgressEvent::ToolStarted { tool, .. } => Some(tool),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec!["first", "blocking"]);
}

#[tokio::test]
async fn test_service_explores_local_repository() {
    let repo = support::go_repository();
    let dir = TempDir::new().unwrap();
    let service = AnalysisService::with_builtin_tools(&service_config(&dir), None);

    let (handler, events) = ChannelHandler::new();
    let report = service
        .analyze(
            AnalysisRequest::new(support::path_str(repo.path()), "explore this Go repository"),
            Arc::new(handler),
        )
        .await
        .unwrap();

    assert_eq!(report.status, ReportStatus::Completed);
    let explorer = report
        .results
        .iter()
        .find(|r| r.tool_name == "repository_explorer")
        .expect("explorer ran");
    assert!(explorer.success);
    assert!(explorer.payload["file_count"].as_u64().unwrap() >= 3);
    assert!(report.target_languages.contains(&"go".to_string()));

    // Local checkouts belong to the caller
    assert!(repo.path().join("go.mod").exists());

    let events = drain(events).await;
    let percents: Vec<u8> = events.iter().map(ProgressEvent::percent).collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{:?}", percents);
    assert_eq!(percents.last(), Some(&100));
    assert!(matches!(events.first(), Some(ProgressEvent::PlanCreated { .. })));
}

#[tokio::test]
async fn test_service_runs_model_ranked_dependency_analysis() {
    let repo = support::go_repository();
    let dir = TempDir::new().unwrap();
    let mock = Arc::new(MockLLMClient::new());
    mock.add_response(MockResponse::text(
        r#"{"actions": [{"intent": "dependency_analysis", "confidence": 0.9, "priority": 2}], "complexity": "simple"}"#,
    ));
    let service = AnalysisService::with_builtin_tools(
        &service_config(&dir),
        Some(mock as Arc<dyn LLMClient>),
    );

    let report = service
        .analyze(
            AnalysisRequest::new(support::path_str(repo.path()), "list the go module dependencies"),
            Arc::new(reposcope::progress::NoOpHandler),
        )
        .await
        .unwrap();

    let dependencies = report
        .results
        .iter()
        .find(|r| r.tool_name == "dependency_analyzer")
        .expect("dependency analyzer ran");
    assert!(dependencies.success);
    assert_eq!(dependencies.payload["total_dependencies"], json!(2));
    assert_eq!(report.plan.as_ref().unwrap().tool_count(), report.results.len());
}
