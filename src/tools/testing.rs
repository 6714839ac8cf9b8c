//! Configurable in-memory tool for exercising the registry, planner, engine and
//! orchestrator without touching the filesystem or network.

use super::trait_def::{AnalysisTool, Capability};
use crate::context::AnalysisContext;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum ToolBehavior {
    Succeed(Value),
    Fail(String),
    /// Never resolves; only a timeout or cancellation ends the call
    Hang,
    Delay(Duration, Value),
}

pub struct ScriptedTool {
    name: String,
    capabilities: Vec<Capability>,
    languages: Vec<&'static str>,
    estimate: Duration,
    behavior: ToolBehavior,
    healthy: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
    last_arguments: Arc<Mutex<Option<Value>>>,
}

impl ScriptedTool {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            behavior: ToolBehavior::Succeed(json!({ "tool": name })),
            name,
            capabilities: vec![Capability::Exploration],
            languages: Vec::new(),
            estimate: Duration::from_secs(5),
            healthy: Arc::new(AtomicBool::new(true)),
            calls: Arc::new(AtomicUsize::new(0)),
            last_arguments: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_capabilities(mut self, capabilities: &[Capability]) -> Self {
        self.capabilities = capabilities.to_vec();
        self
    }

    pub fn with_languages(mut self, languages: &[&'static str]) -> Self {
        self.languages = languages.to_vec();
        self
    }

    pub fn with_estimate(mut self, estimate: Duration) -> Self {
        self.estimate = estimate;
        self
    }

    pub fn with_behavior(mut self, behavior: ToolBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn unhealthy(self) -> Self {
        self.healthy.store(false, Ordering::SeqCst);
        self
    }

    /// Shared flag controlling `health()`
    pub fn health_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.healthy)
    }

    /// Shared counter of `execute` invocations
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    /// Shared slot holding the arguments of the latest call
    pub fn argument_probe(&self) -> Arc<Mutex<Option<Value>>> {
        Arc::clone(&self.last_arguments)
    }
}

#[async_trait]
impl AnalysisTool for ScriptedTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Scripted tool"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "repo_path": { "type": "string" }
            }
        })
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    fn languages(&self) -> &[&str] {
        &self.languages
    }

    fn health(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    fn estimate(&self, _context: &AnalysisContext) -> Duration {
        self.estimate
    }

    async fn execute(&self, _context: &AnalysisContext, arguments: Value) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut slot) = self.last_arguments.lock() {
            *slot = Some(arguments);
        }

        match &self.behavior {
            ToolBehavior::Succeed(payload) => Ok(payload.clone()),
            ToolBehavior::Fail(message) => Err(anyhow!("{}", message)),
            ToolBehavior::Hang => {
                std::future::pending::<()>().await;
                Ok(Value::Null)
            }
            ToolBehavior::Delay(delay, payload) => {
                tokio::time::sleep(*delay).await;
                Ok(payload.clone())
            }
        }
    }
}
