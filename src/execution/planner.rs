//! Turns a tool selection into ordered batches by latency class

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::plan::{Batch, ExecutionPlan};
use crate::context::AnalysisContext;
use crate::tools::{AnalysisTool, LatencyClass, ToolRegistry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerConfig {
    /// Largest parallel batch of fast tools
    pub max_parallel: usize,
    /// Largest parallel batch of medium tools
    pub max_parallel_medium: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_parallel: 3,
            max_parallel_medium: 2,
        }
    }
}

impl PlannerConfig {
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    pub fn with_max_parallel_medium(mut self, max_parallel_medium: usize) -> Self {
        self.max_parallel_medium = max_parallel_medium.max(1);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionPlanner {
    config: PlannerConfig,
}

impl ExecutionPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plans the named tools; unknown, unhealthy and repeated names are dropped
    pub fn plan<S: AsRef<str>>(
        &self,
        registry: &ToolRegistry,
        context: &AnalysisContext,
        tool_names: &[S],
    ) -> ExecutionPlan {
        let mut seen = HashSet::new();
        let mut fast = Vec::new();
        let mut medium = Vec::new();
        let mut slow = Vec::new();

        for name in tool_names.iter().map(AsRef::as_ref) {
            if !seen.insert(name) {
                continue;
            }
            let Some(tool) = registry.get(name) else {
                warn!(tool = %name, "Dropping unknown tool from plan");
                continue;
            };
            if !tool.health() {
                warn!(tool = %name, "Dropping unhealthy tool from plan");
                continue;
            }

            let estimate = tool.estimate(context);
            let entry = (name.to_string(), estimate);
            match LatencyClass::from_estimate(estimate) {
                LatencyClass::Fast => fast.push(entry),
                LatencyClass::Medium => medium.push(entry),
                LatencyClass::Slow => slow.push(entry),
            }
        }

        let mut batches = Vec::new();
        batches.extend(parallel_batches(fast, self.config.max_parallel, LatencyClass::Fast));
        batches.extend(parallel_batches(
            medium,
            self.config.max_parallel_medium,
            LatencyClass::Medium,
        ));
        batches.extend(slow.into_iter().map(|(name, estimate)| Batch {
            tools: vec![name],
            parallel: false,
            estimate,
            latency: LatencyClass::Slow,
        }));

        let plan = ExecutionPlan { batches };
        debug!(
            batches = plan.batches.len(),
            tools = plan.tool_count(),
            estimate_secs = plan.estimate().as_secs(),
            "Built execution plan"
        );
        plan
    }

    /// Convenience for a selection that is already resolved to tool handles
    pub fn plan_tools(
        &self,
        registry: &ToolRegistry,
        context: &AnalysisContext,
        tools: &[Arc<dyn AnalysisTool>],
    ) -> ExecutionPlan {
        let names: Vec<&str> = tools.iter().map(|tool| tool.name()).collect();
        self.plan(registry, context, &names)
    }
}

fn parallel_batches(
    tools: Vec<(String, Duration)>,
    limit: usize,
    latency: LatencyClass,
) -> Vec<Batch> {
    tools
        .chunks(limit.max(1))
        .map(|chunk| Batch {
            tools: chunk.iter().map(|(name, _)| name.clone()).collect(),
            parallel: true,
            estimate: chunk
                .iter()
                .map(|(_, estimate)| *estimate)
                .max()
                .unwrap_or_default(),
            latency,
        })
        .collect()
}
