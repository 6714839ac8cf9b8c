//! Static-mode execution: planning batches and running them

mod cancellation;
mod engine;
mod plan;
mod planner;

pub use cancellation::CancellationRegistry;
pub use engine::{run_tool, EngineConfig, EngineError, ExecutionEngine};
pub use plan::{Batch, ExecutionPlan};
pub use planner::{ExecutionPlanner, PlannerConfig};
