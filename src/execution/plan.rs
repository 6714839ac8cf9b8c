use serde::Serialize;
use std::time::Duration;

use crate::tools::LatencyClass;

/// Group of tools run together; batches run strictly one after another
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Batch {
    pub tools: Vec<String>,
    pub parallel: bool,
    /// Max of member estimates when parallel, sum when sequential
    #[serde(with = "crate::util::duration_ms")]
    pub estimate: Duration,
    pub latency: LatencyClass,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionPlan {
    pub batches: Vec<Batch>,
}

impl ExecutionPlan {
    pub fn tool_count(&self) -> usize {
        self.batches.iter().map(Batch::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn tool_names(&self) -> impl Iterator<Item = &str> {
        self.batches
            .iter()
            .flat_map(|batch| batch.tools.iter().map(String::as_str))
    }

    /// Wall-clock estimate assuming batches run back to back
    pub fn estimate(&self) -> Duration {
        self.batches.iter().map(|batch| batch.estimate).sum()
    }
}
