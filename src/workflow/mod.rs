//! Validation of user-assembled tool pipelines

mod graph;
mod validator;

pub use graph::{WorkflowEdge, WorkflowGraph, WorkflowNode};
pub use validator::{WorkflowGraphValidator, WorkflowVerdict};
