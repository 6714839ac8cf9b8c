pub mod implementations;
pub mod registry;
pub mod result;
pub mod testing;
pub mod trait_def;
pub mod workspace;

pub use registry::{RegistryError, ToolFactory, ToolRegistry};
pub use result::ToolResult;
pub use trait_def::{
    default_validation, AnalysisTool, Capability, LatencyClass, ToolMetadata, Validation,
};
pub use workspace::Workspace;
