pub mod commands;
pub mod handlers;
pub mod output;
pub mod progress;

pub use commands::{
    AgentArgs, AnalyzeArgs, CliArgs, Commands, HealthArgs, ToolsArgs, ValidateWorkflowArgs,
};
pub use output::{HealthStatus, OutputFormat, OutputFormatter};
pub use progress::ProgressBarHandler;
