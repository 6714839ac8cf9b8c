//! Agentic mode: a language model chooses tools turn by turn

mod config;
mod orchestrator;
mod prompt;
mod state;

pub use config::{ConversationConfig, DEFAULT_COMPLETION_PHRASES};
pub use orchestrator::{ConversationError, ConversationalOrchestrator};
pub use state::{ConversationOutcome, ConversationState, ConversationStatus, Phase, ToolCallRecord};
