//! LLM client abstraction layer
//!
//! A trait-based seam for model communication so the context analyzer, workflow
//! validator and conversational orchestrator can run against GenAI providers or
//! the scripted mock interchangeably.

mod client;
mod error;
mod genai;
mod mock;
mod response;
mod selector;
mod types;

pub use client::LLMClient;
pub use error::BackendError;
pub use genai::GenAIClient;
pub use mock::{MockLLMClient, MockResponse};
pub use response::{extract_json, parse_json, ParseError};
pub use selector::{select_llm_client, SelectedClient};
pub use types::{ChatMessage, LLMRequest, LLMResponse, MessageRole, ToolCall, ToolDefinition};
