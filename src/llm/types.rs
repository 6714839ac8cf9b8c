//! LLM communication types
//!
//! Provider-independent request/response types shared by the context analyzer,
//! the workflow validator and the conversational orchestrator.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    /// Output of a tool call, correlated through `tool_call_id`
    Tool,
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    /// Tool calls made by the assistant (only for Assistant role)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Tool call ID this message responds to (only for Tool role)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn plain(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::Assistant, content)
    }

    /// Creates an assistant message carrying the tool calls it requested
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(tool_calls),
            ..Self::plain(MessageRole::Assistant, content)
        }
    }

    /// Creates a tool response message tagged with the originating call id
    pub fn tool_response(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::plain(MessageRole::Tool, content)
        }
    }
}

/// A tool call requested by the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub name: String,
    /// Arguments to pass to the tool (JSON object)
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Definition of a tool available to the LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters
    pub parameters: serde_json::Value,
}

/// Request to send to the LLM
#[derive(Debug, Clone)]
pub struct LLMRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl LLMRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Single-shot request: one system prompt, one user prompt, no tools
    pub fn prompt(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self::new(vec![ChatMessage::system(system), ChatMessage::user(user)])
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Response from the LLM
#[derive(Debug, Clone)]
pub struct LLMResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub response_time: Duration,
}

impl LLMResponse {
    pub fn text(content: impl Into<String>, response_time: Duration) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            response_time,
        }
    }

    pub fn with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
        response_time: Duration,
    ) -> Self {
        Self {
            content: content.into(),
            tool_calls,
            response_time,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_creation() {
        let system = ChatMessage::system("You orchestrate analysis tools");
        assert_eq!(system.role, MessageRole::System);
        assert!(system.tool_calls.is_none());

        let user = ChatMessage::user("scan this repository");
        assert_eq!(user.role, MessageRole::User);
        assert_eq!(user.content, "scan this repository");
    }

    #[test]
    fn test_tool_response_carries_call_id() {
        let response = ChatMessage::tool_response("call_7", "{\"files\": 12}");
        assert_eq!(response.role, MessageRole::Tool);
        assert_eq!(response.tool_call_id.as_deref(), Some("call_7"));
    }

    #[test]
    fn test_assistant_with_tools() {
        let call = ToolCall::new(
            "call_1",
            "repository_explorer",
            serde_json::json!({"repo_path": "/tmp/repo"}),
        );
        let msg = ChatMessage::assistant_with_tools("exploring first", vec![call]);
        assert_eq!(msg.tool_calls.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_prompt_request() {
        let request = LLMRequest::prompt("system", "user")
            .with_temperature(0.1)
            .with_max_tokens(512);
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, MessageRole::System);
        assert_eq!(request.temperature, Some(0.1));
        assert_eq!(request.max_tokens, Some(512));
        assert!(request.tools.is_empty());
    }

    #[test]
    fn test_llm_response_tool_calls() {
        let response = LLMResponse::text("done", Duration::from_millis(5));
        assert!(!response.has_tool_calls());

        let with_tools = LLMResponse::with_tool_calls(
            "",
            vec![ToolCall::new("1", "code_metrics", serde_json::json!({}))],
            Duration::from_millis(5),
        );
        assert!(with_tools.has_tool_calls());
    }
}
