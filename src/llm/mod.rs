//! LLM provider boundary.
//!
//! The core treats the model as a capability that accepts a system prompt,
//! a tool catalog, and a message history, and returns plain text and/or a
//! list of tool-invocation requests. `call_id`s are echoed back when tool
//! results are returned so the model can correlate them.

pub mod anthropic;

pub use anthropic::AnthropicProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LlmError;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// A synthesized tool-result turn.
    Tool,
}

/// One tool-invocation request from the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Provider call id, echoed back with the result.
    pub id: String,
    /// Tool name from the catalog.
    pub name: String,
    /// Arguments object.
    pub input: Value,
}

/// One message in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Tool calls attached to an assistant turn.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// Set on tool-result turns: the call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    /// A user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// A plain assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            ..Self::user(content)
        }
    }

    /// An assistant turn that requested tool calls.
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls,
            ..Self::assistant(content)
        }
    }

    /// A tool-result turn answering `call_id`.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Responses and the provider trait
// ---------------------------------------------------------------------------

/// One model response: text, tool calls, or both.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    /// Plain text content, if any.
    pub text: Option<String>,
    /// Tool-invocation requests, in the order the model emitted them.
    pub tool_calls: Vec<ToolCallRequest>,
    /// Whether the model signaled a natural end of turn.
    pub end_turn: bool,
}

/// The capability the orchestrator consumes.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// One round-trip: full history + tool catalog + system prompt in,
    /// text and/or tool calls out.
    async fn complete(
        &self,
        system: &str,
        tools: &[Value],
        messages: &[ChatMessage],
    ) -> Result<LlmResponse, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let user = ChatMessage::user("hello");
        assert_eq!(user.role, Role::User);
        assert!(user.tool_calls.is_empty());

        let result = ChatMessage::tool_result("call_1", "{\"success\":true}");
        assert_eq!(result.role, Role::Tool);
        assert_eq!(result.tool_call_id.as_deref(), Some("call_1"));
    }
}
