//! Normalized result of one tool execution.
//!
//! Every plugin execution ends in a `ToolResult`: network errors, provider
//! error payloads, and unknown tool names included. Nothing ordinary is
//! allowed to cross the `execute` boundary as a Rust error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of one tool execution.
///
/// On success, `data` carries the fields relevant to the agent (ids, URLs,
/// human labels) and `display_message` summarizes the effect in one
/// sentence. On failure, `error` holds a human-readable description that is
/// fed back to the LLM and shown to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_message: Option<String>,
}

impl ToolResult {
    /// Successful execution with a structured payload.
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            display_message: None,
        }
    }

    /// Successful execution with a payload and a one-sentence summary.
    pub fn ok_with_message(data: Value, message: impl Into<String>) -> Self {
        Self {
            display_message: Some(message.into()),
            ..Self::ok(data)
        }
    }

    /// Failed execution with a human-readable description.
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            display_message: None,
        }
    }

    /// Failure for a tool name routed to a plugin that does not declare it.
    pub fn unknown_tool(name: &str) -> Self {
        Self::fail(format!("Unknown tool: {name}"))
    }

    /// Compact machine-readable form fed back to the LLM as a tool result.
    pub fn to_feedback_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"success":false,"error":"result serialization failed"}"#.to_string()
        })
    }
}
