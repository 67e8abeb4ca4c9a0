//! Anthropic Messages API provider.
//!
//! Maps the crate's internal message model onto the Messages API: the
//! system prompt travels as the separate `system` parameter, assistant
//! tool calls become `tool_use` content blocks, and tool-result turns
//! become `tool_result` blocks inside a user message.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ChatMessage, LlmProvider, LlmResponse, Role, ToolCallRequest};
use crate::error::LlmError;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// Anthropic-backed `LlmProvider`.
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
    /// Create a provider over a shared HTTP client.
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Builder method to select a model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Builder method to point at a custom base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Convert internal messages to the Messages API wire shape.
    fn format_messages(messages: &[ChatMessage]) -> Vec<Value> {
        let mut formatted = Vec::with_capacity(messages.len());
        for msg in messages {
            match msg.role {
                Role::User => {
                    formatted.push(json!({ "role": "user", "content": msg.content }));
                }
                Role::Assistant => {
                    if msg.tool_calls.is_empty() {
                        formatted.push(json!({ "role": "assistant", "content": msg.content }));
                        continue;
                    }
                    let mut blocks: Vec<Value> = Vec::new();
                    if !msg.content.is_empty() {
                        blocks.push(json!({ "type": "text", "text": msg.content }));
                    }
                    for call in &msg.tool_calls {
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.name,
                            "input": call.input,
                        }));
                    }
                    formatted.push(json!({ "role": "assistant", "content": blocks }));
                }
                Role::Tool => {
                    formatted.push(json!({
                        "role": "user",
                        "content": [{
                            "type": "tool_result",
                            "tool_use_id": msg.tool_call_id.clone().unwrap_or_default(),
                            "content": msg.content,
                        }],
                    }));
                }
            }
        }
        formatted
    }

    fn build_request_body(&self, system: &str, tools: &[Value], messages: &[ChatMessage]) -> Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": Self::format_messages(messages),
        });
        if !system.is_empty() {
            body["system"] = json!(system);
        }
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }
        body
    }

    /// Parse the `content[]` block array into text and tool calls.
    fn parse_response(payload: &Value) -> Result<LlmResponse, LlmError> {
        let content = payload
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| LlmError::MalformedResponse("no content array".to_string()))?;

        let mut text_parts: Vec<&str> = Vec::new();
        let mut tool_calls: Vec<ToolCallRequest> = Vec::new();

        for block in content {
            match block["type"].as_str().unwrap_or("") {
                "text" => {
                    if let Some(text) = block["text"].as_str() {
                        text_parts.push(text);
                    }
                }
                "tool_use" => {
                    let name = block["name"]
                        .as_str()
                        .ok_or_else(|| {
                            LlmError::MalformedResponse("tool_use block without name".to_string())
                        })?
                        .to_string();
                    tool_calls.push(ToolCallRequest {
                        id: block["id"].as_str().unwrap_or_default().to_string(),
                        name,
                        input: block.get("input").cloned().unwrap_or(json!({})),
                    });
                }
                // Thinking and other block types carry nothing the loop needs.
                _ => {}
            }
        }

        let text = if text_parts.is_empty() {
            None
        } else {
            Some(text_parts.join("\n"))
        };
        let end_turn = payload["stop_reason"].as_str() == Some("end_turn");

        Ok(LlmResponse {
            text,
            tool_calls,
            end_turn,
        })
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(
        &self,
        system: &str,
        tools: &[Value],
        messages: &[ChatMessage],
    ) -> Result<LlmResponse, LlmError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_request_body(system, tools, messages);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        if !status.is_success() {
            let message = payload["error"]["message"]
                .as_str()
                .unwrap_or("unknown provider error")
                .to_string();
            return Err(LlmError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        Self::parse_response(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_messages_maps_tool_turns() {
        let messages = vec![
            ChatMessage::user("file a bug"),
            ChatMessage::assistant_with_tools(
                "Filing it now.",
                vec![ToolCallRequest {
                    id: "toolu_1".to_string(),
                    name: "github_create_issue".to_string(),
                    input: json!({ "repo": "o/r", "title": "bug" }),
                }],
            ),
            ChatMessage::tool_result("toolu_1", "{\"success\":true}"),
        ];

        let formatted = AnthropicProvider::format_messages(&messages);
        assert_eq!(formatted.len(), 3);
        assert_eq!(formatted[1]["content"][0]["type"], "text");
        assert_eq!(formatted[1]["content"][1]["type"], "tool_use");
        assert_eq!(formatted[1]["content"][1]["id"], "toolu_1");
        assert_eq!(formatted[2]["role"], "user");
        assert_eq!(formatted[2]["content"][0]["type"], "tool_result");
        assert_eq!(formatted[2]["content"][0]["tool_use_id"], "toolu_1");
    }

    #[test]
    fn test_parse_response_text_and_tools() {
        let payload = json!({
            "content": [
                { "type": "text", "text": "On it." },
                { "type": "tool_use", "id": "toolu_2", "name": "slack_send_message",
                  "input": { "channel": "C1", "text": "hi" } },
            ],
            "stop_reason": "tool_use",
        });
        let parsed = AnthropicProvider::parse_response(&payload).unwrap();
        assert_eq!(parsed.text.as_deref(), Some("On it."));
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].name, "slack_send_message");
        assert!(!parsed.end_turn);
    }

    #[test]
    fn test_parse_response_end_turn() {
        let payload = json!({
            "content": [{ "type": "text", "text": "Done." }],
            "stop_reason": "end_turn",
        });
        let parsed = AnthropicProvider::parse_response(&payload).unwrap();
        assert!(parsed.end_turn);
        assert!(parsed.tool_calls.is_empty());
    }

    #[test]
    fn test_parse_response_rejects_missing_content() {
        let payload = json!({ "id": "msg_1" });
        assert!(AnthropicProvider::parse_response(&payload).is_err());
    }
}
