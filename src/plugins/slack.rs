//! Slack integration.
//!
//! Bot-token auth against the Web API. Slack reports failures as HTTP 200
//! with `ok: false` and an error code, so success is judged on the body.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{read_json, require_str, ServicePlugin};
use crate::tools::{CredentialField, FieldKind, InputSchema, ToolResult, ToolSpec};
use crate::vault::Credentials;

const API_BASE: &str = "https://slack.com/api";

pub struct SlackPlugin {
    client: Client,
    credential_fields: Vec<CredentialField>,
    tools: Vec<ToolSpec>,
}

impl SlackPlugin {
    pub fn new(client: Client) -> Self {
        let credential_fields = vec![CredentialField::secret("bot_token", "Bot User OAuth Token")
            .with_help_url("https://api.slack.com/apps")
            .with_placeholder("xoxb-...")];

        let tools = vec![
            ToolSpec::new(
                "slack_list_channels",
                "List public channels in the workspace. Use this FIRST to resolve a channel \
                 name the user mentions into a channel ID.",
                InputSchema::new(),
            ),
            ToolSpec::new(
                "slack_send_message",
                "Send a message to a Slack channel. Requires a channel ID from \
                 slack_list_channels.",
                InputSchema::new()
                    .field("channel", FieldKind::String, "Channel ID, e.g. C0123456789")
                    .field("text", FieldKind::String, "Message text"),
            ),
        ];

        Self {
            client,
            credential_fields,
            tools,
        }
    }

    /// Slack-style error check: `ok: false` carries an error code.
    fn slack_error(payload: &Value) -> Option<String> {
        if payload["ok"].as_bool() == Some(true) {
            return None;
        }
        Some(
            payload["error"]
                .as_str()
                .unwrap_or("unknown Slack error")
                .to_string(),
        )
    }

    async fn list_channels(&self, token: &str) -> ToolResult {
        let url = format!("{API_BASE}/conversations.list");
        let response = match self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[("exclude_archived", "true"), ("limit", "100")])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::fail(format!("Slack request failed: {e}")),
        };

        let (_, payload) = read_json(response).await;
        if let Some(error) = Self::slack_error(&payload) {
            return ToolResult::fail(format!("Slack returned an error: {error}"));
        }

        let channels: Vec<Value> = payload["channels"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .map(|c| json!({ "id": c["id"], "name": c["name"] }))
                    .collect()
            })
            .unwrap_or_default();

        let count = channels.len();
        ToolResult::ok_with_message(
            json!({ "channels": channels }),
            format!("Found {count} channels"),
        )
    }

    async fn send_message(&self, params: &Value, token: &str) -> ToolResult {
        let channel = match require_str(params, "channel") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };
        let text = match require_str(params, "text") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };

        let url = format!("{API_BASE}/chat.postMessage");
        let response = match self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&json!({ "channel": channel, "text": text }))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::fail(format!("Slack request failed: {e}")),
        };

        let (_, payload) = read_json(response).await;
        if let Some(error) = Self::slack_error(&payload) {
            return ToolResult::fail(format!("Slack returned an error: {error}"));
        }

        let ts = payload["ts"].as_str().unwrap_or_default();
        ToolResult::ok_with_message(
            json!({ "channel": channel, "ts": ts }),
            format!("Message sent to {channel}"),
        )
    }
}

#[async_trait]
impl ServicePlugin for SlackPlugin {
    fn name(&self) -> &str {
        "slack"
    }

    fn display_name(&self) -> &str {
        "Slack"
    }

    fn description(&self) -> &str {
        "Send messages to your Slack workspace"
    }

    fn credential_fields(&self) -> &[CredentialField] {
        &self.credential_fields
    }

    fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    async fn execute(&self, tool: &str, params: &Value, credentials: &Credentials) -> ToolResult {
        let token = match credentials.require("bot_token") {
            Ok(t) => t,
            Err(e) => return ToolResult::fail(e),
        };

        match tool {
            "slack_list_channels" => self.list_channels(token).await,
            "slack_send_message" => self.send_message(params, token).await,
            other => ToolResult::unknown_tool(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slack_error_detection() {
        assert!(SlackPlugin::slack_error(&json!({ "ok": true, "ts": "1" })).is_none());
        assert_eq!(
            SlackPlugin::slack_error(&json!({ "ok": false, "error": "invalid_auth" })),
            Some("invalid_auth".to_string())
        );
        // Missing "ok" entirely is treated as an error.
        assert!(SlackPlugin::slack_error(&json!({})).is_some());
    }

    #[tokio::test]
    async fn test_missing_token_is_contained() {
        let plugin = SlackPlugin::new(Client::new());
        let result = plugin
            .execute("slack_send_message", &json!({ "channel": "C1", "text": "hi" }), &Credentials::default())
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("bot_token"));
    }
}
