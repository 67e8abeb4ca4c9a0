//! Discord integration.
//!
//! Bot-token auth against the Discord REST API.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{provider_error_message, read_json, require_str, ServicePlugin};
use crate::tools::{CredentialField, FieldKind, InputSchema, ToolResult, ToolSpec};
use crate::vault::Credentials;

const API_BASE: &str = "https://discord.com/api/v10";

pub struct DiscordPlugin {
    client: Client,
    credential_fields: Vec<CredentialField>,
    tools: Vec<ToolSpec>,
}

impl DiscordPlugin {
    pub fn new(client: Client) -> Self {
        let credential_fields = vec![CredentialField::secret("bot_token", "Bot Token")
            .with_help_url("https://discord.com/developers/applications")];

        let tools = vec![ToolSpec::new(
            "discord_send_message",
            "Send a message to a Discord channel the bot is in. The channel ID is the long \
             number from the channel link.",
            InputSchema::new()
                .field("channel_id", FieldKind::String, "Discord channel ID")
                .field("content", FieldKind::String, "Message content"),
        )];

        Self {
            client,
            credential_fields,
            tools,
        }
    }

    async fn send_message(&self, params: &Value, token: &str) -> ToolResult {
        let channel_id = match require_str(params, "channel_id") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };
        let content = match require_str(params, "content") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };

        let url = format!("{API_BASE}/channels/{channel_id}/messages");
        let response = match self
            .client
            .post(&url)
            .header("Authorization", format!("Bot {token}"))
            .json(&json!({ "content": content }))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::fail(format!("Discord request failed: {e}")),
        };

        let (status, payload) = read_json(response).await;
        if !status.is_success() {
            return ToolResult::fail(format!(
                "Discord returned {status}: {}",
                provider_error_message(&payload)
            ));
        }

        let message_id = payload["id"].as_str().unwrap_or_default();
        ToolResult::ok_with_message(
            json!({ "message_id": message_id, "channel_id": channel_id }),
            "Message sent to the Discord channel",
        )
    }
}

#[async_trait]
impl ServicePlugin for DiscordPlugin {
    fn name(&self) -> &str {
        "discord"
    }

    fn display_name(&self) -> &str {
        "Discord"
    }

    fn description(&self) -> &str {
        "Send messages to Discord channels through your bot"
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
            "discord_send_message" => self.send_message(params, token).await,
            other => ToolResult::unknown_tool(other),
        }
    }
}
