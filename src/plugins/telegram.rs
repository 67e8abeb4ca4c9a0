//! Telegram integration.
//!
//! Bot-token auth against the Bot API. The default chat id is stored with
//! the credentials so "send me a reminder" works without the model having
//! to know the user's chat.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{opt_str, read_json, require_str, ServicePlugin};
use crate::tools::{CredentialField, FieldKind, InputSchema, ToolResult, ToolSpec};
use crate::vault::Credentials;

pub struct TelegramPlugin {
    client: Client,
    credential_fields: Vec<CredentialField>,
    tools: Vec<ToolSpec>,
}

impl TelegramPlugin {
    pub fn new(client: Client) -> Self {
        let credential_fields = vec![
            CredentialField::secret("bot_token", "Bot Token")
                .with_help_url("https://core.telegram.org/bots#botfather"),
            CredentialField::text("chat_id", "Default Chat ID")
                .with_placeholder("123456789"),
        ];

        let tools = vec![ToolSpec::new(
            "telegram_send_message",
            "Send a Telegram message. Sends to the user's default chat unless a chat_id \
             parameter is given.",
            InputSchema::new()
                .field("text", FieldKind::String, "Message text")
                .optional_field("chat_id", FieldKind::String, "Override the default chat"),
        )];

        Self {
            client,
            credential_fields,
            tools,
        }
    }

    async fn send_message(&self, params: &Value, credentials: &Credentials) -> ToolResult {
        let token = match credentials.require("bot_token") {
            Ok(t) => t,
            Err(e) => return ToolResult::fail(e),
        };
        let text = match require_str(params, "text") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };
        // Parameter overrides the stored default chat.
        let chat_id = match opt_str(params, "chat_id").or_else(|| credentials.get("chat_id")) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => return ToolResult::fail("no chat_id given and no default chat configured"),
        };

        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let response = match self
            .client
            .post(&url)
            .json(&json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::fail(format!("Telegram request failed: {e}")),
        };

        let (_, payload) = read_json(response).await;
        if payload["ok"].as_bool() != Some(true) {
            let description = payload["description"].as_str().unwrap_or("unknown error");
            return ToolResult::fail(format!("Telegram returned an error: {description}"));
        }

        let message_id = payload["result"]["message_id"].as_i64().unwrap_or_default();
        ToolResult::ok_with_message(
            json!({ "message_id": message_id, "chat_id": chat_id }),
            "Telegram message sent",
        )
    }
}

#[async_trait]
impl ServicePlugin for TelegramPlugin {
    fn name(&self) -> &str {
        "telegram"
    }

    fn display_name(&self) -> &str {
        "Telegram"
    }

    fn description(&self) -> &str {
        "Send yourself Telegram messages through your bot"
    }

    fn credential_fields(&self) -> &[CredentialField] {
        &self.credential_fields
    }

    fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    async fn execute(&self, tool: &str, params: &Value, credentials: &Credentials) -> ToolResult {
        match tool {
            "telegram_send_message" => self.send_message(params, credentials).await,
            other => ToolResult::unknown_tool(other),
        }
    }
}
