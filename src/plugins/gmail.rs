//! Gmail integration.
//!
//! OAuth bearer auth against the Gmail REST API. Drafts are composed as a
//! raw RFC 2822 message and base64url-encoded, which is the only format the
//! drafts endpoint accepts.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use reqwest::Client;
use serde_json::{json, Value};

use super::google::{oauth_credential_fields, resolve_access_token};
use super::{opt_i64, provider_error_message, read_json, require_str, ServicePlugin};
use crate::tools::{CredentialField, FieldKind, InputSchema, ToolResult, ToolSpec};
use crate::vault::Credentials;

const API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

pub struct GmailPlugin {
    client: Client,
    credential_fields: Vec<CredentialField>,
    tools: Vec<ToolSpec>,
}

impl GmailPlugin {
    pub fn new(client: Client) -> Self {
        let tools = vec![
            ToolSpec::new(
                "gmail_create_draft",
                "Create a Gmail draft reply or new message. The draft is saved, never sent — \
                 the user reviews and sends it themselves.",
                InputSchema::new()
                    .field("to", FieldKind::String, "Recipient email address")
                    .field("subject", FieldKind::String, "Subject line")
                    .field("body", FieldKind::String, "Plain-text message body"),
            ),
            ToolSpec::new(
                "gmail_list_recent",
                "List the most recent inbox messages. Use when the user refers to a mail \
                 they received.",
                InputSchema::new().optional_field(
                    "max_results",
                    FieldKind::Number,
                    "How many messages to list (default 5)",
                ),
            ),
        ];

        Self {
            client,
            credential_fields: oauth_credential_fields(),
            tools,
        }
    }

    /// Compose and base64url-encode a minimal RFC 2822 message.
    fn encode_raw_message(to: &str, subject: &str, body: &str) -> String {
        let raw = format!(
            "To: {to}\r\nSubject: {subject}\r\nContent-Type: text/plain; charset=\"UTF-8\"\r\n\r\n{body}"
        );
        URL_SAFE_NO_PAD.encode(raw)
    }

    async fn create_draft(&self, params: &Value, token: &str) -> ToolResult {
        let to = match require_str(params, "to") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };
        let subject = match require_str(params, "subject") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };
        let body = match require_str(params, "body") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };

        let url = format!("{API_BASE}/drafts");
        let response = match self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&json!({
                "message": { "raw": Self::encode_raw_message(to, subject, body) }
            }))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::fail(format!("Gmail request failed: {e}")),
        };

        let (status, payload) = read_json(response).await;
        if !status.is_success() {
            return ToolResult::fail(format!(
                "Gmail returned {status}: {}",
                provider_error_message(&payload)
            ));
        }

        let draft_id = payload["id"].as_str().unwrap_or_default();
        ToolResult::ok_with_message(
            json!({ "draft_id": draft_id, "to": to, "subject": subject }),
            format!("Draft to {to} saved: \"{subject}\""),
        )
    }

    async fn list_recent(&self, params: &Value, token: &str) -> ToolResult {
        let max_results = opt_i64(params, "max_results").unwrap_or(5).clamp(1, 25);

        let url = format!("{API_BASE}/messages");
        let response = match self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[
                ("maxResults", max_results.to_string()),
                ("labelIds", "INBOX".to_string()),
            ])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::fail(format!("Gmail request failed: {e}")),
        };

        let (status, payload) = read_json(response).await;
        if !status.is_success() {
            return ToolResult::fail(format!(
                "Gmail returned {status}: {}",
                provider_error_message(&payload)
            ));
        }

        let ids: Vec<Value> = payload["messages"]
            .as_array()
            .map(|arr| arr.iter().map(|m| m["id"].clone()).collect())
            .unwrap_or_default();

        let count = ids.len();
        ToolResult::ok_with_message(
            json!({ "message_ids": ids }),
            format!("Found {count} recent messages"),
        )
    }
}

#[async_trait]
impl ServicePlugin for GmailPlugin {
    fn name(&self) -> &str {
        "gmail"
    }

    fn display_name(&self) -> &str {
        "Gmail"
    }

    fn description(&self) -> &str {
        "Draft replies and check recent mail in your Gmail account"
    }

    fn credential_fields(&self) -> &[CredentialField] {
        &self.credential_fields
    }

    fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    async fn execute(&self, tool: &str, params: &Value, credentials: &Credentials) -> ToolResult {
        let token = match resolve_access_token(&self.client, credentials).await {
            Ok(t) => t,
            Err(e) => return ToolResult::fail(e.into_message("Gmail")),
        };

        match tool {
            "gmail_create_draft" => self.create_draft(params, &token).await,
            "gmail_list_recent" => self.list_recent(params, &token).await,
            other => ToolResult::unknown_tool(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_message_encoding() {
        let encoded = GmailPlugin::encode_raw_message("a@b.com", "Hello", "Body text");
        let decoded = URL_SAFE_NO_PAD.decode(encoded).unwrap();
        let raw = String::from_utf8(decoded).unwrap();
        assert!(raw.starts_with("To: a@b.com\r\n"));
        assert!(raw.contains("Subject: Hello\r\n"));
        assert!(raw.ends_with("\r\n\r\nBody text"));
    }

    #[tokio::test]
    async fn test_missing_access_token_is_contained() {
        let plugin = GmailPlugin::new(Client::new());
        let result = plugin
            .execute(
                "gmail_create_draft",
                &json!({ "to": "a@b.com", "subject": "s", "body": "b" }),
                &Credentials::default(),
            )
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("access_token"));
    }
}
