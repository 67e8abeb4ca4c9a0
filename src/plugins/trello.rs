//! Trello integration.
//!
//! Trello authenticates with an API key + member token passed as query
//! parameters rather than headers.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{opt_str, provider_error_message, read_json, require_str, ServicePlugin};
use crate::tools::{CredentialField, FieldKind, InputSchema, ToolResult, ToolSpec};
use crate::vault::Credentials;

const API_BASE: &str = "https://api.trello.com/1";

pub struct TrelloPlugin {
    client: Client,
    credential_fields: Vec<CredentialField>,
    tools: Vec<ToolSpec>,
}

impl TrelloPlugin {
    pub fn new(client: Client) -> Self {
        let credential_fields = vec![
            CredentialField::secret("api_key", "API Key")
                .with_help_url("https://trello.com/power-ups/admin"),
            CredentialField::secret("token", "Member Token"),
        ];

        let tools = vec![
            ToolSpec::new(
                "trello_list_boards",
                "List the user's open boards with their lists. Use this FIRST to find the \
                 list ID before creating a card.",
                InputSchema::new(),
            ),
            ToolSpec::new(
                "trello_create_card",
                "Create a card in a Trello list. Requires a list ID from trello_list_boards.",
                InputSchema::new()
                    .field("list_id", FieldKind::String, "List ID")
                    .field("name", FieldKind::String, "Card title")
                    .optional_field("desc", FieldKind::String, "Card description"),
            ),
        ];

        Self {
            client,
            credential_fields,
            tools,
        }
    }

    async fn list_boards(&self, api_key: &str, token: &str) -> ToolResult {
        let url = format!("{API_BASE}/members/me/boards");
        let response = match self
            .client
            .get(&url)
            .query(&[
                ("key", api_key),
                ("token", token),
                ("filter", "open"),
                ("lists", "open"),
            ])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::fail(format!("Trello request failed: {e}")),
        };

        let (status, payload) = read_json(response).await;
        if !status.is_success() {
            return ToolResult::fail(format!(
                "Trello returned {status}: {}",
                provider_error_message(&payload)
            ));
        }

        let boards: Vec<Value> = payload
            .as_array()
            .map(|arr| {
                arr.iter()
                    .map(|b| {
                        let lists: Vec<Value> = b["lists"]
                            .as_array()
                            .map(|ls| {
                                ls.iter()
                                    .map(|l| json!({ "id": l["id"], "name": l["name"] }))
                                    .collect()
                            })
                            .unwrap_or_default();
                        json!({ "id": b["id"], "name": b["name"], "lists": lists })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let count = boards.len();
        ToolResult::ok_with_message(json!({ "boards": boards }), format!("Found {count} boards"))
    }

    async fn create_card(&self, params: &Value, api_key: &str, token: &str) -> ToolResult {
        let list_id = match require_str(params, "list_id") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };
        let name = match require_str(params, "name") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };

        let mut query = vec![
            ("key", api_key.to_string()),
            ("token", token.to_string()),
            ("idList", list_id.to_string()),
            ("name", name.to_string()),
        ];
        if let Some(desc) = opt_str(params, "desc") {
            query.push(("desc", desc.to_string()));
        }

        let url = format!("{API_BASE}/cards");
        let response = match self.client.post(&url).query(&query).send().await {
            Ok(r) => r,
            Err(e) => return ToolResult::fail(format!("Trello request failed: {e}")),
        };

        let (status, payload) = read_json(response).await;
        if !status.is_success() {
            return ToolResult::fail(format!(
                "Trello returned {status}: {}",
                provider_error_message(&payload)
            ));
        }

        let card_url = payload["shortUrl"].as_str().unwrap_or_default();
        ToolResult::ok_with_message(
            json!({ "card_id": payload["id"], "url": card_url }),
            format!("Card \"{name}\" created: {card_url}"),
        )
    }
}

#[async_trait]
impl ServicePlugin for TrelloPlugin {
    fn name(&self) -> &str {
        "trello"
    }

    fn display_name(&self) -> &str {
        "Trello"
    }

    fn description(&self) -> &str {
        "Create cards on your Trello boards"
    }

    fn credential_fields(&self) -> &[CredentialField] {
        &self.credential_fields
    }

    fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    async fn execute(&self, tool: &str, params: &Value, credentials: &Credentials) -> ToolResult {
        let api_key = match credentials.require("api_key") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };
        let token = match credentials.require("token") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };

        match tool {
            "trello_list_boards" => self.list_boards(api_key, token).await,
            "trello_create_card" => self.create_card(params, api_key, token).await,
            other => ToolResult::unknown_tool(other),
        }
    }
}
