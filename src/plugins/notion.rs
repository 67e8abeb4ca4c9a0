//! Notion integration.
//!
//! Internal-integration token auth against the Notion REST API.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{opt_str, provider_error_message, read_json, require_str, ServicePlugin};
use crate::tools::{CredentialField, FieldKind, InputSchema, ToolResult, ToolSpec};
use crate::vault::Credentials;

const API_BASE: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";

pub struct NotionPlugin {
    client: Client,
    credential_fields: Vec<CredentialField>,
    tools: Vec<ToolSpec>,
}

impl NotionPlugin {
    pub fn new(client: Client) -> Self {
        let credential_fields = vec![CredentialField::secret("token", "Internal Integration Token")
            .with_help_url("https://www.notion.so/my-integrations")
            .with_placeholder("ntn_...")];

        let tools = vec![
            ToolSpec::new(
                "notion_search",
                "Search pages shared with the integration. Use this FIRST to find the parent \
                 page ID before creating a page.",
                InputSchema::new().field("query", FieldKind::String, "Search terms"),
            ),
            ToolSpec::new(
                "notion_create_page",
                "Create a Notion page under a parent page. Requires a parent page ID from \
                 notion_search.",
                InputSchema::new()
                    .field("parent_page_id", FieldKind::String, "Parent page ID")
                    .field("title", FieldKind::String, "Page title")
                    .optional_field("content", FieldKind::String, "Body text for the page"),
            ),
        ];

        Self {
            client,
            credential_fields,
            tools,
        }
    }

    fn request(&self, method: reqwest::Method, url: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(token)
            .header("Notion-Version", NOTION_VERSION)
    }

    async fn search(&self, params: &Value, token: &str) -> ToolResult {
        let query = match require_str(params, "query") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };

        let url = format!("{API_BASE}/search");
        let response = match self
            .request(reqwest::Method::POST, &url, token)
            .json(&json!({ "query": query, "page_size": 10 }))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::fail(format!("Notion request failed: {e}")),
        };

        let (status, payload) = read_json(response).await;
        if !status.is_success() {
            return ToolResult::fail(format!(
                "Notion returned {status}: {}",
                provider_error_message(&payload)
            ));
        }

        let pages: Vec<Value> = payload["results"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .map(|p| {
                        // Title lives under different property shapes; take the
                        // first plain_text found.
                        let title = p["properties"]
                            .as_object()
                            .and_then(|props| {
                                props.values().find_map(|prop| {
                                    prop["title"][0]["plain_text"].as_str()
                                })
                            })
                            .unwrap_or("(untitled)");
                        json!({ "id": p["id"], "title": title, "url": p["url"] })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let count = pages.len();
        ToolResult::ok_with_message(json!({ "pages": pages }), format!("Found {count} pages"))
    }

    async fn create_page(&self, params: &Value, token: &str) -> ToolResult {
        let parent_page_id = match require_str(params, "parent_page_id") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };
        let title = match require_str(params, "title") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };

        let mut body = json!({
            "parent": { "page_id": parent_page_id },
            "properties": {
                "title": { "title": [{ "text": { "content": title } }] }
            },
        });
        if let Some(content) = opt_str(params, "content") {
            body["children"] = json!([{
                "object": "block",
                "type": "paragraph",
                "paragraph": { "rich_text": [{ "text": { "content": content } }] },
            }]);
        }

        let url = format!("{API_BASE}/pages");
        let response = match self
            .request(reqwest::Method::POST, &url, token)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::fail(format!("Notion request failed: {e}")),
        };

        let (status, payload) = read_json(response).await;
        if !status.is_success() {
            return ToolResult::fail(format!(
                "Notion returned {status}: {}",
                provider_error_message(&payload)
            ));
        }

        let page_url = payload["url"].as_str().unwrap_or_default();
        ToolResult::ok_with_message(
            json!({ "page_id": payload["id"], "url": page_url }),
            format!("Page \"{title}\" created: {page_url}"),
        )
    }
}

#[async_trait]
impl ServicePlugin for NotionPlugin {
    fn name(&self) -> &str {
        "notion"
    }

    fn display_name(&self) -> &str {
        "Notion"
    }

    fn description(&self) -> &str {
        "Create pages and search your Notion workspace"
    }

    fn credential_fields(&self) -> &[CredentialField] {
        &self.credential_fields
    }

    fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    async fn execute(&self, tool: &str, params: &Value, credentials: &Credentials) -> ToolResult {
        let token = match credentials.require("token") {
            Ok(t) => t,
            Err(e) => return ToolResult::fail(e),
        };

        match tool {
            "notion_search" => self.search(params, token).await,
            "notion_create_page" => self.create_page(params, token).await,
            other => ToolResult::unknown_tool(other),
        }
    }
}
