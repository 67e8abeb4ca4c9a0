//! Todoist integration.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{opt_i64, opt_str, provider_error_message, read_json, require_str, ServicePlugin};
use crate::tools::{CredentialField, FieldKind, InputSchema, ToolResult, ToolSpec};
use crate::vault::Credentials;

const API_BASE: &str = "https://api.todoist.com/rest/v2";

pub struct TodoistPlugin {
    client: Client,
    credential_fields: Vec<CredentialField>,
    tools: Vec<ToolSpec>,
}

impl TodoistPlugin {
    pub fn new(client: Client) -> Self {
        let credential_fields = vec![CredentialField::secret("api_token", "API Token")
            .with_help_url("https://todoist.com/app/settings/integrations/developer")];

        let tools = vec![
            ToolSpec::new(
                "todoist_create_task",
                "Create a Todoist task. Due dates accept natural language like 'tomorrow at \
                 9am' in the due_string parameter.",
                InputSchema::new()
                    .field("content", FieldKind::String, "Task text")
                    .optional_field("due_string", FieldKind::String, "Natural-language due date")
                    .optional_field("priority", FieldKind::Number, "Priority 1-4 (4 highest)"),
            ),
            ToolSpec::new(
                "todoist_list_today",
                "List tasks due today or overdue. Use when the user asks what is on their \
                 plate.",
                InputSchema::new(),
            ),
        ];

        Self {
            client,
            credential_fields,
            tools,
        }
    }

    async fn create_task(&self, params: &Value, token: &str) -> ToolResult {
        let content = match require_str(params, "content") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };

        let mut body = json!({ "content": content });
        if let Some(due_string) = opt_str(params, "due_string") {
            body["due_string"] = json!(due_string);
        }
        if let Some(priority) = opt_i64(params, "priority") {
            body["priority"] = json!(priority.clamp(1, 4));
        }

        let url = format!("{API_BASE}/tasks");
        let response = match self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::fail(format!("Todoist request failed: {e}")),
        };

        let (status, payload) = read_json(response).await;
        if !status.is_success() {
            return ToolResult::fail(format!(
                "Todoist returned {status}: {}",
                provider_error_message(&payload)
            ));
        }

        let task_url = payload["url"].as_str().unwrap_or_default();
        ToolResult::ok_with_message(
            json!({ "task_id": payload["id"], "url": task_url }),
            format!("Task created: {content}"),
        )
    }

    async fn list_today(&self, token: &str) -> ToolResult {
        let url = format!("{API_BASE}/tasks");
        let response = match self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[("filter", "today | overdue")])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::fail(format!("Todoist request failed: {e}")),
        };

        let (status, payload) = read_json(response).await;
        if !status.is_success() {
            return ToolResult::fail(format!(
                "Todoist returned {status}: {}",
                provider_error_message(&payload)
            ));
        }

        let tasks: Vec<Value> = payload
            .as_array()
            .map(|arr| {
                arr.iter()
                    .map(|t| {
                        json!({
                            "id": t["id"],
                            "content": t["content"],
                            "due": t["due"]["string"],
                            "priority": t["priority"],
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let count = tasks.len();
        ToolResult::ok_with_message(
            json!({ "tasks": tasks }),
            format!("{count} tasks due today or overdue"),
        )
    }
}

#[async_trait]
impl ServicePlugin for TodoistPlugin {
    fn name(&self) -> &str {
        "todoist"
    }

    fn display_name(&self) -> &str {
        "Todoist"
    }

    fn description(&self) -> &str {
        "Create and review tasks in Todoist"
    }

    fn credential_fields(&self) -> &[CredentialField] {
        &self.credential_fields
    }

    fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    async fn execute(&self, tool: &str, params: &Value, credentials: &Credentials) -> ToolResult {
        let token = match credentials.require("api_token") {
            Ok(t) => t,
            Err(e) => return ToolResult::fail(e),
        };

        match tool {
            "todoist_create_task" => self.create_task(params, token).await,
            "todoist_list_today" => self.list_today(token).await,
            other => ToolResult::unknown_tool(other),
        }
    }
}
