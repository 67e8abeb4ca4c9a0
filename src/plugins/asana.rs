//! Asana integration.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{opt_str, read_json, require_str, ServicePlugin};
use crate::tools::{CredentialField, FieldKind, InputSchema, ToolResult, ToolSpec};
use crate::vault::Credentials;

const API_BASE: &str = "https://app.asana.com/api/1.0";

pub struct AsanaPlugin {
    client: Client,
    credential_fields: Vec<CredentialField>,
    tools: Vec<ToolSpec>,
}

impl AsanaPlugin {
    pub fn new(client: Client) -> Self {
        let credential_fields = vec![CredentialField::secret("access_token", "Personal Access Token")
            .with_help_url("https://app.asana.com/0/my-apps")];

        let tools = vec![
            ToolSpec::new(
                "asana_list_workspaces",
                "List the user's Asana workspaces. Use this FIRST to get a workspace ID \
                 before creating a task.",
                InputSchema::new(),
            ),
            ToolSpec::new(
                "asana_create_task",
                "Create an Asana task in a workspace, assigned to the connected user.",
                InputSchema::new()
                    .field("workspace_id", FieldKind::String, "Workspace ID")
                    .field("name", FieldKind::String, "Task name")
                    .optional_field("notes", FieldKind::String, "Task notes"),
            ),
        ];

        Self {
            client,
            credential_fields,
            tools,
        }
    }

    /// Asana wraps errors as `{"errors": [{"message": ...}]}`.
    fn asana_error(payload: &Value) -> String {
        payload["errors"][0]["message"]
            .as_str()
            .unwrap_or("unknown Asana error")
            .to_string()
    }

    async fn list_workspaces(&self, token: &str) -> ToolResult {
        let url = format!("{API_BASE}/workspaces");
        let response = match self.client.get(&url).bearer_auth(token).send().await {
            Ok(r) => r,
            Err(e) => return ToolResult::fail(format!("Asana request failed: {e}")),
        };

        let (status, payload) = read_json(response).await;
        if !status.is_success() {
            return ToolResult::fail(format!(
                "Asana returned {status}: {}",
                Self::asana_error(&payload)
            ));
        }

        let workspaces: Vec<Value> = payload["data"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .map(|w| json!({ "id": w["gid"], "name": w["name"] }))
                    .collect()
            })
            .unwrap_or_default();

        let count = workspaces.len();
        ToolResult::ok_with_message(
            json!({ "workspaces": workspaces }),
            format!("Found {count} workspaces"),
        )
    }

    async fn create_task(&self, params: &Value, token: &str) -> ToolResult {
        let workspace_id = match require_str(params, "workspace_id") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };
        let name = match require_str(params, "name") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };

        let mut data = json!({
            "workspace": workspace_id,
            "name": name,
            "assignee": "me",
        });
        if let Some(notes) = opt_str(params, "notes") {
            data["notes"] = json!(notes);
        }

        let url = format!("{API_BASE}/tasks");
        let response = match self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&json!({ "data": data }))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::fail(format!("Asana request failed: {e}")),
        };

        let (status, payload) = read_json(response).await;
        if !status.is_success() {
            return ToolResult::fail(format!(
                "Asana returned {status}: {}",
                Self::asana_error(&payload)
            ));
        }

        let task_url = payload["data"]["permalink_url"].as_str().unwrap_or_default();
        ToolResult::ok_with_message(
            json!({ "task_id": payload["data"]["gid"], "url": task_url }),
            format!("Task \"{name}\" created: {task_url}"),
        )
    }
}

#[async_trait]
impl ServicePlugin for AsanaPlugin {
    fn name(&self) -> &str {
        "asana"
    }

    fn display_name(&self) -> &str {
        "Asana"
    }

    fn description(&self) -> &str {
        "Create tasks in your Asana workspaces"
    }

    fn credential_fields(&self) -> &[CredentialField] {
        &self.credential_fields
    }

    fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    async fn execute(&self, tool: &str, params: &Value, credentials: &Credentials) -> ToolResult {
        let token = match credentials.require("access_token") {
            Ok(t) => t,
            Err(e) => return ToolResult::fail(e),
        };

        match tool {
            "asana_list_workspaces" => self.list_workspaces(token).await,
            "asana_create_task" => self.create_task(params, token).await,
            other => ToolResult::unknown_tool(other),
        }
    }
}
