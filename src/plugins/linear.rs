//! Linear integration.
//!
//! Talks to the Linear GraphQL API with a personal API key. Linear requires
//! a team id to create an issue, so the team-listing tool is described as
//! the mandatory first step.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{opt_i64, opt_str, read_json, require_str, ServicePlugin};
use crate::tools::{CredentialField, FieldKind, InputSchema, ToolResult, ToolSpec};
use crate::vault::Credentials;

const GRAPHQL_URL: &str = "https://api.linear.app/graphql";

pub struct LinearPlugin {
    client: Client,
    credential_fields: Vec<CredentialField>,
    tools: Vec<ToolSpec>,
}

impl LinearPlugin {
    pub fn new(client: Client) -> Self {
        let credential_fields = vec![CredentialField::secret("api_key", "API Key")
            .with_help_url("https://linear.app/settings/api")
            .with_placeholder("lin_api_...")];

        let tools = vec![
            ToolSpec::new(
                "linear_list_teams",
                "List the Linear teams visible to the connected account. Use this FIRST to \
                 fetch valid team IDs before creating an issue.",
                InputSchema::new(),
            ),
            ToolSpec::new(
                "linear_create_issue",
                "Create a Linear issue in a team. Requires a team ID from linear_list_teams.",
                InputSchema::new()
                    .field("team_id", FieldKind::String, "Team ID from linear_list_teams")
                    .field("title", FieldKind::String, "Issue title")
                    .optional_field("description", FieldKind::String, "Issue description in Markdown")
                    .optional_field(
                        "priority",
                        FieldKind::Number,
                        "Priority 0-4 (0 none, 1 urgent, 4 low)",
                    ),
            ),
        ];

        Self {
            client,
            credential_fields,
            tools,
        }
    }

    /// Run one GraphQL operation; returns the `data` object or a
    /// human-readable error. Linear reports errors both as HTTP failures
    /// and as a 200 with an `errors` array.
    async fn graphql(&self, api_key: &str, query: &str, variables: Value) -> Result<Value, String> {
        let response = self
            .client
            .post(GRAPHQL_URL)
            .header("Authorization", api_key)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| format!("Linear request failed: {e}"))?;

        let (status, payload) = read_json(response).await;
        if let Some(errors) = payload.get("errors").and_then(Value::as_array) {
            let message = errors
                .first()
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("unknown GraphQL error");
            return Err(format!("Linear returned an error: {message}"));
        }
        if !status.is_success() {
            return Err(format!("Linear returned {status}"));
        }
        Ok(payload["data"].clone())
    }

    async fn list_teams(&self, api_key: &str) -> ToolResult {
        let query = "query { teams { nodes { id name key } } }";
        let data = match self.graphql(api_key, query, json!({})).await {
            Ok(d) => d,
            Err(e) => return ToolResult::fail(e),
        };

        let teams = data["teams"]["nodes"].clone();
        let count = teams.as_array().map(Vec::len).unwrap_or(0);
        ToolResult::ok_with_message(json!({ "teams": teams }), format!("Found {count} teams"))
    }

    async fn create_issue(&self, params: &Value, api_key: &str) -> ToolResult {
        let team_id = match require_str(params, "team_id") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };
        let title = match require_str(params, "title") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };

        let mut input = json!({ "teamId": team_id, "title": title });
        if let Some(description) = opt_str(params, "description") {
            input["description"] = json!(description);
        }
        if let Some(priority) = opt_i64(params, "priority") {
            input["priority"] = json!(priority);
        }

        let query = "mutation IssueCreate($input: IssueCreateInput!) { \
                     issueCreate(input: $input) { success issue { identifier url } } }";
        let data = match self.graphql(api_key, query, json!({ "input": input })).await {
            Ok(d) => d,
            Err(e) => return ToolResult::fail(e),
        };

        let created = &data["issueCreate"];
        if !created["success"].as_bool().unwrap_or(false) {
            return ToolResult::fail("Linear did not create the issue");
        }
        let identifier = created["issue"]["identifier"].as_str().unwrap_or_default();
        let url = created["issue"]["url"].as_str().unwrap_or_default();
        ToolResult::ok_with_message(
            json!({ "identifier": identifier, "url": url }),
            format!("Issue {identifier} created: {url}"),
        )
    }
}

#[async_trait]
impl ServicePlugin for LinearPlugin {
    fn name(&self) -> &str {
        "linear"
    }

    fn display_name(&self) -> &str {
        "Linear"
    }

    fn description(&self) -> &str {
        "Create issues in your Linear teams"
    }

    fn credential_fields(&self) -> &[CredentialField] {
        &self.credential_fields
    }

    fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    async fn execute(&self, tool: &str, params: &Value, credentials: &Credentials) -> ToolResult {
        let api_key = match credentials.require("api_key") {
            Ok(k) => k,
            Err(e) => return ToolResult::fail(e),
        };

        match tool {
            "linear_list_teams" => self.list_teams(api_key).await,
            "linear_create_issue" => self.create_issue(params, api_key).await,
            other => ToolResult::unknown_tool(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_api_key_is_contained() {
        let plugin = LinearPlugin::new(Client::new());
        let result = plugin
            .execute("linear_list_teams", &json!({}), &Credentials::default())
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("api_key"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_contained() {
        let plugin = LinearPlugin::new(Client::new());
        let credentials: Credentials =
            [("api_key".to_string(), "lin_api_x".to_string())].into_iter().collect();
        let result = plugin.execute("linear_delete_issue", &json!({}), &credentials).await;
        assert!(!result.success);
    }
}
