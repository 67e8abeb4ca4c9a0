//! Jira Cloud integration.
//!
//! Basic auth over email + API token against the REST v3 API. The site
//! domain is part of the credentials because every Jira Cloud tenant has
//! its own hostname.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use reqwest::Client;
use serde_json::{json, Value};

use super::{opt_str, provider_error_message, read_json, require_str, ServicePlugin};
use crate::tools::{CredentialField, FieldKind, InputSchema, ToolResult, ToolSpec};
use crate::vault::Credentials;

pub struct JiraPlugin {
    client: Client,
    credential_fields: Vec<CredentialField>,
    tools: Vec<ToolSpec>,
}

impl JiraPlugin {
    pub fn new(client: Client) -> Self {
        let credential_fields = vec![
            CredentialField::text("domain", "Site Domain")
                .with_placeholder("yourcompany.atlassian.net"),
            CredentialField::text("email", "Account Email"),
            CredentialField::secret("api_token", "API Token")
                .with_help_url("https://id.atlassian.com/manage-profile/security/api-tokens"),
        ];

        let tools = vec![
            ToolSpec::new(
                "jira_create_issue",
                "Create a Jira issue. The project key is the short uppercase prefix in issue \
                 keys like PROJ-123.",
                InputSchema::new()
                    .field("project_key", FieldKind::String, "Project key, e.g. PROJ")
                    .field("summary", FieldKind::String, "Issue summary")
                    .optional_field("description", FieldKind::String, "Issue description")
                    .optional_field(
                        "issue_type",
                        FieldKind::String,
                        "Issue type name; defaults to Task",
                    ),
            ),
            ToolSpec::new(
                "jira_search_issues",
                "Search Jira issues with a JQL query. Use when the user asks what is open or \
                 assigned to them.",
                InputSchema::new().field("jql", FieldKind::String, "JQL query string"),
            ),
        ];

        Self {
            client,
            credential_fields,
            tools,
        }
    }

    fn basic_auth(email: &str, api_token: &str) -> String {
        format!("Basic {}", B64.encode(format!("{email}:{api_token}")))
    }

    async fn create_issue(
        &self,
        params: &Value,
        domain: &str,
        authorization: &str,
    ) -> ToolResult {
        let project_key = match require_str(params, "project_key") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };
        let summary = match require_str(params, "summary") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };
        let issue_type = opt_str(params, "issue_type").unwrap_or("Task");

        let mut fields = json!({
            "project": { "key": project_key },
            "summary": summary,
            "issuetype": { "name": issue_type },
        });
        if let Some(description) = opt_str(params, "description") {
            // Jira Cloud v3 requires the document format for descriptions.
            fields["description"] = json!({
                "type": "doc",
                "version": 1,
                "content": [{
                    "type": "paragraph",
                    "content": [{ "type": "text", "text": description }],
                }],
            });
        }

        let url = format!("https://{domain}/rest/api/3/issue");
        let response = match self
            .client
            .post(&url)
            .header("Authorization", authorization)
            .json(&json!({ "fields": fields }))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::fail(format!("Jira request failed: {e}")),
        };

        let (status, payload) = read_json(response).await;
        if !status.is_success() {
            return ToolResult::fail(format!(
                "Jira returned {status}: {}",
                provider_error_message(&payload)
            ));
        }

        let key = payload["key"].as_str().unwrap_or_default();
        let browse_url = format!("https://{domain}/browse/{key}");
        ToolResult::ok_with_message(
            json!({ "key": key, "url": browse_url }),
            format!("Issue {key} created: {browse_url}"),
        )
    }

    async fn search_issues(&self, params: &Value, domain: &str, authorization: &str) -> ToolResult {
        let jql = match require_str(params, "jql") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };

        let url = format!("https://{domain}/rest/api/3/search/jql");
        let response = match self
            .client
            .post(&url)
            .header("Authorization", authorization)
            .json(&json!({ "jql": jql, "maxResults": 10, "fields": ["summary", "status"] }))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::fail(format!("Jira request failed: {e}")),
        };

        let (status, payload) = read_json(response).await;
        if !status.is_success() {
            return ToolResult::fail(format!(
                "Jira returned {status}: {}",
                provider_error_message(&payload)
            ));
        }

        let issues: Vec<Value> = payload["issues"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .map(|i| {
                        json!({
                            "key": i["key"],
                            "summary": i["fields"]["summary"],
                            "status": i["fields"]["status"]["name"],
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let count = issues.len();
        ToolResult::ok_with_message(json!({ "issues": issues }), format!("Found {count} issues"))
    }
}

#[async_trait]
impl ServicePlugin for JiraPlugin {
    fn name(&self) -> &str {
        "jira"
    }

    fn display_name(&self) -> &str {
        "Jira"
    }

    fn description(&self) -> &str {
        "Create and search issues in your Jira projects"
    }

    fn credential_fields(&self) -> &[CredentialField] {
        &self.credential_fields
    }

    fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    async fn execute(&self, tool: &str, params: &Value, credentials: &Credentials) -> ToolResult {
        let domain = match credentials.require("domain") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };
        let email = match credentials.require("email") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };
        let api_token = match credentials.require("api_token") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };
        let authorization = Self::basic_auth(email, api_token);

        match tool {
            "jira_create_issue" => self.create_issue(params, domain, &authorization).await,
            "jira_search_issues" => self.search_issues(params, domain, &authorization).await,
            other => ToolResult::unknown_tool(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_auth_encoding() {
        let header = JiraPlugin::basic_auth("dev@example.com", "tok123");
        assert!(header.starts_with("Basic "));
        let decoded = B64.decode(header.trim_start_matches("Basic ")).unwrap();
        assert_eq!(decoded, b"dev@example.com:tok123");
    }

    #[tokio::test]
    async fn test_partial_credentials_are_contained() {
        let plugin = JiraPlugin::new(Client::new());
        // Domain present but email and token absent.
        let credentials: Credentials =
            [("domain".to_string(), "x.atlassian.net".to_string())].into_iter().collect();
        let result = plugin.execute("jira_search_issues", &json!({}), &credentials).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("email"));
    }
}
