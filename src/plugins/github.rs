//! GitHub integration.
//!
//! Authenticates with a personal access token (bearer) against the REST v3
//! API. Exposes issue creation, repository listing, and issue search.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{opt_str, provider_error_message, read_json, require_str, ServicePlugin};
use crate::tools::{CredentialField, FieldKind, InputSchema, ToolResult, ToolSpec};
use crate::vault::Credentials;

const API_BASE: &str = "https://api.github.com";

/// GitHub service plugin.
pub struct GithubPlugin {
    client: Client,
    credential_fields: Vec<CredentialField>,
    tools: Vec<ToolSpec>,
}

impl GithubPlugin {
    pub fn new(client: Client) -> Self {
        let credential_fields = vec![CredentialField::secret("token", "Personal Access Token")
            .with_help_url("https://github.com/settings/tokens")
            .with_placeholder("ghp_...")];

        let tools = vec![
            ToolSpec::new(
                "github_create_issue",
                "Create an issue in a GitHub repository. Use github_list_repos first if you \
                 are unsure of the exact repository name.",
                InputSchema::new()
                    .field("repo", FieldKind::String, "Repository in 'owner/name' form")
                    .field("title", FieldKind::String, "Issue title")
                    .optional_field("body", FieldKind::String, "Issue body in Markdown")
                    .optional_field("labels", FieldKind::StringArray, "Labels to apply"),
            ),
            ToolSpec::new(
                "github_list_repos",
                "List the repositories the connected account can push to. Use this FIRST when \
                 the user names a repository loosely.",
                InputSchema::new(),
            ),
            ToolSpec::new(
                "github_search_issues",
                "Search issues and pull requests. Use when the user asks whether something is \
                 already filed.",
                InputSchema::new()
                    .field("query", FieldKind::String, "Search terms")
                    .optional_field("repo", FieldKind::String, "Limit to 'owner/name'"),
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
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "taskpilot")
    }

    async fn create_issue(&self, params: &Value, token: &str) -> ToolResult {
        let repo = match require_str(params, "repo") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };
        let title = match require_str(params, "title") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };

        let mut body = json!({ "title": title });
        if let Some(text) = opt_str(params, "body") {
            body["body"] = json!(text);
        }
        if let Some(labels) = params.get("labels").filter(|v| v.is_array()) {
            body["labels"] = labels.clone();
        }

        let url = format!("{API_BASE}/repos/{repo}/issues");
        let response = match self
            .request(reqwest::Method::POST, &url, token)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::fail(format!("GitHub request failed: {e}")),
        };

        let (status, payload) = read_json(response).await;
        if !status.is_success() {
            return ToolResult::fail(format!(
                "GitHub returned {status}: {}",
                provider_error_message(&payload)
            ));
        }

        let number = payload["number"].as_i64().unwrap_or_default();
        let html_url = payload["html_url"].as_str().unwrap_or_default();
        ToolResult::ok_with_message(
            json!({ "number": number, "url": html_url, "repo": repo }),
            format!("Issue #{number} created: {html_url}"),
        )
    }

    async fn list_repos(&self, token: &str) -> ToolResult {
        let url = format!("{API_BASE}/user/repos?sort=pushed&per_page=30");
        let response = match self.request(reqwest::Method::GET, &url, token).send().await {
            Ok(r) => r,
            Err(e) => return ToolResult::fail(format!("GitHub request failed: {e}")),
        };

        let (status, payload) = read_json(response).await;
        if !status.is_success() {
            return ToolResult::fail(format!(
                "GitHub returned {status}: {}",
                provider_error_message(&payload)
            ));
        }

        let repos: Vec<Value> = payload
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|r| {
                        json!({
                            "full_name": r["full_name"],
                            "private": r["private"],
                            "description": r["description"],
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let count = repos.len();
        ToolResult::ok_with_message(
            json!({ "repos": repos }),
            format!("Found {count} repositories"),
        )
    }

    async fn search_issues(&self, params: &Value, token: &str) -> ToolResult {
        let query = match require_str(params, "query") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };
        let mut q = query.to_string();
        if let Some(repo) = opt_str(params, "repo") {
            q.push_str(&format!(" repo:{repo}"));
        }

        let url = format!("{API_BASE}/search/issues");
        let response = match self
            .request(reqwest::Method::GET, &url, token)
            .query(&[("q", q.as_str()), ("per_page", "10")])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::fail(format!("GitHub request failed: {e}")),
        };

        let (status, payload) = read_json(response).await;
        if !status.is_success() {
            return ToolResult::fail(format!(
                "GitHub returned {status}: {}",
                provider_error_message(&payload)
            ));
        }

        let items: Vec<Value> = payload["items"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .map(|i| {
                        json!({
                            "number": i["number"],
                            "title": i["title"],
                            "state": i["state"],
                            "url": i["html_url"],
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let total = payload["total_count"].as_i64().unwrap_or(items.len() as i64);
        ToolResult::ok_with_message(
            json!({ "total": total, "items": items }),
            format!("Found {total} matching issues"),
        )
    }
}

#[async_trait]
impl ServicePlugin for GithubPlugin {
    fn name(&self) -> &str {
        "github"
    }

    fn display_name(&self) -> &str {
        "GitHub"
    }

    fn description(&self) -> &str {
        "Create and search issues in your GitHub repositories"
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
            "github_create_issue" => self.create_issue(params, token).await,
            "github_list_repos" => self.list_repos(token).await,
            "github_search_issues" => self.search_issues(params, token).await,
            other => ToolResult::unknown_tool(other),
        }
    }
}
