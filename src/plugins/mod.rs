//! Service plugins: one adapter per third-party integration.
//!
//! Every plugin wraps one external HTTP/GraphQL API as a uniform set of
//! named, typed, LLM-describable tools. All plugins follow the same
//! template: declare credential fields, declare tools, and implement a
//! single `execute` dispatch keyed by tool name. Ordinary failures
//! (network errors, provider error payloads, missing credentials, unknown
//! tool names) are all converted to `ToolResult { success: false }`; no
//! retries happen here (a failed result is reported back to the LLM, which
//! decides whether to try again within the iteration budget).

pub mod asana;
pub mod discord;
pub mod github;
pub mod gmail;
pub(crate) mod google;
pub mod google_calendar;
pub mod jira;
pub mod linear;
pub mod notion;
pub mod slack;
pub mod telegram;
pub mod todoist;
pub mod trello;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{CredentialField, ToolResult, ToolSpec};
use crate::vault::Credentials;

// ---------------------------------------------------------------------------
// ServicePlugin trait
// ---------------------------------------------------------------------------

/// The capability unit: one third-party integration.
///
/// Exactly one instance per integration exists for the process lifetime;
/// instances are immutable after construction and registered once. The
/// `execute` dispatch must recognize every name in its own `tools` list and
/// return a definite success/failure result for each.
#[async_trait]
pub trait ServicePlugin: Send + Sync {
    /// Unique service key, e.g. `"github"`.
    fn name(&self) -> &str;

    /// Human-readable service name for catalogs and connect forms.
    fn display_name(&self) -> &str;

    /// One-line description of what connecting this service enables.
    fn description(&self) -> &str;

    /// Inputs the user must supply to connect, in form order.
    fn credential_fields(&self) -> &[CredentialField];

    /// Tools this plugin exposes, in declared order.
    fn tools(&self) -> &[ToolSpec];

    /// Execute one tool against the remote API.
    ///
    /// `credentials` is the transient decrypted map for this user; it is
    /// discarded after the call returns. Unknown tool names return
    /// `ToolResult::unknown_tool`.
    async fn execute(&self, tool: &str, params: &Value, credentials: &Credentials) -> ToolResult;
}

/// Construct the full built-in plugin set over one shared HTTP client.
///
/// The client is built once at startup and injected; plugins never
/// construct their own.
pub fn all_plugins(client: reqwest::Client) -> Vec<Arc<dyn ServicePlugin>> {
    vec![
        Arc::new(github::GithubPlugin::new(client.clone())),
        Arc::new(linear::LinearPlugin::new(client.clone())),
        Arc::new(jira::JiraPlugin::new(client.clone())),
        Arc::new(slack::SlackPlugin::new(client.clone())),
        Arc::new(discord::DiscordPlugin::new(client.clone())),
        Arc::new(gmail::GmailPlugin::new(client.clone())),
        Arc::new(google_calendar::GoogleCalendarPlugin::new(client.clone())),
        Arc::new(notion::NotionPlugin::new(client.clone())),
        Arc::new(todoist::TodoistPlugin::new(client.clone())),
        Arc::new(trello::TrelloPlugin::new(client.clone())),
        Arc::new(asana::AsanaPlugin::new(client.clone())),
        Arc::new(telegram::TelegramPlugin::new(client)),
    ]
}

// ---------------------------------------------------------------------------
// Shared parameter and response helpers
// ---------------------------------------------------------------------------

/// Look up a required string parameter, with a message suitable for a
/// failed `ToolResult`.
pub(crate) fn require_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, String> {
    match params.get(key).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(format!("missing required parameter '{key}'")),
    }
}

/// Look up an optional string parameter.
pub(crate) fn opt_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Look up an optional integer parameter.
pub(crate) fn opt_i64(params: &Value, key: &str) -> Option<i64> {
    params.get(key).and_then(Value::as_i64)
}

/// Drain a response into `(status, parsed body)`.
///
/// A body that fails to parse as JSON is kept as a string value so error
/// mapping can still quote it.
pub(crate) async fn read_json(response: reqwest::Response) -> (reqwest::StatusCode, Value) {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
    (status, body)
}

/// Extract a provider error message from a JSON error body, trying the
/// field names the integrated APIs actually use.
pub(crate) fn provider_error_message(body: &Value) -> String {
    for path in [
        &["message"][..],
        &["error", "message"][..],
        &["error"][..],
        &["errorMessages", "0"][..],
        &["description"][..],
    ] {
        let mut cursor = body;
        let mut found = true;
        for segment in path {
            cursor = match segment.parse::<usize>() {
                Ok(idx) => match cursor.get(idx) {
                    Some(v) => v,
                    None => {
                        found = false;
                        break;
                    }
                },
                Err(_) => match cursor.get(segment) {
                    Some(v) => v,
                    None => {
                        found = false;
                        break;
                    }
                },
            };
        }
        if found {
            if let Some(s) = cursor.as_str() {
                if !s.is_empty() {
                    return s.to_string();
                }
            }
        }
    }
    // Fall back to the raw body, truncated.
    let raw = body.to_string();
    raw.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_require_str() {
        let params = json!({ "title": "Fix login bug", "body": "" });
        assert_eq!(require_str(&params, "title").unwrap(), "Fix login bug");
        assert!(require_str(&params, "body").is_err());
        assert!(require_str(&params, "missing").is_err());
    }

    #[test]
    fn test_provider_error_message_common_shapes() {
        assert_eq!(
            provider_error_message(&json!({ "message": "Bad credentials" })),
            "Bad credentials"
        );
        assert_eq!(
            provider_error_message(&json!({ "error": { "message": "invalid_auth" } })),
            "invalid_auth"
        );
        assert_eq!(
            provider_error_message(&json!({ "error": "channel_not_found" })),
            "channel_not_found"
        );
        assert_eq!(
            provider_error_message(&json!({ "errorMessages": ["project is required"] })),
            "project is required"
        );
    }
}
