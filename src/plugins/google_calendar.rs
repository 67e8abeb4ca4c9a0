//! Google Calendar integration.
//!
//! OAuth bearer auth against the Calendar v3 API, with the same proactive
//! token refresh as the Gmail plugin. Operates on the user's primary
//! calendar.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::google::{oauth_credential_fields, resolve_access_token};
use super::{opt_i64, opt_str, provider_error_message, read_json, require_str, ServicePlugin};
use crate::tools::{CredentialField, FieldKind, InputSchema, ToolResult, ToolSpec};
use crate::vault::Credentials;

const API_BASE: &str = "https://www.googleapis.com/calendar/v3/calendars/primary";

pub struct GoogleCalendarPlugin {
    client: Client,
    credential_fields: Vec<CredentialField>,
    tools: Vec<ToolSpec>,
}

impl GoogleCalendarPlugin {
    pub fn new(client: Client) -> Self {
        let tools = vec![
            ToolSpec::new(
                "google_calendar_create_event",
                "Create an event on the user's primary calendar. Times must be RFC 3339 with \
                 an offset, e.g. 2026-08-24T15:00:00+02:00.",
                InputSchema::new()
                    .field("summary", FieldKind::String, "Event title")
                    .field("start", FieldKind::String, "Start time, RFC 3339")
                    .field("end", FieldKind::String, "End time, RFC 3339")
                    .optional_field("description", FieldKind::String, "Event description")
                    .optional_field(
                        "attendees",
                        FieldKind::StringArray,
                        "Attendee email addresses",
                    ),
            ),
            ToolSpec::new(
                "google_calendar_list_events",
                "List upcoming events on the primary calendar. Use before scheduling to \
                 avoid conflicts.",
                InputSchema::new().optional_field(
                    "max_results",
                    FieldKind::Number,
                    "How many events to list (default 10)",
                ),
            ),
        ];

        Self {
            client,
            credential_fields: oauth_credential_fields(),
            tools,
        }
    }

    async fn create_event(&self, params: &Value, token: &str) -> ToolResult {
        let summary = match require_str(params, "summary") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };
        let start = match require_str(params, "start") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };
        let end = match require_str(params, "end") {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e),
        };

        let mut event = json!({
            "summary": summary,
            "start": { "dateTime": start },
            "end": { "dateTime": end },
        });
        if let Some(description) = opt_str(params, "description") {
            event["description"] = json!(description);
        }
        if let Some(attendees) = params.get("attendees").and_then(Value::as_array) {
            let list: Vec<Value> = attendees
                .iter()
                .filter_map(Value::as_str)
                .map(|email| json!({ "email": email }))
                .collect();
            if !list.is_empty() {
                event["attendees"] = json!(list);
            }
        }

        let url = format!("{API_BASE}/events");
        let response = match self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&event)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::fail(format!("Google Calendar request failed: {e}")),
        };

        let (status, payload) = read_json(response).await;
        if !status.is_success() {
            return ToolResult::fail(format!(
                "Google Calendar returned {status}: {}",
                provider_error_message(&payload)
            ));
        }

        let link = payload["htmlLink"].as_str().unwrap_or_default();
        let event_id = payload["id"].as_str().unwrap_or_default();
        ToolResult::ok_with_message(
            json!({ "event_id": event_id, "link": link }),
            format!("Event \"{summary}\" created: {link}"),
        )
    }

    async fn list_events(&self, params: &Value, token: &str) -> ToolResult {
        let max_results = opt_i64(params, "max_results").unwrap_or(10).clamp(1, 50);
        let now = chrono::Utc::now().to_rfc3339();

        let url = format!("{API_BASE}/events");
        let response = match self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[
                ("timeMin", now.as_str()),
                ("maxResults", &max_results.to_string()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
            ])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::fail(format!("Google Calendar request failed: {e}")),
        };

        let (status, payload) = read_json(response).await;
        if !status.is_success() {
            return ToolResult::fail(format!(
                "Google Calendar returned {status}: {}",
                provider_error_message(&payload)
            ));
        }

        let events: Vec<Value> = payload["items"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .map(|e| {
                        json!({
                            "summary": e["summary"],
                            "start": e["start"]["dateTime"],
                            "end": e["end"]["dateTime"],
                            "link": e["htmlLink"],
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let count = events.len();
        ToolResult::ok_with_message(
            json!({ "events": events }),
            format!("Found {count} upcoming events"),
        )
    }
}

#[async_trait]
impl ServicePlugin for GoogleCalendarPlugin {
    fn name(&self) -> &str {
        "google_calendar"
    }

    fn display_name(&self) -> &str {
        "Google Calendar"
    }

    fn description(&self) -> &str {
        "Create events and check your schedule on Google Calendar"
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
            Err(e) => return ToolResult::fail(e.into_message("Google Calendar")),
        };

        match tool {
            "google_calendar_create_event" => self.create_event(params, &token).await,
            "google_calendar_list_events" => self.list_events(params, &token).await,
            other => ToolResult::unknown_tool(other),
        }
    }
}
