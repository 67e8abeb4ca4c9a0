//! Action-approval gateway: the non-agentic one-shot executor.
//!
//! The propose-then-approve UI flow lands here after the user confirms an
//! extracted action. A static table maps the flat action-type string to the
//! (service, tool) pair; the gateway then resolves the credential and
//! delegates to the owning plugin exactly like the orchestrator's tool
//! step. No LLM round-trip happens on this path.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde_json::Value;

use crate::config::Config;
use crate::error::GatewayError;
use crate::registry::ServiceRegistry;
use crate::store::CredentialStore;
use crate::tools::ToolResult;
use crate::vault::Vault;

/// Action type → (service, tool). Fixed at compile time; an action type
/// absent here is rejected before any store or network access.
static ACTION_TABLE: Lazy<HashMap<&'static str, (&'static str, &'static str)>> = Lazy::new(|| {
    HashMap::from([
        ("create_github_issue", ("github", "github_create_issue")),
        ("create_linear_issue", ("linear", "linear_create_issue")),
        ("create_jira_issue", ("jira", "jira_create_issue")),
        ("draft_gmail_reply", ("gmail", "gmail_create_draft")),
        (
            "create_calendar_event",
            ("google_calendar", "google_calendar_create_event"),
        ),
        ("send_slack_message", ("slack", "slack_send_message")),
        ("create_notion_page", ("notion", "notion_create_page")),
        ("create_todoist_task", ("todoist", "todoist_create_task")),
        ("create_trello_card", ("trello", "trello_create_card")),
        ("create_asana_task", ("asana", "asana_create_task")),
    ])
});

/// One-shot executor for a pre-approved action.
pub struct ActionGateway {
    registry: Arc<ServiceRegistry>,
    store: Arc<dyn CredentialStore>,
    vault: Vault,
    config: Config,
}

impl ActionGateway {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        store: Arc<dyn CredentialStore>,
        vault: Vault,
        config: Config,
    ) -> Self {
        Self {
            registry,
            store,
            vault,
            config,
        }
    }

    /// Action types the table knows, for surfacing in UIs.
    pub fn known_actions() -> Vec<&'static str> {
        let mut actions: Vec<&'static str> = ACTION_TABLE.keys().copied().collect();
        actions.sort_unstable();
        actions
    }

    /// Execute one approved action for `user_id`.
    ///
    /// The returned `ToolResult` may still carry `success: false` for
    /// remote-side failures; `GatewayError` covers everything that stops
    /// the action before the plugin runs.
    pub async fn execute(
        &self,
        user_id: &str,
        action_type: &str,
        payload: &Value,
    ) -> Result<ToolResult, GatewayError> {
        let Some(&(service, tool)) = ACTION_TABLE.get(action_type) else {
            return Err(GatewayError::UnknownAction {
                action: action_type.to_string(),
            });
        };

        let plugin =
            self.registry
                .get(service)
                .ok_or_else(|| GatewayError::ServiceUnavailable {
                    service: service.to_string(),
                })?;

        let stored = self
            .store
            .get(user_id, service)
            .await?
            .ok_or_else(|| GatewayError::NotConnected {
                service: plugin.display_name().to_string(),
            })?;

        let credentials =
            self.vault
                .decrypt(&stored.record)
                .map_err(|_| GatewayError::ReconnectRequired {
                    service: plugin.display_name().to_string(),
                })?;

        log::info!("executing approved action '{action_type}' via {service}/{tool}");

        match tokio::time::timeout(
            self.config.tool_timeout,
            plugin.execute(tool, payload, &credentials),
        )
        .await
        {
            Ok(result) => Ok(result),
            Err(_) => Ok(ToolResult::fail(format!(
                "{tool} timed out after {}s",
                self.config.tool_timeout.as_secs()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::default_registry;
    use crate::store::{MemoryCredentialStore, StoredCredential};
    use crate::vault::{Credentials, VaultKey};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn gateway(store: Arc<MemoryCredentialStore>) -> ActionGateway {
        let registry = Arc::new(default_registry(reqwest::Client::new()).unwrap());
        let vault = Vault::new(VaultKey::from_bytes([7u8; 32]));
        let config = Config::new(VaultKey::from_bytes([7u8; 32]));
        ActionGateway::new(registry, store, vault, config)
    }

    #[tokio::test]
    async fn test_unknown_action_is_rejected() {
        let gateway = gateway(Arc::new(MemoryCredentialStore::new()));
        let err = gateway
            .execute("u1", "launch_rocket", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnknownAction { .. }));
    }

    #[tokio::test]
    async fn test_not_connected_fails_before_any_network_call() {
        // Linear never connected: the error must surface without the
        // plugin running (no credential exists to authenticate with).
        let gateway = gateway(Arc::new(MemoryCredentialStore::new()));
        let err = gateway
            .execute(
                "u1",
                "create_linear_issue",
                &json!({ "team_id": "T1", "title": "bug" }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotConnected { .. }));
        assert!(err.to_string().contains("connect it in Settings"));
    }

    #[tokio::test]
    async fn test_undecryptable_credential_asks_for_reconnect() {
        let store = Arc::new(MemoryCredentialStore::new());
        let other_vault = Vault::new(VaultKey::from_bytes([8u8; 32]));
        let record = other_vault.encrypt(&Credentials::default()).unwrap();
        store
            .upsert(
                "u1",
                "slack",
                StoredCredential {
                    record,
                    metadata: BTreeMap::new(),
                    connected_at: chrono::Utc::now(),
                },
            )
            .await
            .unwrap();

        let gateway = gateway(store);
        let err = gateway
            .execute(
                "u1",
                "send_slack_message",
                &json!({ "channel": "C1", "text": "hi" }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ReconnectRequired { .. }));
        assert!(err.to_string().contains("reconnect"));
    }

    #[test]
    fn test_table_maps_into_registered_tools() {
        let registry = default_registry(reqwest::Client::new()).unwrap();
        for action in ActionGateway::known_actions() {
            let (service, tool) = ACTION_TABLE[action];
            let (plugin, spec) = registry
                .find_tool(tool)
                .unwrap_or_else(|| panic!("action '{action}' maps to unregistered tool"));
            assert_eq!(plugin.name(), service);
            assert_eq!(spec.name, tool);
        }
    }
}
