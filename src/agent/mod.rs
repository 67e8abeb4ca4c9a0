//! Agent orchestrator: the bounded conversational tool-use loop.
//!
//! One orchestrator run serves one user request. It assembles the tool
//! catalog from the user's connected services, round-trips with the LLM up
//! to a fixed iteration ceiling, routes tool-invocation requests through
//! credential decryption to the owning plugin, and feeds results back in
//! request order. Tool-side failures never abort the turn; they are
//! synthesized into failed results the model can react to. Hitting the
//! ceiling terminates with whatever reply text has accumulated; that is a
//! degraded-but-safe outcome, not an error.

pub mod extraction;

pub use extraction::{strip_capture_block, CapturedItem};

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde_json::{json, Value};

use crate::config::Config;
use crate::error::{AgentError, LlmError};
use crate::llm::{ChatMessage, LlmProvider, ToolCallRequest};
use crate::registry::ServiceRegistry;
use crate::store::CredentialStore;
use crate::tools::{FieldKind, InputSchema, ToolResult, ToolSpec};
use crate::vault::Vault;

/// Reserved meta-tool: answered from the service catalog without touching
/// any plugin or credential.
pub const META_TOOL_NAME: &str = "list_available_integrations";

// ---------------------------------------------------------------------------
// Request / reply types
// ---------------------------------------------------------------------------

/// One inbound user request.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub user_id: String,
    pub message: String,
    /// IANA timezone name used to annotate the message, if known.
    pub timezone: Option<String>,
    /// Prior turns of this conversation, oldest first.
    pub history: Vec<ChatMessage>,
}

impl AgentRequest {
    pub fn new(user_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            message: message.into(),
            timezone: None,
            history: Vec::new(),
        }
    }
}

/// Human-readable record of one tool execution within a turn.
#[derive(Debug, Clone)]
pub struct ToolLogEntry {
    pub tool: String,
    pub success: bool,
    /// Display message on success, error description on failure.
    pub message: String,
}

/// The orchestrator's answer to one request.
#[derive(Debug, Clone)]
pub struct AgentReply {
    /// Final reply text, with any capture block stripped.
    pub text: String,
    /// Action item captured from the final text, if any.
    pub captured: Option<CapturedItem>,
    /// Accumulated tool executions, in execution order.
    pub tool_log: Vec<ToolLogEntry>,
}

/// Catalog snapshot computed at init and reused by the meta-tool.
struct ServiceCatalog {
    connected: Vec<String>,
    available: Vec<Value>,
}

// ---------------------------------------------------------------------------
// AgentOrchestrator
// ---------------------------------------------------------------------------

/// Runs the bounded tool-use loop. All collaborators are injected at
/// construction; the orchestrator itself is stateless across requests.
pub struct AgentOrchestrator {
    registry: Arc<ServiceRegistry>,
    store: Arc<dyn CredentialStore>,
    llm: Arc<dyn LlmProvider>,
    vault: Vault,
    config: Config,
}

impl AgentOrchestrator {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        store: Arc<dyn CredentialStore>,
        llm: Arc<dyn LlmProvider>,
        vault: Vault,
        config: Config,
    ) -> Self {
        Self {
            registry,
            store,
            llm,
            vault,
            config,
        }
    }

    /// Run one bounded tool-use loop for `request`.
    pub async fn run(&self, request: AgentRequest) -> Result<AgentReply, AgentError> {
        // Init: connected services, tool catalog, system prompt.
        let connected: Vec<String> = self
            .store
            .list_connected(&request.user_id)
            .await?
            .into_iter()
            .map(|c| c.service)
            .collect();

        let catalog = self.registry.tools_for(&connected);
        let mut tool_schemas: Vec<Value> =
            catalog.iter().map(|(_, spec)| spec.to_provider_schema()).collect();
        tool_schemas.push(meta_tool_spec().to_provider_schema());

        let service_catalog = self.build_service_catalog(&connected);
        let system = self.compose_system_prompt(&service_catalog);

        let mut messages = request.history.clone();
        messages.push(ChatMessage::user(annotate_message(
            &request.message,
            request.timezone.as_deref(),
        )));

        // Dispatch loop.
        let mut final_text = String::new();
        let mut tool_log: Vec<ToolLogEntry> = Vec::new();

        for iteration in 0..self.config.max_iterations {
            let response = match tokio::time::timeout(
                self.config.llm_timeout,
                self.llm.complete(&system, &tool_schemas, &messages),
            )
            .await
            {
                Ok(result) => result?,
                Err(_) => {
                    return Err(AgentError::Llm(LlmError::Timeout {
                        seconds: self.config.llm_timeout.as_secs(),
                    }))
                }
            };

            if let Some(text) = &response.text {
                // Later iterations overwrite earlier candidate replies.
                final_text = text.clone();
            }

            if response.tool_calls.is_empty() || response.end_turn {
                break;
            }

            log::debug!(
                "iteration {}: executing {} tool call(s)",
                iteration + 1,
                response.tool_calls.len()
            );

            // Calls within one turn are independent; run them concurrently
            // and reassemble in request order so the model can correlate
            // each result with its originating call.
            let executions = join_all(
                response
                    .tool_calls
                    .iter()
                    .map(|call| self.execute_call(&request.user_id, call, &service_catalog)),
            )
            .await;

            messages.push(ChatMessage::assistant_with_tools(
                response.text.clone().unwrap_or_default(),
                response.tool_calls.clone(),
            ));
            for (call, result) in response.tool_calls.iter().zip(executions) {
                tool_log.push(ToolLogEntry {
                    tool: call.name.clone(),
                    success: result.success,
                    message: result
                        .display_message
                        .clone()
                        .or_else(|| result.error.clone())
                        .unwrap_or_default(),
                });
                messages.push(ChatMessage::tool_result(&call.id, result.to_feedback_json()));
            }
        }

        let (text, captured) = strip_capture_block(&final_text);
        Ok(AgentReply {
            text,
            captured,
            tool_log,
        })
    }

    /// Execute one tool-invocation request, synthesizing failure results
    /// for every condition that must not reach the plugin.
    async fn execute_call(
        &self,
        user_id: &str,
        call: &ToolCallRequest,
        service_catalog: &ServiceCatalog,
    ) -> ToolResult {
        if call.name == META_TOOL_NAME {
            return ToolResult::ok(json!({
                "connected": service_catalog.connected,
                "available": service_catalog.available,
            }));
        }

        let Some((plugin, _)) = self.registry.find_tool(&call.name) else {
            return ToolResult::fail(format!("Unknown tool: {}", call.name));
        };

        let stored = match self.store.get(user_id, plugin.name()).await {
            Ok(row) => row,
            Err(e) => {
                log::warn!("credential lookup failed for '{}': {e}", plugin.name());
                return ToolResult::fail(format!(
                    "{} is temporarily unavailable, try again shortly",
                    plugin.display_name()
                ));
            }
        };
        let Some(stored) = stored else {
            return ToolResult::fail(format!(
                "{} is not connected — connect it in Settings first",
                plugin.display_name()
            ));
        };

        let credentials = match self.vault.decrypt(&stored.record) {
            Ok(c) => c,
            Err(_) => {
                return ToolResult::fail(format!(
                    "Authentication for {} failed — disconnect and reconnect it in Settings",
                    plugin.display_name()
                ));
            }
        };

        match tokio::time::timeout(
            self.config.tool_timeout,
            plugin.execute(&call.name, &call.input, &credentials),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => ToolResult::fail(format!(
                "{} timed out after {}s",
                call.name,
                self.config.tool_timeout.as_secs()
            )),
        }
    }

    fn build_service_catalog(&self, connected: &[String]) -> ServiceCatalog {
        let available = self
            .registry
            .list_all()
            .iter()
            .filter(|p| !connected.contains(&p.name().to_string()))
            .map(|p| {
                json!({
                    "name": p.name(),
                    "display_name": p.display_name(),
                    "description": p.description(),
                })
            })
            .collect();
        ServiceCatalog {
            connected: connected.to_vec(),
            available,
        }
    }

    /// Base prompt plus the connected/available service section. Services
    /// that are not connected must be described, never used.
    fn compose_system_prompt(&self, catalog: &ServiceCatalog) -> String {
        let connected_line = if catalog.connected.is_empty() {
            "none".to_string()
        } else {
            catalog.connected.join(", ")
        };
        let available_names: Vec<String> = catalog
            .available
            .iter()
            .filter_map(|v| v["name"].as_str().map(str::to_string))
            .collect();
        let available_line = if available_names.is_empty() {
            "none".to_string()
        } else {
            available_names.join(", ")
        };

        format!(
            "{}\n\nConnected services you can use via tools: {connected_line}.\n\
             Services that exist but are NOT connected (you may describe them, \
             but must not attempt to use them): {available_line}.",
            self.config.system_prompt
        )
    }
}

/// Specification of the reserved meta-tool.
fn meta_tool_spec() -> ToolSpec {
    ToolSpec::new(
        META_TOOL_NAME,
        "List which integrations are connected and which are available to connect. Use \
         this when the user asks what you can do or which services they can hook up.",
        InputSchema::new().optional_field(
            "filter",
            FieldKind::String,
            "Optional substring to filter service names",
        ),
    )
}

/// Annotate the user's message with the send time so the model can resolve
/// relative dates.
fn annotate_message(message: &str, timezone: Option<&str>) -> String {
    let timestamp = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    match timezone {
        Some(tz) => format!("{message}\n\n(sent {timestamp}, timezone {tz})"),
        None => format!("{message}\n\n(sent {timestamp})"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmResponse;
    use crate::store::{CredentialStore, MemoryCredentialStore, StoredCredential};
    use crate::tools::{CredentialField, ToolResult};
    use crate::vault::{Credentials, Vault, VaultKey};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    // --- Test doubles ---

    /// LLM double that replays a fixed script of responses, then falls
    /// back to a plain text reply.
    struct ScriptedLlm {
        script: Mutex<Vec<LlmResponse>>,
        calls: AtomicUsize,
    }

    impl ScriptedLlm {
        fn new(mut responses: Vec<LlmResponse>) -> Self {
            responses.reverse();
            Self {
                script: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        async fn complete(
            &self,
            _system: &str,
            _tools: &[Value],
            _messages: &[ChatMessage],
        ) -> Result<LlmResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop();
            Ok(next.unwrap_or(LlmResponse {
                text: Some("All done.".to_string()),
                tool_calls: Vec::new(),
                end_turn: true,
            }))
        }
    }

    /// Plugin double that records executions.
    struct RecordingPlugin {
        credential_fields: Vec<CredentialField>,
        tools: Vec<ToolSpec>,
        executions: AtomicUsize,
    }

    impl RecordingPlugin {
        fn new() -> Self {
            Self {
                credential_fields: vec![CredentialField::secret("token", "Token")],
                tools: vec![ToolSpec::new(
                    "recorder_echo",
                    "Echo back the input.",
                    InputSchema::new().optional_field("text", FieldKind::String, "Text to echo"),
                )],
                executions: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl crate::plugins::ServicePlugin for RecordingPlugin {
        fn name(&self) -> &str {
            "recorder"
        }
        fn display_name(&self) -> &str {
            "Recorder"
        }
        fn description(&self) -> &str {
            "test recorder"
        }
        fn credential_fields(&self) -> &[CredentialField] {
            &self.credential_fields
        }
        fn tools(&self) -> &[ToolSpec] {
            &self.tools
        }
        async fn execute(&self, tool: &str, params: &Value, _: &Credentials) -> ToolResult {
            self.executions.fetch_add(1, Ordering::SeqCst);
            match tool {
                "recorder_echo" => ToolResult::ok_with_message(
                    json!({ "echo": params["text"] }),
                    "Echoed the input",
                ),
                other => ToolResult::unknown_tool(other),
            }
        }
    }

    // --- Fixture assembly ---

    fn tool_call(name: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            input: json!({ "text": "hi" }),
        }
    }

    fn call_response(name: &str) -> LlmResponse {
        LlmResponse {
            text: Some(format!("Calling {name}.")),
            tool_calls: vec![tool_call(name)],
            end_turn: false,
        }
    }

    struct Fixture {
        orchestrator: AgentOrchestrator,
        plugin: Arc<RecordingPlugin>,
        llm: Arc<ScriptedLlm>,
        store: Arc<MemoryCredentialStore>,
        vault: Vault,
    }

    fn fixture(responses: Vec<LlmResponse>) -> Fixture {
        let _ = env_logger::builder().is_test(true).try_init();
        let plugin = Arc::new(RecordingPlugin::new());
        let mut registry = ServiceRegistry::new();
        registry.register(plugin.clone()).unwrap();
        let registry = Arc::new(registry);

        let store = Arc::new(MemoryCredentialStore::new());
        let vault = Vault::new(VaultKey::from_bytes([3u8; 32]));
        let llm = Arc::new(ScriptedLlm::new(responses));
        let config = Config::new(VaultKey::from_bytes([3u8; 32]))
            .with_system_prompt("You are a productivity assistant.");

        let orchestrator = AgentOrchestrator::new(
            registry,
            store.clone(),
            llm.clone(),
            vault.clone(),
            config,
        );
        Fixture {
            orchestrator,
            plugin,
            llm,
            store,
            vault,
        }
    }

    async fn connect_recorder(f: &Fixture) {
        let fields: BTreeMap<String, String> =
            [("token".to_string(), "tok_recorder".to_string())].into();
        let credentials = Credentials::new(fields);
        let record = f.vault.encrypt(&credentials).unwrap();
        f.store
            .upsert(
                "u1",
                "recorder",
                StoredCredential {
                    record,
                    metadata: BTreeMap::new(),
                    connected_at: Utc::now(),
                },
            )
            .await
            .unwrap();
    }

    // --- Tests ---

    #[tokio::test]
    async fn test_plain_reply_without_tools() {
        let f = fixture(vec![]);
        let reply = f
            .orchestrator
            .run(AgentRequest::new("u1", "hello"))
            .await
            .unwrap();
        assert_eq!(reply.text, "All done.");
        assert!(reply.tool_log.is_empty());
        assert_eq!(f.llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_connected_tool_call_executes_and_logs() {
        let f = fixture(vec![call_response("recorder_echo")]);
        connect_recorder(&f).await;

        let reply = f
            .orchestrator
            .run(AgentRequest::new("u1", "echo hi"))
            .await
            .unwrap();
        assert_eq!(f.plugin.executions.load(Ordering::SeqCst), 1);
        assert_eq!(reply.tool_log.len(), 1);
        assert!(reply.tool_log[0].success);
        assert_eq!(reply.tool_log[0].message, "Echoed the input");
        assert_eq!(reply.text, "All done.");
    }

    #[tokio::test]
    async fn test_iteration_ceiling_stops_at_five() {
        // A model that always wants another tool call is cut off after
        // exactly max_iterations dispatches, keeping the last text.
        let responses: Vec<LlmResponse> =
            (0..20).map(|_| call_response("recorder_echo")).collect();
        let f = fixture(responses);
        connect_recorder(&f).await;

        let reply = f
            .orchestrator
            .run(AgentRequest::new("u1", "loop forever"))
            .await
            .unwrap();
        assert_eq!(f.llm.call_count(), 5);
        assert_eq!(f.plugin.executions.load(Ordering::SeqCst), 5);
        assert_eq!(reply.text, "Calling recorder_echo.");
    }

    #[tokio::test]
    async fn test_not_connected_never_reaches_plugin() {
        let f = fixture(vec![call_response("recorder_echo")]);
        // No credential stored for "recorder".
        let reply = f
            .orchestrator
            .run(AgentRequest::new("u1", "echo hi"))
            .await
            .unwrap();
        assert_eq!(f.plugin.executions.load(Ordering::SeqCst), 0);
        assert_eq!(reply.tool_log.len(), 1);
        assert!(!reply.tool_log[0].success);
        assert!(reply.tool_log[0].message.contains("not connected"));
    }

    #[tokio::test]
    async fn test_decryption_failure_asks_for_reconnect() {
        let f = fixture(vec![call_response("recorder_echo")]);
        // Store a record sealed under a different key.
        let other_vault = Vault::new(VaultKey::from_bytes([9u8; 32]));
        let record = other_vault.encrypt(&Credentials::default()).unwrap();
        f.store
            .upsert(
                "u1",
                "recorder",
                StoredCredential {
                    record,
                    metadata: BTreeMap::new(),
                    connected_at: Utc::now(),
                },
            )
            .await
            .unwrap();

        let reply = f
            .orchestrator
            .run(AgentRequest::new("u1", "echo hi"))
            .await
            .unwrap();
        assert_eq!(f.plugin.executions.load(Ordering::SeqCst), 0);
        assert!(reply.tool_log[0].message.contains("reconnect"));
    }

    #[tokio::test]
    async fn test_unknown_tool_synthesizes_failure() {
        let f = fixture(vec![call_response("ghost_tool")]);
        let reply = f
            .orchestrator
            .run(AgentRequest::new("u1", "do the thing"))
            .await
            .unwrap();
        assert_eq!(f.plugin.executions.load(Ordering::SeqCst), 0);
        assert!(reply.tool_log[0].message.contains("Unknown tool: ghost_tool"));
    }

    #[tokio::test]
    async fn test_meta_tool_answers_from_catalog_without_plugins() {
        // No connected services: the meta-tool is the only usable tool and
        // answering it must not invoke any plugin.
        let f = fixture(vec![call_response(META_TOOL_NAME)]);
        let reply = f
            .orchestrator
            .run(AgentRequest::new("u1", "what can you do?"))
            .await
            .unwrap();
        assert_eq!(f.plugin.executions.load(Ordering::SeqCst), 0);
        assert!(reply.tool_log[0].success);
        assert_eq!(reply.text, "All done.");
    }

    #[tokio::test]
    async fn test_capture_block_is_stripped_from_reply() {
        let f = fixture(vec![LlmResponse {
            text: Some(
                "Noted!\n\n[[capture]]{\"type\":\"task\",\"title\":\"Buy milk\"}[[/capture]]"
                    .to_string(),
            ),
            tool_calls: Vec::new(),
            end_turn: true,
        }]);
        let reply = f
            .orchestrator
            .run(AgentRequest::new("u1", "remind me to buy milk"))
            .await
            .unwrap();
        assert_eq!(reply.text, "Noted!");
        assert_eq!(reply.captured.unwrap().title, "Buy milk");
    }

    /// Plugin double whose tool never finishes within any sane budget.
    struct GlacialPlugin {
        credential_fields: Vec<CredentialField>,
        tools: Vec<ToolSpec>,
    }

    impl GlacialPlugin {
        fn new() -> Self {
            Self {
                credential_fields: vec![CredentialField::secret("token", "Token")],
                tools: vec![ToolSpec::new(
                    "glacier_wait",
                    "Wait indefinitely.",
                    InputSchema::new(),
                )],
            }
        }
    }

    #[async_trait]
    impl crate::plugins::ServicePlugin for GlacialPlugin {
        fn name(&self) -> &str {
            "glacier"
        }
        fn display_name(&self) -> &str {
            "Glacier"
        }
        fn description(&self) -> &str {
            "test sleeper"
        }
        fn credential_fields(&self) -> &[CredentialField] {
            &self.credential_fields
        }
        fn tools(&self) -> &[ToolSpec] {
            &self.tools
        }
        async fn execute(&self, _: &str, _: &Value, _: &Credentials) -> ToolResult {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            ToolResult::ok(json!({}))
        }
    }

    #[tokio::test]
    async fn test_slow_tool_call_becomes_failed_result() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut registry = ServiceRegistry::new();
        registry.register(Arc::new(GlacialPlugin::new())).unwrap();
        let registry = Arc::new(registry);

        let store = Arc::new(MemoryCredentialStore::new());
        let vault = Vault::new(VaultKey::from_bytes([3u8; 32]));
        let fields: BTreeMap<String, String> =
            [("token".to_string(), "tok_glacier".to_string())].into();
        let record = vault.encrypt(&Credentials::new(fields)).unwrap();
        store
            .upsert(
                "u1",
                "glacier",
                StoredCredential {
                    record,
                    metadata: BTreeMap::new(),
                    connected_at: Utc::now(),
                },
            )
            .await
            .unwrap();

        let llm = Arc::new(ScriptedLlm::new(vec![call_response("glacier_wait")]));
        let config = Config::new(VaultKey::from_bytes([3u8; 32]))
            .with_tool_timeout(std::time::Duration::from_millis(50));
        let orchestrator = AgentOrchestrator::new(registry, store, llm, vault, config);

        let reply = orchestrator
            .run(AgentRequest::new("u1", "wait for the glacier"))
            .await
            .unwrap();
        assert_eq!(reply.tool_log.len(), 1);
        assert!(!reply.tool_log[0].success);
        assert!(reply.tool_log[0].message.contains("timed out"));
        // The turn itself still completes normally.
        assert_eq!(reply.text, "All done.");
    }

    #[tokio::test]
    async fn test_multiple_calls_in_one_turn_keep_order() {
        let response = LlmResponse {
            text: None,
            tool_calls: vec![tool_call("recorder_echo"), tool_call("ghost_tool")],
            end_turn: false,
        };
        let f = fixture(vec![response]);
        connect_recorder(&f).await;

        let reply = f
            .orchestrator
            .run(AgentRequest::new("u1", "two things"))
            .await
            .unwrap();
        assert_eq!(reply.tool_log.len(), 2);
        assert_eq!(reply.tool_log[0].tool, "recorder_echo");
        assert!(reply.tool_log[0].success);
        assert_eq!(reply.tool_log[1].tool, "ghost_tool");
        assert!(!reply.tool_log[1].success);
    }
}
