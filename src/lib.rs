//! # taskpilot
//!
//! Service-integration core for a personal productivity assistant: a
//! credential vault, a catalog of service plugins (issue trackers, chat,
//! email, calendars, task managers), and two execution paths over them.
//!
//! The conversational path is [`agent::AgentOrchestrator`], a bounded
//! tool-use loop that lets an LLM choose and invoke tools for the user's
//! connected services. The non-agentic path is [`gateway::ActionGateway`],
//! which executes one pre-approved action as a single dispatch. Both share
//! the same credential-decrypt-and-delegate step over the
//! [`registry::ServiceRegistry`] and a [`store::CredentialStore`].

pub mod agent;
pub mod config;
pub mod error;
pub mod gateway;
pub mod llm;
pub mod plugins;
pub mod registry;
pub mod store;
pub mod tools;
pub mod vault;

pub use agent::{AgentOrchestrator, AgentReply, AgentRequest, CapturedItem};
pub use config::Config;
pub use error::{
    AgentError, ConfigError, GatewayError, LlmError, RegistryError, StoreError, VaultError,
};
pub use gateway::ActionGateway;
pub use llm::{AnthropicProvider, ChatMessage, LlmProvider, LlmResponse};
pub use plugins::{all_plugins, ServicePlugin};
pub use registry::{default_registry, ServiceRegistry};
pub use store::{ConnectionManager, CredentialStore, MemoryCredentialStore};
pub use tools::{CredentialField, InputSchema, ToolResult, ToolSpec};
pub use vault::{Credentials, EncryptedCredential, Vault, VaultKey};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
