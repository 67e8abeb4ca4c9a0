//! Error types for the taskpilot core.
//!
//! One enum per subsystem. Configuration problems are fatal and detected at
//! startup or first use; everything a user can trigger maps to a specific,
//! actionable message. Plugin execution failures never appear here; they are
//! contained inside `ToolResult` and never cross the `execute` boundary as
//! errors.

use thiserror::Error;

/// Fatal configuration errors, detected at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The encryption key environment variable is not set.
    #[error("encryption key is not configured: set {var} to a 64-character hex string")]
    MissingEncryptionKey { var: &'static str },

    /// The encryption key is present but not a valid 256-bit hex string.
    #[error("encryption key is malformed: expected 64 hex characters, got {detail}")]
    InvalidEncryptionKey { detail: String },

    /// The LLM provider API key is not set.
    #[error("LLM provider API key is not configured: set {var}")]
    MissingProviderKey { var: &'static str },
}

/// Errors from the credential vault.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Key material could not be parsed. Configuration error, not runtime.
    #[error("invalid vault key: {0}")]
    InvalidKey(String),

    /// Encryption failed. Only reachable through cipher-internal faults.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Tag verification, key mismatch, or plaintext structure mismatch.
    /// Deliberately carries no detail that could leak key or plaintext bytes.
    #[error("credential decryption failed: the record is corrupt or was encrypted with a different key")]
    DecryptionFailed,
}

/// Errors raised while populating the service registry.
///
/// All variants are startup-fatal: callers propagate them out of process
/// initialization rather than recovering.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two plugins were registered under the same service name.
    #[error("duplicate plugin registration: service '{name}' is already registered")]
    DuplicatePlugin { name: String },

    /// Two plugins declared a tool with the same name.
    #[error("duplicate tool name '{tool}': declared by both '{existing}' and '{incoming}'")]
    DuplicateTool {
        tool: String,
        existing: String,
        incoming: String,
    },
}

/// Errors from the credential store adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store rejected or failed the operation.
    #[error("credential store operation failed: {0}")]
    Backend(String),
}

/// Errors from the LLM provider boundary.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Transport-level failure talking to the provider.
    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider returned a non-success status.
    #[error("LLM provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    /// The provider response did not have the expected shape.
    #[error("malformed LLM response: {0}")]
    MalformedResponse(String),

    /// The provider did not answer within the configured deadline.
    #[error("LLM call timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

/// Errors that abort an orchestrator turn.
///
/// Tool-side failures never appear here; they are fed back to the model as
/// failed tool results. Only the LLM round-trip and the credential store can
/// abort a turn.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from the action-approval gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The action type has no entry in the static action table.
    #[error("unknown action type '{action}'")]
    UnknownAction { action: String },

    /// The mapped service is not present in the registry.
    #[error("service '{service}' is not available in this deployment")]
    ServiceUnavailable { service: String },

    /// The user has never connected the service this action requires.
    #[error("{service} is not connected — connect it in Settings to run this action")]
    NotConnected { service: String },

    /// The stored credential exists but cannot be decrypted.
    #[error("authentication for {service} failed — disconnect and reconnect it in Settings")]
    ReconnectRequired { service: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}
