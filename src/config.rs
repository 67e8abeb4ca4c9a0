//! Process configuration.
//!
//! Everything long-lived and shared is resolved here, once, at startup: the
//! vault key, provider API key, and the loop/timeout tunables. Missing or
//! malformed key material is a fatal `ConfigError`, never a per-call
//! failure.

use std::time::Duration;

use crate::error::ConfigError;
use crate::vault::VaultKey;

/// Environment variable holding the 256-bit hex-encoded vault key.
pub const ENCRYPTION_KEY_VAR: &str = "TASKPILOT_ENCRYPTION_KEY";

/// Environment variable holding the Anthropic API key.
pub const ANTHROPIC_API_KEY_VAR: &str = "ANTHROPIC_API_KEY";

/// Default ceiling on orchestrator dispatch iterations.
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// Default wall-clock budget for one plugin tool call.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default wall-clock budget for one LLM round-trip.
pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(60);

/// Resolved process configuration.
///
/// Constructed once at startup and shared read-only for the life of the
/// process. The iteration ceiling and timeouts are tunable; the defaults
/// match production behavior.
#[derive(Debug, Clone)]
pub struct Config {
    /// Process-wide vault key.
    pub encryption_key: VaultKey,
    /// API key for the LLM provider, if one is configured.
    pub anthropic_api_key: Option<String>,
    /// Maximum dispatch iterations per agent turn.
    pub max_iterations: u32,
    /// Wall-clock budget for one plugin tool call.
    pub tool_timeout: Duration,
    /// Wall-clock budget for one LLM round-trip.
    pub llm_timeout: Duration,
    /// Base system prompt text, supplied by the embedding application.
    pub system_prompt: String,
}

impl Config {
    /// Build a configuration from an already-parsed vault key, with defaults
    /// for everything else. Intended for embedders and tests.
    pub fn new(encryption_key: VaultKey) -> Self {
        Self {
            encryption_key,
            anthropic_api_key: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            llm_timeout: DEFAULT_LLM_TIMEOUT,
            system_prompt: String::new(),
        }
    }

    /// Resolve configuration from the environment.
    ///
    /// Fails fast when the vault key is absent or malformed. The provider
    /// key is optional at this point; constructing a real provider without
    /// it fails there instead.
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw_key = std::env::var(ENCRYPTION_KEY_VAR).map_err(|_| {
            ConfigError::MissingEncryptionKey {
                var: ENCRYPTION_KEY_VAR,
            }
        })?;
        let encryption_key =
            VaultKey::from_hex(&raw_key).map_err(|e| ConfigError::InvalidEncryptionKey {
                detail: e.to_string(),
            })?;

        Ok(Self {
            anthropic_api_key: std::env::var(ANTHROPIC_API_KEY_VAR).ok(),
            ..Self::new(encryption_key)
        })
    }

    /// Builder method to set the base system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Builder method to set the iteration ceiling.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Builder method to set the per-tool-call timeout.
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Builder method to set the per-LLM-call timeout.
    pub fn with_llm_timeout(mut self, timeout: Duration) -> Self {
        self.llm_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> VaultKey {
        VaultKey::from_hex(&"ab".repeat(32)).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::new(test_key());
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.tool_timeout, Duration::from_secs(30));
        assert_eq!(config.llm_timeout, Duration::from_secs(60));
        assert!(config.anthropic_api_key.is_none());
    }

    #[test]
    fn test_builder_overrides() {
        let config = Config::new(test_key())
            .with_max_iterations(3)
            .with_tool_timeout(Duration::from_secs(5))
            .with_system_prompt("You are a helpful assistant.");
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.tool_timeout, Duration::from_secs(5));
        assert_eq!(config.system_prompt, "You are a helpful assistant.");
    }
}
