//! Tool and credential-field definitions.
//!
//! Provides the static, immutable descriptions a plugin publishes about
//! itself: the credential fields a user must supply to connect, the typed
//! tool specifications the LLM chooses from, and the normalized result type
//! every execution returns.

pub mod result;
pub mod schema;

pub use result::ToolResult;
pub use schema::{FieldKind, FieldSpec, InputSchema, ToolSpec};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CredentialField
// ---------------------------------------------------------------------------

/// How a credential field is captured and rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    /// Plain text, shown as typed (domains, workspace names, chat ids).
    Text,
    /// Secret material, masked in the UI (tokens, API keys).
    Secret,
    /// A value obtained through an OAuth flow rather than typed by hand.
    OAuth,
}

/// One input a user must supply to connect a service.
///
/// Defined statically per plugin and immutable for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialField {
    /// Internal identifier, used as the key in the stored credential map.
    pub key: String,
    /// Human-readable label for the connect form.
    pub label: String,
    /// How the field is captured.
    pub kind: CredentialKind,
    /// Whether the field must be present to connect.
    pub required: bool,
    /// Optional link to the provider's token/setup documentation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_url: Option<String>,
    /// Optional placeholder text for the connect form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

impl CredentialField {
    /// A required masked secret field.
    pub fn secret(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            kind: CredentialKind::Secret,
            required: true,
            help_url: None,
            placeholder: None,
        }
    }

    /// A required plain-text field.
    pub fn text(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            kind: CredentialKind::Text,
            ..Self::secret(key, label)
        }
    }

    /// A field populated by an OAuth flow.
    pub fn oauth(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            kind: CredentialKind::OAuth,
            ..Self::secret(key, label)
        }
    }

    /// Builder method to mark the field optional.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Builder method to attach a help link.
    pub fn with_help_url(mut self, url: impl Into<String>) -> Self {
        self.help_url = Some(url.into());
        self
    }

    /// Builder method to attach a placeholder.
    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_field_builders() {
        let field = CredentialField::secret("api_token", "API Token")
            .with_help_url("https://example.com/tokens")
            .with_placeholder("tok_...");
        assert_eq!(field.key, "api_token");
        assert_eq!(field.kind, CredentialKind::Secret);
        assert!(field.required);
        assert_eq!(field.help_url.as_deref(), Some("https://example.com/tokens"));

        let optional = CredentialField::text("domain", "Workspace Domain").optional();
        assert_eq!(optional.kind, CredentialKind::Text);
        assert!(!optional.required);
    }
}
