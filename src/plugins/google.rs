//! Shared Google OAuth token handling for the Gmail and Calendar plugins.
//!
//! When a refresh token and client credentials are stored, a fresh access
//! token is exchanged before every call; token refresh is cheap and always
//! safe to attempt, and a possibly-expired cached access token is never
//! trusted. Without refresh configuration the stored access token is used
//! as-is. A refresh that fails while refresh *is* configured surfaces a
//! distinct reconnect failure instead of silently falling back to a stale
//! token.

use serde_json::Value;

use super::read_json;
use crate::vault::Credentials;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Why an access token could not be produced.
#[derive(Debug)]
pub(crate) enum TokenError {
    /// A credential field needed for any call at all is missing.
    Missing(String),
    /// Refresh was configured but the exchange failed; the user must
    /// reconnect the service.
    RefreshFailed(String),
}

impl TokenError {
    pub(crate) fn into_message(self, service: &str) -> String {
        match self {
            TokenError::Missing(field) => {
                format!("missing required credential field '{field}'")
            }
            TokenError::RefreshFailed(detail) => format!(
                "{service} token refresh failed ({detail}) — disconnect and reconnect the \
                 service to re-authorize"
            ),
        }
    }
}

/// Produce a usable access token for one API call.
pub(crate) async fn resolve_access_token(
    client: &reqwest::Client,
    credentials: &Credentials,
) -> Result<String, TokenError> {
    resolve_with_token_url(client, credentials, TOKEN_URL).await
}

async fn resolve_with_token_url(
    client: &reqwest::Client,
    credentials: &Credentials,
    token_url: &str,
) -> Result<String, TokenError> {
    let refresh_token = credentials.get("refresh_token").filter(|v| !v.is_empty());
    let client_id = credentials.get("client_id").filter(|v| !v.is_empty());
    let client_secret = credentials.get("client_secret").filter(|v| !v.is_empty());

    if let (Some(refresh_token), Some(client_id), Some(client_secret)) =
        (refresh_token, client_id, client_secret)
    {
        return refresh(client, token_url, refresh_token, client_id, client_secret).await;
    }

    // No refresh configuration: fall back to the stored access token.
    credentials
        .require("access_token")
        .map(str::to_string)
        .map_err(|_| TokenError::Missing("access_token".to_string()))
}

async fn refresh(
    client: &reqwest::Client,
    token_url: &str,
    refresh_token: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<String, TokenError> {
    let response = client
        .post(token_url)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ])
        .send()
        .await
        .map_err(|e| TokenError::RefreshFailed(e.to_string()))?;

    let (status, payload) = read_json(response).await;
    if !status.is_success() {
        let detail = payload
            .get("error_description")
            .or_else(|| payload.get("error"))
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(TokenError::RefreshFailed(detail.to_string()));
    }

    payload["access_token"]
        .as_str()
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| TokenError::RefreshFailed("no access_token in response".to_string()))
}

/// Credential fields shared by the Google plugins.
pub(crate) fn oauth_credential_fields() -> Vec<crate::tools::CredentialField> {
    use crate::tools::CredentialField;
    vec![
        CredentialField::oauth("access_token", "Access Token"),
        CredentialField::oauth("refresh_token", "Refresh Token").optional(),
        CredentialField::text("client_id", "OAuth Client ID").optional(),
        CredentialField::secret("client_secret", "OAuth Client Secret").optional(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    // Nothing listens on the discard port, so the exchange always fails
    // with a connection error.
    const UNREACHABLE_TOKEN_URL: &str = "http://127.0.0.1:9/token";

    fn credentials(fields: &[(&str, &str)]) -> Credentials {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_failed_refresh_never_falls_back_to_stored_token() {
        // Refresh is fully configured, so the stored access token must not
        // be trusted when the exchange fails.
        let creds = credentials(&[
            ("access_token", "stale_token"),
            ("refresh_token", "rt_1"),
            ("client_id", "cid"),
            ("client_secret", "secret"),
        ]);
        let err =
            resolve_with_token_url(&reqwest::Client::new(), &creds, UNREACHABLE_TOKEN_URL)
                .await
                .unwrap_err();
        assert!(matches!(err, TokenError::RefreshFailed(_)));
        let message = err.into_message("Google Calendar");
        assert!(message.contains("Google Calendar token refresh failed"));
        assert!(message.contains("reconnect"));
    }

    #[tokio::test]
    async fn test_without_refresh_config_uses_stored_token() {
        let creds = credentials(&[("access_token", "stored_token")]);
        let token =
            resolve_with_token_url(&reqwest::Client::new(), &creds, UNREACHABLE_TOKEN_URL)
                .await
                .unwrap();
        assert_eq!(token, "stored_token");
    }

    #[tokio::test]
    async fn test_partial_refresh_config_still_uses_stored_token() {
        // A refresh token without client credentials cannot be exchanged;
        // the stored access token remains the only usable material.
        let creds = credentials(&[
            ("access_token", "stored_token"),
            ("refresh_token", "rt_1"),
        ]);
        let token =
            resolve_with_token_url(&reqwest::Client::new(), &creds, UNREACHABLE_TOKEN_URL)
                .await
                .unwrap();
        assert_eq!(token, "stored_token");
    }

    #[tokio::test]
    async fn test_no_tokens_at_all_reports_missing_field() {
        let err = resolve_access_token(&reqwest::Client::new(), &Credentials::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::Missing(_)));
        assert!(err.into_message("Gmail").contains("access_token"));
    }
}
