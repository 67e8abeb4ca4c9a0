//! Credential store adapter and lifecycle management.
//!
//! The core consumes persistence through the `CredentialStore` trait: one
//! encrypted row per (user, service), upsert-overwrites, delete on
//! disconnect. `MemoryCredentialStore` is the in-process implementation
//! used by tests and small embedders; production deployments implement the
//! trait over their own row store.

use std::collections::BTreeMap;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{StoreError, VaultError};
use crate::vault::{Credentials, EncryptedCredential, Vault};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One persisted credential row.
///
/// `metadata` is small clear-text context (connected account username and
/// the like), never secret material.
#[derive(Debug, Clone)]
pub struct StoredCredential {
    pub record: EncryptedCredential,
    pub metadata: BTreeMap<String, String>,
    pub connected_at: DateTime<Utc>,
}

/// Summary row for the connected-services listing.
#[derive(Debug, Clone)]
pub struct ConnectedService {
    pub service: String,
    pub metadata: BTreeMap<String, String>,
    pub connected_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// CredentialStore trait
// ---------------------------------------------------------------------------

/// Persistence contract consumed by the core.
///
/// Implementations provide per-row atomicity for upsert/delete; at most one
/// row exists per (user, service) pair at any time.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fetch the stored credential for (user, service), if any.
    async fn get(&self, user_id: &str, service: &str)
        -> Result<Option<StoredCredential>, StoreError>;

    /// Insert or overwrite the credential row for (user, service).
    async fn upsert(
        &self,
        user_id: &str,
        service: &str,
        credential: StoredCredential,
    ) -> Result<(), StoreError>;

    /// Delete the credential row for (user, service). Deleting an absent
    /// row is not an error.
    async fn delete(&self, user_id: &str, service: &str) -> Result<(), StoreError>;

    /// List the services the user has connected.
    async fn list_connected(&self, user_id: &str) -> Result<Vec<ConnectedService>, StoreError>;
}

// ---------------------------------------------------------------------------
// MemoryCredentialStore
// ---------------------------------------------------------------------------

/// In-process credential store over a `tokio::sync::RwLock` map.
#[derive(Default)]
pub struct MemoryCredentialStore {
    rows: RwLock<HashMap<(String, String), StoredCredential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(
        &self,
        user_id: &str,
        service: &str,
    ) -> Result<Option<StoredCredential>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows.get(&(user_id.to_string(), service.to_string())).cloned())
    }

    async fn upsert(
        &self,
        user_id: &str,
        service: &str,
        credential: StoredCredential,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        rows.insert((user_id.to_string(), service.to_string()), credential);
        Ok(())
    }

    async fn delete(&self, user_id: &str, service: &str) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        rows.remove(&(user_id.to_string(), service.to_string()));
        Ok(())
    }

    async fn list_connected(&self, user_id: &str) -> Result<Vec<ConnectedService>, StoreError> {
        let rows = self.rows.read().await;
        let mut connected: Vec<ConnectedService> = rows
            .iter()
            .filter(|((uid, _), _)| uid == user_id)
            .map(|((_, service), row)| ConnectedService {
                service: service.clone(),
                metadata: row.metadata.clone(),
                connected_at: row.connected_at,
            })
            .collect();
        // Stable listing order for catalogs and prompts.
        connected.sort_by(|a, b| a.service.cmp(&b.service));
        Ok(connected)
    }
}

// ---------------------------------------------------------------------------
// ConnectionManager
// ---------------------------------------------------------------------------

/// Errors from the connect/disconnect lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// A required credential field was not supplied.
    #[error("missing required field '{field}' for {service}")]
    MissingField { service: String, field: String },

    /// The service is not in the registry.
    #[error("unknown service '{service}'")]
    UnknownService { service: String },

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Couples the vault and the store into the credential lifecycle:
/// connect (validate → encrypt → upsert), disconnect (delete), list.
pub struct ConnectionManager<'a> {
    registry: &'a crate::registry::ServiceRegistry,
    store: &'a dyn CredentialStore,
    vault: &'a Vault,
}

impl<'a> ConnectionManager<'a> {
    pub fn new(
        registry: &'a crate::registry::ServiceRegistry,
        store: &'a dyn CredentialStore,
        vault: &'a Vault,
    ) -> Self {
        Self {
            registry,
            store,
            vault,
        }
    }

    /// Connect a service: validate required fields against the plugin's
    /// declaration, encrypt, and upsert. Reconnecting overwrites the
    /// existing row with a freshly-encrypted record.
    pub async fn connect(
        &self,
        user_id: &str,
        service: &str,
        fields: BTreeMap<String, String>,
        metadata: BTreeMap<String, String>,
    ) -> Result<(), ConnectError> {
        let plugin = self
            .registry
            .get(service)
            .ok_or_else(|| ConnectError::UnknownService {
                service: service.to_string(),
            })?;

        for field in plugin.credential_fields() {
            if field.required && fields.get(&field.key).map_or(true, String::is_empty) {
                return Err(ConnectError::MissingField {
                    service: service.to_string(),
                    field: field.key.clone(),
                });
            }
        }

        let credentials = Credentials::new(fields);
        let record = self.vault.encrypt(&credentials)?;
        self.store
            .upsert(
                user_id,
                service,
                StoredCredential {
                    record,
                    metadata,
                    connected_at: Utc::now(),
                },
            )
            .await?;
        log::info!("service '{service}' connected for user {user_id}");
        Ok(())
    }

    /// Disconnect a service, deleting its stored credential.
    pub async fn disconnect(&self, user_id: &str, service: &str) -> Result<(), ConnectError> {
        self.store.delete(user_id, service).await?;
        log::info!("service '{service}' disconnected for user {user_id}");
        Ok(())
    }

    /// Names of the services the user has connected.
    pub async fn connected_services(&self, user_id: &str) -> Result<Vec<String>, ConnectError> {
        Ok(self
            .store
            .list_connected(user_id)
            .await?
            .into_iter()
            .map(|c| c.service)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::default_registry;
    use crate::vault::VaultKey;

    fn vault() -> Vault {
        Vault::new(VaultKey::from_bytes([1u8; 32]))
    }

    fn github_fields() -> BTreeMap<String, String> {
        [("token".to_string(), "ghp_test".to_string())].into()
    }

    #[tokio::test]
    async fn test_connect_roundtrips_through_store() {
        let registry = default_registry(reqwest::Client::new()).unwrap();
        let store = MemoryCredentialStore::new();
        let vault = vault();
        let manager = ConnectionManager::new(&registry, &store, &vault);

        manager
            .connect("u1", "github", github_fields(), BTreeMap::new())
            .await
            .unwrap();

        let row = store.get("u1", "github").await.unwrap().unwrap();
        let decrypted = vault.decrypt(&row.record).unwrap();
        assert_eq!(decrypted.get("token"), Some("ghp_test"));

        assert_eq!(
            manager.connected_services("u1").await.unwrap(),
            vec!["github".to_string()]
        );
    }

    #[tokio::test]
    async fn test_connect_rejects_missing_required_field() {
        let registry = default_registry(reqwest::Client::new()).unwrap();
        let store = MemoryCredentialStore::new();
        let vault = vault();
        let manager = ConnectionManager::new(&registry, &store, &vault);

        let err = manager
            .connect("u1", "jira", github_fields(), BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::MissingField { .. }));
        assert!(store.get("u1", "jira").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reconnect_overwrites_single_row() {
        let registry = default_registry(reqwest::Client::new()).unwrap();
        let store = MemoryCredentialStore::new();
        let vault = vault();
        let manager = ConnectionManager::new(&registry, &store, &vault);

        manager
            .connect("u1", "github", github_fields(), BTreeMap::new())
            .await
            .unwrap();
        let first = store.get("u1", "github").await.unwrap().unwrap();

        let updated: BTreeMap<String, String> =
            [("token".to_string(), "ghp_rotated".to_string())].into();
        manager
            .connect("u1", "github", updated, BTreeMap::new())
            .await
            .unwrap();

        let second = store.get("u1", "github").await.unwrap().unwrap();
        // Fresh nonce on reconnect, still exactly one row.
        assert_ne!(first.record.iv, second.record.iv);
        assert_eq!(store.list_connected("u1").await.unwrap().len(), 1);
        assert_eq!(
            vault.decrypt(&second.record).unwrap().get("token"),
            Some("ghp_rotated")
        );
    }

    #[tokio::test]
    async fn test_disconnect_removes_row() {
        let registry = default_registry(reqwest::Client::new()).unwrap();
        let store = MemoryCredentialStore::new();
        let vault = vault();
        let manager = ConnectionManager::new(&registry, &store, &vault);

        manager
            .connect("u1", "github", github_fields(), BTreeMap::new())
            .await
            .unwrap();
        manager.disconnect("u1", "github").await.unwrap();

        assert!(store.get("u1", "github").await.unwrap().is_none());
        assert!(manager.connected_services("u1").await.unwrap().is_empty());
    }

    #[test]
    fn test_connect_error_wraps_vault_failures() {
        let err: ConnectError = VaultError::DecryptionFailed.into();
        assert!(err.to_string().contains("decryption failed"));
    }

    #[tokio::test]
    async fn test_rows_are_scoped_per_user() {
        let store = MemoryCredentialStore::new();
        let vault = vault();
        let record = vault.encrypt(&Credentials::default()).unwrap();
        store
            .upsert(
                "u1",
                "github",
                StoredCredential {
                    record,
                    metadata: BTreeMap::new(),
                    connected_at: Utc::now(),
                },
            )
            .await
            .unwrap();

        assert!(store.get("u2", "github").await.unwrap().is_none());
        assert!(store.list_connected("u2").await.unwrap().is_empty());
    }
}
