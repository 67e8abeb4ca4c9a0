//! Credential vault: authenticated encryption for per-user service secrets.
//!
//! Secrets are serialized to a canonical JSON byte form and sealed with
//! AES-256-GCM under a single process-wide key. Every encryption draws a
//! fresh random 16-byte nonce; the 16-byte tag is stored separately so the
//! persisted record keeps its `(ciphertext, iv, auth_tag)` shape. Decryption
//! fails closed: tag mismatch, wrong key, or unparsable plaintext all yield
//! `VaultError::DecryptionFailed` and never release partial plaintext.

use std::collections::BTreeMap;
use std::fmt;

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Key, Nonce};
use sha2::{Digest, Sha256};

use crate::error::VaultError;

/// AES-256-GCM with a 16-byte nonce, matching the stored record format.
type VaultCipher = AesGcm<Aes256, U16>;

/// Nonce length in bytes.
pub const NONCE_LEN: usize = 16;

/// GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

// ---------------------------------------------------------------------------
// VaultKey
// ---------------------------------------------------------------------------

/// Process-wide 256-bit vault key.
///
/// Parsed once at startup from a 64-character hex string. The `Debug` impl
/// prints only a fingerprint prefix; the raw bytes are never displayed.
#[derive(Clone)]
pub struct VaultKey {
    bytes: [u8; 32],
    fingerprint: String,
}

impl VaultKey {
    /// Parse a key from its 64-character hex encoding.
    ///
    /// Wrong length or non-hex input is a configuration error.
    pub fn from_hex(encoded: &str) -> Result<Self, VaultError> {
        let decoded = hex::decode(encoded.trim())
            .map_err(|e| VaultError::InvalidKey(format!("not valid hex: {e}")))?;
        if decoded.len() != 32 {
            return Err(VaultError::InvalidKey(format!(
                "expected 32 bytes (64 hex characters), got {} bytes",
                decoded.len()
            )));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&decoded);
        Ok(Self::from_bytes(bytes))
    }

    /// Build a key from raw bytes. Used by tests and embedders that manage
    /// key material themselves.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        let digest = Sha256::digest(bytes);
        let fingerprint = hex::encode(&digest[..4]);
        Self { bytes, fingerprint }
    }

    /// First 8 hex characters of `sha256(key)`. Safe to log.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultKey")
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Transient decrypted credential map.
///
/// Exists only for the duration of one plugin `execute` call. Never
/// persisted, never cached, and the `Debug` impl redacts every value so an
/// accidental log statement cannot leak secrets.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    entries: BTreeMap<String, String>,
}

impl Credentials {
    /// Build from an ordered map of field key to secret value.
    pub fn new(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }

    /// Look up a field value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Look up a field value, reporting a human-readable message when the
    /// field is absent or empty. Plugins map this message straight into a
    /// failed `ToolResult` before making any network call.
    pub fn require(&self, key: &str) -> Result<&str, String> {
        match self.get(key) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(format!("missing required credential field '{key}'")),
        }
    }

    /// Number of stored fields.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn to_canonical_bytes(&self) -> Result<Vec<u8>, VaultError> {
        // BTreeMap keeps field order stable, so the byte form is canonical.
        serde_json::to_vec(&self.entries)
            .map_err(|e| VaultError::EncryptionFailed(format!("serialization failed: {e}")))
    }

    fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, VaultError> {
        let entries: BTreeMap<String, String> =
            serde_json::from_slice(bytes).map_err(|_| VaultError::DecryptionFailed)?;
        Ok(Self { entries })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credentials({} fields, values redacted)", self.entries.len())
    }
}

impl FromIterator<(String, String)> for Credentials {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// EncryptedCredential
// ---------------------------------------------------------------------------

/// The at-rest form of one credential map.
///
/// Tag is kept separate from the ciphertext so the persisted record exposes
/// all three components individually.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedCredential {
    /// Ciphertext bytes, without the trailing tag.
    pub ciphertext: Vec<u8>,
    /// Per-record random 16-byte nonce.
    pub iv: Vec<u8>,
    /// 16-byte GCM authentication tag.
    pub auth_tag: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// Authenticated-encryption codec over the process-wide key.
#[derive(Debug, Clone)]
pub struct Vault {
    key: VaultKey,
}

impl Vault {
    /// Create a vault over the given key.
    pub fn new(key: VaultKey) -> Self {
        Self { key }
    }

    /// Seal a credential map.
    ///
    /// Draws a fresh random nonce on every call; encrypting the same map
    /// twice never produces the same `iv` or ciphertext.
    pub fn encrypt(&self, credentials: &Credentials) -> Result<EncryptedCredential, VaultError> {
        let plaintext = credentials.to_canonical_bytes()?;
        let cipher = VaultCipher::new(Key::<VaultCipher>::from_slice(&self.key.bytes));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::<U16>::from_slice(&nonce_bytes);

        let mut sealed = cipher
            .encrypt(nonce, plaintext.as_slice())
            .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;

        // The aead API appends the tag; split it back out for storage.
        let auth_tag = sealed.split_off(sealed.len() - TAG_LEN);
        Ok(EncryptedCredential {
            ciphertext: sealed,
            iv: nonce_bytes.to_vec(),
            auth_tag,
        })
    }

    /// Open a sealed record, verifying the tag before releasing plaintext.
    ///
    /// Any corruption, key mismatch, or structural mismatch of the decrypted
    /// bytes yields `VaultError::DecryptionFailed`. Logs a diagnostic with
    /// the key fingerprint prefix only, never ciphertext or plaintext.
    pub fn decrypt(&self, record: &EncryptedCredential) -> Result<Credentials, VaultError> {
        if record.iv.len() != NONCE_LEN || record.auth_tag.len() != TAG_LEN {
            log::warn!(
                "credential decrypt rejected: malformed record (key fingerprint {})",
                self.key.fingerprint()
            );
            return Err(VaultError::DecryptionFailed);
        }

        let cipher = VaultCipher::new(Key::<VaultCipher>::from_slice(&self.key.bytes));
        let nonce = Nonce::<U16>::from_slice(&record.iv);

        let mut sealed = Vec::with_capacity(record.ciphertext.len() + TAG_LEN);
        sealed.extend_from_slice(&record.ciphertext);
        sealed.extend_from_slice(&record.auth_tag);

        let plaintext = cipher.decrypt(nonce, sealed.as_slice()).map_err(|_| {
            log::warn!(
                "credential decrypt failed: tag verification error (key fingerprint {})",
                self.key.fingerprint()
            );
            VaultError::DecryptionFailed
        })?;

        Credentials::from_canonical_bytes(&plaintext)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_credentials() -> Credentials {
        [
            ("api_token".to_string(), "tok_abc123".to_string()),
            ("domain".to_string(), "example.atlassian.net".to_string()),
        ]
        .into_iter()
        .collect()
    }

    fn test_vault() -> Vault {
        Vault::new(VaultKey::from_bytes([7u8; 32]))
    }

    #[test]
    fn test_roundtrip() {
        let vault = test_vault();
        let creds = sample_credentials();
        let record = vault.encrypt(&creds).unwrap();
        let decrypted = vault.decrypt(&record).unwrap();
        assert_eq!(decrypted, creds);
    }

    #[test]
    fn test_roundtrip_empty_map() {
        let vault = test_vault();
        let creds = Credentials::default();
        let record = vault.encrypt(&creds).unwrap();
        assert_eq!(vault.decrypt(&record).unwrap(), creds);
    }

    #[test]
    fn test_nonce_uniqueness() {
        let vault = test_vault();
        let creds = sample_credentials();
        let a = vault.encrypt(&creds).unwrap();
        let b = vault.encrypt(&creds).unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
        assert_eq!(a.iv.len(), NONCE_LEN);
    }

    #[test]
    fn test_tampered_ciphertext_fails_closed() {
        let vault = test_vault();
        let mut record = vault.encrypt(&sample_credentials()).unwrap();
        record.ciphertext[0] ^= 0x01;
        assert!(matches!(
            vault.decrypt(&record),
            Err(VaultError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_tampered_tag_fails_closed() {
        let vault = test_vault();
        let mut record = vault.encrypt(&sample_credentials()).unwrap();
        record.auth_tag[TAG_LEN - 1] ^= 0x80;
        assert!(matches!(
            vault.decrypt(&record),
            Err(VaultError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_wrong_key_fails_closed() {
        let record = test_vault().encrypt(&sample_credentials()).unwrap();
        let other = Vault::new(VaultKey::from_bytes([8u8; 32]));
        assert!(matches!(
            other.decrypt(&record),
            Err(VaultError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_malformed_iv_rejected() {
        let vault = test_vault();
        let mut record = vault.encrypt(&sample_credentials()).unwrap();
        record.iv.truncate(4);
        assert!(matches!(
            vault.decrypt(&record),
            Err(VaultError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_key_from_hex() {
        let key = VaultKey::from_hex(&"0f".repeat(32)).unwrap();
        assert_eq!(key.fingerprint().len(), 8);

        assert!(VaultKey::from_hex("deadbeef").is_err());
        assert!(VaultKey::from_hex("not hex at all").is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_values() {
        let creds = sample_credentials();
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("tok_abc123"));
        assert!(rendered.contains("redacted"));
    }

    #[test]
    fn test_require_reports_missing_field() {
        let creds = sample_credentials();
        assert_eq!(creds.require("api_token").unwrap(), "tok_abc123");
        let err = creds.require("bot_token").unwrap_err();
        assert!(err.contains("bot_token"));
    }
}
