use crate::{VaultError, VaultRecord, VaultResult};
use hub_config_and_utils::vault_crypto::{self, VaultCryptoError};
use hub_storage::{KeyValueStore, StorageKeys};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of reading a user's vault record.
#[derive(Clone, PartialEq, Eq)]
pub enum VaultLoad {
    /// No record stored.
    Absent,
    /// Record decrypted with the current secret.
    Unlocked(String),
    /// Record present but sealed under a secret that is not available now.
    /// The record is kept.
    Locked,
}

impl std::fmt::Debug for VaultLoad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absent => f.write_str("Absent"),
            Self::Unlocked(token) => write!(f, "Unlocked(<{} bytes>)", token.len()),
            Self::Locked => f.write_str("Locked"),
        }
    }
}

/// Encrypted per-user token storage over a [`KeyValueStore`].
pub struct CredentialVault {
    store: Arc<dyn KeyValueStore>,
    available: bool,
}

impl CredentialVault {
    /// Wraps `store`, probing it once. An unusable store makes every
    /// operation fail with [`VaultError::StorageUnavailable`].
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let available = hub_storage::probe(store.as_ref());
        if !available {
            warn!("credential vault storage unavailable; vault disabled");
        }
        Self { store, available }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Encrypts `plaintext` under `secret` and stores it for `user_id`.
    pub fn persist(&self, user_id: &str, plaintext: &str, secret: Option<&str>) -> VaultResult<()> {
        let token = plaintext.trim();
        if token.is_empty() {
            return Err(VaultError::EmptyInput);
        }
        let secret = active_secret(secret).ok_or(VaultError::NoSession)?;
        self.ensure_available()?;

        let key = vault_crypto::derive_key(secret)?;
        let parts = vault_crypto::encrypt_parts(&key, token)?;
        let record = VaultRecord {
            ciphertext: parts.ciphertext_b64,
            nonce: parts.nonce_b64,
            updated_at: chrono::Utc::now(),
            key_check: Some(vault_crypto::key_check(&key)),
        };
        let raw = serde_json::to_string(&record)
            .map_err(|e| VaultError::StorageUnavailable(format!("encode record: {}", e)))?;

        self.store.set(&StorageKeys::vault_record(user_id), &raw)?;
        info!(user_id, token_len = token.len(), "credential stored in vault");
        Ok(())
    }

    /// Reads and decrypts the record for `user_id`.
    ///
    /// A missing secret, or a record sealed under a different secret, yields
    /// [`VaultLoad::Locked`]. A record that cannot be parsed, or that fails
    /// authentication under the secret it was sealed with, is purged and
    /// reported as [`VaultError::Corrupt`].
    pub fn load(&self, user_id: &str, secret: Option<&str>) -> VaultResult<VaultLoad> {
        self.ensure_available()?;
        let storage_key = StorageKeys::vault_record(user_id);

        let Some(raw) = self.store.get(&storage_key)? else {
            return Ok(VaultLoad::Absent);
        };

        let record: VaultRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => return Err(self.purge(user_id, format!("unreadable record: {}", e))),
        };

        let Some(secret) = active_secret(secret) else {
            debug!(user_id, "vault record present but no session secret");
            return Ok(VaultLoad::Locked);
        };

        let key = vault_crypto::derive_key(secret)?;
        match vault_crypto::decrypt_parts(&key, &record.ciphertext, &record.nonce) {
            Ok(token) => Ok(VaultLoad::Unlocked(token)),
            Err(VaultCryptoError::AuthenticationFailure) => {
                let sealed_with_this_key = record
                    .key_check
                    .as_deref()
                    .is_some_and(|check| check == vault_crypto::key_check(&key));
                if sealed_with_this_key {
                    Err(self.purge(user_id, "authentication failed under matching key".to_string()))
                } else {
                    info!(user_id, "vault record sealed under another session; locked");
                    Ok(VaultLoad::Locked)
                }
            }
            Err(e @ (VaultCryptoError::MalformedPayload(_) | VaultCryptoError::InvalidUtf8)) => {
                Err(self.purge(user_id, e.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Removes the record for `user_id`. Idempotent.
    pub fn clear(&self, user_id: &str) -> VaultResult<()> {
        self.ensure_available()?;
        self.store.remove(&StorageKeys::vault_record(user_id))?;
        debug!(user_id, "vault record cleared");
        Ok(())
    }

    fn ensure_available(&self) -> VaultResult<()> {
        if self.available {
            Ok(())
        } else {
            Err(VaultError::StorageUnavailable(
                "storage probe failed".to_string(),
            ))
        }
    }

    fn purge(&self, user_id: &str, reason: String) -> VaultError {
        warn!(user_id, reason = %reason, "purging corrupt vault record");
        if let Err(e) = self.store.remove(&StorageKeys::vault_record(user_id)) {
            warn!(user_id, error = %e, "failed to purge vault record");
        }
        VaultError::Corrupt(reason)
    }
}

fn active_secret(secret: Option<&str>) -> Option<&str> {
    secret.filter(|s| !s.is_empty())
}
