//! Storage key names.

/// Storage keys used by the hub
pub struct StorageKeys;

impl StorageKeys {
    /// Reserved key written and removed by [`crate::probe`].
    pub const PROBE: &'static str = "hub.storage.probe";

    /// Prefix of per-user credential vault records.
    pub const VAULT_RECORD_PREFIX: &'static str = "hub.vault.token.";

    /// Key of the vault record for `user_id`.
    pub fn vault_record(user_id: &str) -> String {
        format!("{}{}", Self::VAULT_RECORD_PREFIX, user_id)
    }
}
