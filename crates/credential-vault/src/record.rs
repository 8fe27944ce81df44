use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Encrypted token as persisted in the key-value store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VaultRecord {
    /// Base64 ciphertext including the authentication tag.
    pub ciphertext: String,
    /// Base64 nonce.
    pub nonce: String,
    pub updated_at: DateTime<Utc>,
    /// Fingerprint of the key the record was sealed with.
    /// Absent on records written before fingerprints existed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_check: Option<String>,
}
