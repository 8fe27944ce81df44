//! Credential vault encryption helpers.
//!
//! A vault key is derived from the caller's session secret with HKDF-SHA256 and
//! used with ChaCha20-Poly1305. Payloads are exported as base64 of
//! `nonce(12) || ciphertext || tag(16)`; the split form keeps nonce and
//! ciphertext as separate base64 strings for record storage.

use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// Nonce size for ChaCha20-Poly1305 (96 bits).
pub const VAULT_NONCE_SIZE: usize = 12;
/// Key size for ChaCha20-Poly1305 (256 bits).
pub const VAULT_KEY_SIZE: usize = 32;
/// Poly1305 authentication tag size.
pub const VAULT_TAG_SIZE: usize = 16;

/// HKDF context string; changing it orphans every stored record.
const KEY_INFO: &[u8] = b"hub-credential-vault-v1";
const KEY_CHECK_LABEL: &[u8] = b"hub-credential-vault-key-check";

/// Derived symmetric key. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct VaultKey([u8; VAULT_KEY_SIZE]);

impl VaultKey {
    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(self.0.as_slice().into())
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VaultKey(<redacted>)")
    }
}

/// Base64-encoded ciphertext and nonce stored side by side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedParts {
    /// Base64-encoded ciphertext (including the tag).
    pub ciphertext_b64: String,
    /// Base64-encoded nonce bytes.
    pub nonce_b64: String,
}

/// Errors returned by vault crypto helpers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VaultCryptoError {
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("authentication tag did not verify")]
    AuthenticationFailure,
    #[error("decrypted payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("encryption failed: {0}")]
    Encrypt(String),
}

/// Derives the vault key for a session secret. Deterministic and one-way.
pub fn derive_key(secret: &str) -> Result<VaultKey, VaultCryptoError> {
    let hkdf = Hkdf::<Sha256>::new(None, secret.as_bytes());
    let mut okm = [0u8; VAULT_KEY_SIZE];
    hkdf.expand(KEY_INFO, &mut okm)
        .map_err(|e| VaultCryptoError::KeyDerivation(format!("{:?}", e)))?;
    Ok(VaultKey(okm))
}

/// Short fingerprint of a derived key.
///
/// Lets a reader tell "written under another secret" apart from "tampered
/// under this secret" without attempting decryption.
pub fn key_check(key: &VaultKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(KEY_CHECK_LABEL);
    hasher.update(key.0);
    hasher.finalize()[..8]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Encrypts `plaintext` under `secret` with a fresh random nonce.
///
/// Returns base64 of `nonce || ciphertext`.
pub fn encrypt(plaintext: &str, secret: &str) -> Result<String, VaultCryptoError> {
    let key = derive_key(secret)?;
    let (nonce, ciphertext) = seal(&key, plaintext.as_bytes())?;

    let mut payload = Vec::with_capacity(VAULT_NONCE_SIZE + ciphertext.len());
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(payload))
}

/// Encrypts `plaintext` with an already derived key, returning split parts.
pub fn encrypt_parts(key: &VaultKey, plaintext: &str) -> Result<EncryptedParts, VaultCryptoError> {
    let (nonce, ciphertext) = seal(key, plaintext.as_bytes())?;
    Ok(EncryptedParts {
        ciphertext_b64: BASE64.encode(ciphertext),
        nonce_b64: BASE64.encode(nonce),
    })
}

/// Decrypts a combined base64 payload produced by [`encrypt`].
pub fn decrypt(payload: &str, secret: &str) -> Result<String, VaultCryptoError> {
    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|e| VaultCryptoError::MalformedPayload(e.to_string()))?;

    if bytes.len() < VAULT_NONCE_SIZE + VAULT_TAG_SIZE {
        return Err(VaultCryptoError::MalformedPayload(format!(
            "payload too short: got {}, need at least {}",
            bytes.len(),
            VAULT_NONCE_SIZE + VAULT_TAG_SIZE
        )));
    }

    let (nonce, ciphertext) = bytes.split_at(VAULT_NONCE_SIZE);
    let key = derive_key(secret)?;
    open(&key, nonce, ciphertext)
}

/// Decrypts split base64 parts with an already derived key.
pub fn decrypt_parts(
    key: &VaultKey,
    ciphertext_b64: &str,
    nonce_b64: &str,
) -> Result<String, VaultCryptoError> {
    let ciphertext = BASE64
        .decode(ciphertext_b64)
        .map_err(|e| VaultCryptoError::MalformedPayload(format!("ciphertext: {}", e)))?;
    let nonce = BASE64
        .decode(nonce_b64)
        .map_err(|e| VaultCryptoError::MalformedPayload(format!("nonce: {}", e)))?;

    if nonce.len() != VAULT_NONCE_SIZE {
        return Err(VaultCryptoError::MalformedPayload(format!(
            "invalid nonce length: expected {}, got {}",
            VAULT_NONCE_SIZE,
            nonce.len()
        )));
    }
    if ciphertext.len() < VAULT_TAG_SIZE {
        return Err(VaultCryptoError::MalformedPayload(format!(
            "ciphertext shorter than tag: {}",
            ciphertext.len()
        )));
    }

    open(key, &nonce, &ciphertext)
}

fn seal(key: &VaultKey, plaintext: &[u8]) -> Result<([u8; VAULT_NONCE_SIZE], Vec<u8>), VaultCryptoError> {
    let mut nonce = [0u8; VAULT_NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);

    let ciphertext = key
        .cipher()
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| VaultCryptoError::Encrypt(e.to_string()))?;

    Ok((nonce, ciphertext))
}

fn open(key: &VaultKey, nonce: &[u8], ciphertext: &[u8]) -> Result<String, VaultCryptoError> {
    let plaintext = key
        .cipher()
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| VaultCryptoError::AuthenticationFailure)?;

    String::from_utf8(plaintext).map_err(|_| VaultCryptoError::InvalidUtf8)
}
