//! Core types, configuration, and utilities shared by every hub crate.

mod config;
mod error;
mod logging;
mod paths;
pub mod vault_crypto;

pub use config::{
    Config, EstimationConfig, RealtimeConfig, DEFAULT_LOG_LEVEL, DEFAULT_PROCESS_FUNCTION,
    DEFAULT_SUPABASE_URL,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service, parse_level};
pub use paths::Paths;
pub use vault_crypto::{
    decrypt, decrypt_parts, derive_key, encrypt, encrypt_parts, key_check, EncryptedParts,
    VaultCryptoError, VaultKey,
};
