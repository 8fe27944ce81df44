use hub_config_and_utils::VaultCryptoError;
use hub_storage::StorageError;
use thiserror::Error;

/// Vault failures. None of these are fatal to the host.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("token is empty")]
    EmptyInput,

    #[error("no active session secret")]
    NoSession,

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The stored record could not be used and has been purged.
    #[error("vault record is corrupt: {0}")]
    Corrupt(String),

    #[error("vault crypto error: {0}")]
    Crypto(#[from] VaultCryptoError),
}

impl VaultError {
    /// Short, user-facing cause.
    pub fn cause(&self) -> &'static str {
        match self {
            Self::EmptyInput => "empty-input",
            Self::NoSession => "locked",
            Self::StorageUnavailable(_) | Self::Crypto(_) => "unavailable",
            Self::Corrupt(_) => "corrupt",
        }
    }
}

impl From<StorageError> for VaultError {
    fn from(err: StorageError) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

pub type VaultResult<T> = Result<T, VaultError>;
