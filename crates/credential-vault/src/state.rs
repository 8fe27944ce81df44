use crate::{VaultError, VaultLoad, VaultResult};
use serde::Serialize;

/// Coarse vault status for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultStatus {
    Empty,
    Unlocked,
    Locked,
    Unavailable,
    Corrupt,
}

impl VaultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Unlocked => "unlocked",
            Self::Locked => "locked",
            Self::Unavailable => "unavailable",
            Self::Corrupt => "corrupt",
        }
    }
}

/// What a consumer sees of one user's vault.
///
/// `token` is empty unless `status` is [`VaultStatus::Unlocked`].
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct VaultState {
    #[serde(skip)]
    pub token: String,
    pub has_stored_token: bool,
    pub status: VaultStatus,
}

impl VaultState {
    pub fn empty() -> Self {
        Self {
            token: String::new(),
            has_stored_token: false,
            status: VaultStatus::Empty,
        }
    }

    /// Folds a load outcome into a state. Errors become statuses.
    pub fn from_load(outcome: VaultResult<VaultLoad>) -> Self {
        let (token, has_stored_token, status) = match outcome {
            Ok(VaultLoad::Absent) => (String::new(), false, VaultStatus::Empty),
            Ok(VaultLoad::Unlocked(token)) => (token, true, VaultStatus::Unlocked),
            Ok(VaultLoad::Locked) => (String::new(), true, VaultStatus::Locked),
            Err(VaultError::Corrupt(_)) => (String::new(), false, VaultStatus::Corrupt),
            Err(_) => (String::new(), false, VaultStatus::Unavailable),
        };
        Self {
            token,
            has_stored_token,
            status,
        }
    }

    /// The token, if unlocked.
    pub fn token(&self) -> Option<&str> {
        (self.status == VaultStatus::Unlocked && !self.token.is_empty()).then_some(self.token.as_str())
    }
}

impl Default for VaultState {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for VaultState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultState")
            .field("token_len", &self.token.len())
            .field("has_stored_token", &self.has_stored_token)
            .field("status", &self.status)
            .finish()
    }
}
