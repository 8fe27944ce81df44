use crate::Session;
use backing_store::Installation;
use credential_vault::VaultState;

/// Where a resolved credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    ProviderToken,
    Installation,
    Vault,
}

#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedCredential {
    pub token: String,
    pub source: CredentialSource,
}

impl std::fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedCredential")
            .field("source", &self.source)
            .field("token_len", &self.token.len())
            .finish()
    }
}

/// Picks the token forwarded to remote jobs.
///
/// The session's provider token wins, then the bound installation's token,
/// then an unlocked vault token.
pub fn resolve_credential(
    session: Option<&Session>,
    installation: Option<&Installation>,
    vault: Option<&VaultState>,
) -> Option<ResolvedCredential> {
    let resolved = |token: &str, source| ResolvedCredential {
        token: token.to_string(),
        source,
    };

    if let Some(token) = session.and_then(Session::provider_token) {
        return Some(resolved(token, CredentialSource::ProviderToken));
    }
    if let Some(installation) = installation.filter(|i| !i.access_token.trim().is_empty()) {
        return Some(resolved(installation.access_token.trim(), CredentialSource::Installation));
    }
    vault
        .and_then(VaultState::token)
        .map(|token| resolved(token, CredentialSource::Vault))
}
