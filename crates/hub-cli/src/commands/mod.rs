//! CLI command implementations.

mod sync;
mod task;
mod vault;

pub use sync::sync_watch;
pub use task::{task_create, task_parallel, TaskOptionArgs};
pub use vault::{vault_clear, vault_show, vault_store};

use crate::output::OutputFormat;
use anyhow::{Context as _, Result};
use backing_store::{BackingStore, SupabaseClient};
use clap::Args;
use credential_vault::{CredentialVault, VaultState};
use hub_config_and_utils::{Config, Paths};
use hub_storage::FileStore;
use identity_binding::{resolve_credential, IdentityBinding, Session, SessionUser};
use serde_json::{Map, Value};
use std::sync::Arc;
use task_orchestrator::AuthContext;
use tracing::{debug, warn};

/// Session supplied through the environment.
#[derive(Args, Clone)]
pub struct SessionArgs {
    /// Signed-in user id
    #[arg(long = "user", env = "HUB_USER_ID")]
    pub user_id: Option<String>,
    /// Session access token; also the vault secret
    #[arg(long, env = "HUB_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,
    /// Token issued by the federated provider
    #[arg(long, env = "HUB_PROVIDER_TOKEN", hide_env_values = true)]
    pub provider_token: Option<String>,
    /// Provider the user signed in with (e.g. github)
    #[arg(long, env = "HUB_AUTH_PROVIDER")]
    pub provider: Option<String>,
    /// User id at the provider
    #[arg(long, env = "HUB_REMOTE_USER_ID")]
    pub remote_user_id: Option<String>,
    /// Username at the provider
    #[arg(long, env = "HUB_REMOTE_USERNAME")]
    pub remote_username: Option<String>,
}

impl SessionArgs {
    /// A session exists only with both a user id and an access token.
    pub fn session(&self) -> Option<Session> {
        let user_id = self.user_id.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let access_secret = self.access_token.as_deref().map(str::trim).filter(|s| !s.is_empty())?;

        let mut app_metadata = Map::new();
        if let Some(provider) = non_blank(&self.provider) {
            app_metadata.insert("provider".to_string(), Value::String(provider));
        }
        let mut user_metadata = Map::new();
        if let Some(id) = non_blank(&self.remote_user_id) {
            user_metadata.insert("provider_id".to_string(), Value::String(id));
        }
        if let Some(name) = non_blank(&self.remote_username) {
            user_metadata.insert("user_name".to_string(), Value::String(name));
        }

        Some(Session {
            access_secret: access_secret.to_string(),
            provider_token: self.provider_token.clone(),
            user: SessionUser {
                id: user_id.to_string(),
                app_metadata,
                user_metadata,
            },
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Everything a command needs from the process environment.
pub struct Context {
    pub paths: Paths,
    pub config: Config,
    pub format: OutputFormat,
}

impl Context {
    pub fn new(paths: Paths, config: Config, format: OutputFormat) -> Self {
        Self { paths, config, format }
    }

    pub fn vault(&self) -> Result<Arc<CredentialVault>> {
        let store = FileStore::open(self.paths.storage_dir())
            .with_context(|| format!("opening {}", self.paths.storage_dir().display()))?;
        Ok(Arc::new(CredentialVault::new(Arc::new(store))))
    }

    /// REST client authenticated as the session's user, when there is one.
    pub fn supabase(&self, session: Option<&Session>) -> Arc<SupabaseClient> {
        let client = SupabaseClient::new(&self.config.supabase_url, &self.config.supabase_publishable_key);
        client.set_access_token(session.map(|s| s.access_secret.clone()));
        Arc::new(client)
    }

    /// Auth for orchestrator calls: provider token first, then the bound
    /// installation, then the vault.
    ///
    /// Each command starts a session, so the installation is bound before it
    /// is fetched.
    pub async fn auth(&self, session: Option<&Session>, store: Arc<dyn BackingStore>) -> Result<Option<AuthContext>> {
        let Some(session) = session else {
            return Ok(None);
        };

        let installation = match IdentityBinding::new(store).on_session_transition(session).await {
            Ok(installation) => installation,
            Err(e) => {
                warn!(user_id = %session.user.id, error = %e, "Installation lookup failed");
                None
            }
        };

        let vault_state = self
            .vault()
            .map(|vault| VaultState::from_load(vault.load(&session.user.id, Some(&session.access_secret))))
            .unwrap_or_else(|e| {
                warn!(error = %e, "Vault unavailable");
                VaultState::empty()
            });

        let credential = resolve_credential(Some(session), installation.as_ref(), Some(&vault_state));
        debug!(
            user_id = %session.user.id,
            source = ?credential.as_ref().map(|c| c.source),
            vault = vault_state.status.as_str(),
            "Resolved task credential"
        );
        Ok(Some(AuthContext::new(
            session.user.id.clone(),
            credential.map(|c| c.token),
        )))
    }
}
