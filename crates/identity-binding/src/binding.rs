use crate::{BindingError, BindingResult, Session, EXPECTED_PROVIDER};
use backing_store::{select_typed, BackingStore, Collection, Installation, RowQuery};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Upsert key of installation rows.
pub const INSTALLATION_CONFLICT_COLUMNS: &str = "user_id,github_user_id";

/// Why a bind did nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Signed in with another provider (or none recorded).
    OtherProvider(Option<String>),
    MissingProviderToken,
    MissingRemoteUserId,
    MissingRemoteUsername,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::OtherProvider(Some(p)) => write!(f, "provider is {}, not {}", p, EXPECTED_PROVIDER),
            SkipReason::OtherProvider(None) => write!(f, "no provider recorded"),
            SkipReason::MissingProviderToken => write!(f, "session carries no provider token"),
            SkipReason::MissingRemoteUserId => write!(f, "no remote user id claim"),
            SkipReason::MissingRemoteUsername => write!(f, "no remote username claim"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BindOutcome {
    Bound(Installation),
    Skipped(SkipReason),
}

/// Reconciles sessions with installation rows.
pub struct IdentityBinding {
    store: Arc<dyn BackingStore>,
}

impl IdentityBinding {
    pub fn new(store: Arc<dyn BackingStore>) -> Self {
        Self { store }
    }

    /// Upserts the installation described by `session`.
    ///
    /// Sessions from another provider, or lacking the token or a required
    /// claim, are skipped. Racing binds for one user converge on one row.
    pub async fn bind(&self, session: &Session) -> BindingResult<BindOutcome> {
        let user_id = session.user.id.trim();
        if user_id.is_empty() {
            return Err(BindingError::InvalidSession("empty user id".to_string()));
        }

        let skip = |reason: SkipReason| -> BindingResult<BindOutcome> {
            info!(user_id, reason = %reason, "Skipping installation bind");
            Ok(BindOutcome::Skipped(reason))
        };

        if !session.is_expected_provider() {
            return skip(SkipReason::OtherProvider(session.provider().map(str::to_string)));
        }
        let Some(token) = session.provider_token() else {
            return skip(SkipReason::MissingProviderToken);
        };
        let Some(remote_user_id) = session.remote_user_id() else {
            return skip(SkipReason::MissingRemoteUserId);
        };
        let Some(remote_username) = session.remote_username() else {
            return skip(SkipReason::MissingRemoteUsername);
        };

        let row = json!({
            "user_id": user_id,
            "github_user_id": remote_user_id,
            "github_username": remote_username,
            "access_token": token,
            "updated_at": chrono::Utc::now().to_rfc3339(),
        });

        let stored = self
            .store
            .upsert(Collection::Installations, row, INSTALLATION_CONFLICT_COLUMNS)
            .await?;
        let installation: Installation = serde_json::from_value(stored).map_err(|e| {
            backing_store::StoreError::InvalidRecord {
                table: Collection::Installations.table().to_string(),
                message: e.to_string(),
            }
        })?;

        info!(
            user_id,
            github_user_id = %installation.github_user_id,
            github_username = %installation.github_username,
            "Installation bound"
        );
        Ok(BindOutcome::Bound(installation))
    }

    /// Most recently updated installation of `user_id`.
    pub async fn latest_installation(&self, user_id: &str) -> BindingResult<Option<Installation>> {
        let query = RowQuery::owned_by(Collection::Installations, user_id)
            .order_desc("updated_at")
            .limit(1);
        let installations: Vec<Installation> = select_typed(self.store.as_ref(), &query).await?;
        Ok(installations.into_iter().next())
    }

    /// Runs on sign-in and token refresh: bind, then always fetch.
    ///
    /// Bind failures are logged; only the fetch can fail this call.
    pub async fn on_session_transition(&self, session: &Session) -> BindingResult<Option<Installation>> {
        match self.bind(session).await {
            Ok(BindOutcome::Bound(_)) => {}
            Ok(BindOutcome::Skipped(reason)) => debug!(reason = %reason, "Bind skipped"),
            Err(e) => warn!(user_id = %session.user.id, error = %e, "Installation bind failed"),
        }
        self.latest_installation(&session.user.id).await
    }
}
