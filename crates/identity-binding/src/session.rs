//! Session snapshot supplied by the identity provider.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Federated provider whose sessions carry a usable token.
pub const EXPECTED_PROVIDER: &str = "github";

/// Claim keys holding the remote user id, in lookup order.
pub const USER_ID_CLAIMS: &[&str] = &["provider_id", "sub", "user_id", "id"];

/// Claim keys holding the remote username, in lookup order.
pub const USERNAME_CLAIMS: &[&str] = &["user_name", "preferred_username", "login", "nickname"];

#[derive(Clone, Serialize, Deserialize)]
pub struct Session {
    /// Short-lived secret; rotates on refresh.
    pub access_secret: String,
    /// Long-lived token issued by the federated provider, if any.
    #[serde(default)]
    pub provider_token: Option<String>,
    pub user: SessionUser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    #[serde(default)]
    pub app_metadata: Map<String, Value>,
    #[serde(default)]
    pub user_metadata: Map<String, Value>,
}

impl Session {
    /// Provider the user signed in with.
    pub fn provider(&self) -> Option<&str> {
        let meta = &self.user.app_metadata;
        meta.get("provider")
            .and_then(Value::as_str)
            .or_else(|| {
                meta.get("providers")
                    .and_then(Value::as_array)
                    .and_then(|providers| providers.first())
                    .and_then(Value::as_str)
            })
    }

    pub fn is_expected_provider(&self) -> bool {
        self.provider() == Some(EXPECTED_PROVIDER)
    }

    /// Provider token, ignoring blank values.
    pub fn provider_token(&self) -> Option<&str> {
        self.provider_token.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    pub fn remote_user_id(&self) -> Option<String> {
        first_claim(&self.user.user_metadata, USER_ID_CLAIMS)
    }

    pub fn remote_username(&self) -> Option<String> {
        first_claim(&self.user.user_metadata, USERNAME_CLAIMS)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user.id)
            .field("provider", &self.provider())
            .field("has_provider_token", &self.provider_token().is_some())
            .finish_non_exhaustive()
    }
}

/// First non-empty claim among `keys`. Numbers are stringified.
fn first_claim(claims: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match claims.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session(app: Value, user: Value) -> Session {
        serde_json::from_value(json!({
            "access_secret": "sess-1",
            "provider_token": "gho_token",
            "user": { "id": "u1", "app_metadata": app, "user_metadata": user }
        }))
        .unwrap()
    }

    #[test]
    fn provider_falls_back_to_providers_list() {
        assert_eq!(session(json!({ "provider": "github" }), json!({})).provider(), Some("github"));
        assert_eq!(
            session(json!({ "providers": ["github", "email"] }), json!({})).provider(),
            Some("github")
        );
        assert_eq!(session(json!({}), json!({})).provider(), None);
    }

    #[test]
    fn claims_use_fallback_keys() {
        let s = session(json!({}), json!({ "sub": 12345, "preferred_username": "octo" }));
        assert_eq!(s.remote_user_id().as_deref(), Some("12345"));
        assert_eq!(s.remote_username().as_deref(), Some("octo"));

        let s = session(json!({}), json!({ "provider_id": "99", "sub": "ignored", "user_name": "first" , "login": "second"}));
        assert_eq!(s.remote_user_id().as_deref(), Some("99"));
        assert_eq!(s.remote_username().as_deref(), Some("first"));
    }

    #[test]
    fn blank_claims_are_skipped() {
        let s = session(json!({}), json!({ "provider_id": " ", "id": 7, "login": "" }));
        assert_eq!(s.remote_user_id().as_deref(), Some("7"));
        assert_eq!(s.remote_username(), None);
    }

    #[test]
    fn debug_hides_secrets() {
        let s = session(json!({ "provider": "github" }), json!({}));
        let printed = format!("{:?}", s);
        assert!(!printed.contains("sess-1"));
        assert!(!printed.contains("gho_token"));
    }
}
