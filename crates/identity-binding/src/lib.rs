//! Binds a federated login session to a durable GitHub installation row.

mod binding;
mod credential;
mod error;
mod session;

pub use binding::{BindOutcome, IdentityBinding, SkipReason, INSTALLATION_CONFLICT_COLUMNS};
pub use credential::{resolve_credential, CredentialSource, ResolvedCredential};
pub use error::{BindingError, BindingResult};
pub use session::{Session, SessionUser, EXPECTED_PROVIDER, USERNAME_CLAIMS, USER_ID_CLAIMS};
