//! Local encrypted credential vault.
//!
//! Protects one third-party access token per user with a key derived from the
//! current session secret. Records survive session rotation: a record written
//! under an older secret reads back as [`VaultLoad::Locked`] and is kept until
//! a matching secret unlocks it or the caller clears it. Records that fail
//! authentication under the secret they were written with are purged.

mod error;
mod record;
mod state;
mod vault;
mod watcher;

#[cfg(test)]
mod tests;

pub use error::{VaultError, VaultResult};
pub use record::VaultRecord;
pub use state::{VaultState, VaultStatus};
pub use vault::{CredentialVault, VaultLoad};
pub use watcher::VaultWatcher;
