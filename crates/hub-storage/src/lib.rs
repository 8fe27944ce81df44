//! Local key-value storage for the hub.
//!
//! Values are plain strings keyed by name. Every handle belongs to a
//! [`ContextId`]; writes are broadcast to the other handles opened over the
//! same backing so they can react to changes made elsewhere.
//!
//! - [`MemoryStore`]: process-local map, also used by tests
//! - [`FileStore`]: one file per key under a root directory

mod file;
mod keys;
mod memory;
mod traits;

pub use file::FileStore;
pub use keys::StorageKeys;
pub use memory::MemoryStore;
pub use traits::{ContextId, KeyValueStore, StorageEvent};

use thiserror::Error;

/// Capacity of the change-notification channel shared by a backing.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Storage is disabled or blocked.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Value could not be encoded or decoded.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Checks that `store` accepts a write and a remove.
///
/// Uses a reserved key and leaves nothing behind on success. Any failure is
/// reported as `false`.
pub fn probe(store: &dyn KeyValueStore) -> bool {
    let outcome = store
        .set(StorageKeys::PROBE, "1")
        .and_then(|_| store.remove(StorageKeys::PROBE));

    match outcome {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "storage probe failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_succeeds_on_memory_store_and_leaves_no_key() {
        let store = MemoryStore::shared();
        assert!(probe(&store));
        assert_eq!(store.get(StorageKeys::PROBE).unwrap(), None);
    }

    #[test]
    fn probe_fails_on_disabled_store() {
        let store = MemoryStore::disabled();
        assert!(!probe(&store));
    }

    #[test]
    fn probe_succeeds_on_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("storage")).unwrap();
        assert!(probe(&store));
        assert!(!store.has(StorageKeys::PROBE).unwrap());
    }
}
