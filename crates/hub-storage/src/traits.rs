//! Storage trait definitions.

use crate::StorageResult;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// Identifies one execution context (one handle) over a shared backing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocates a process-unique context id.
    pub fn next() -> Self {
        Self(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// A key changed through some handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    /// `None` when the key was removed.
    pub new_value: Option<String>,
    pub origin: ContextId,
}

impl StorageEvent {
    /// True if the change was made by a context other than `context`.
    pub fn is_external_to(&self, context: ContextId) -> bool {
        self.origin != context
    }
}

/// Trait for local key-value backends.
pub trait KeyValueStore: Send + Sync {
    /// Retrieve a value
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Store a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Remove a value. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> StorageResult<()>;

    /// Check if a key exists
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Subscribe to changes made through any handle over the same backing,
    /// including this one. Filter with [`StorageEvent::is_external_to`].
    fn subscribe(&self) -> broadcast::Receiver<StorageEvent>;

    /// The context this handle writes as.
    fn context_id(&self) -> ContextId;
}
