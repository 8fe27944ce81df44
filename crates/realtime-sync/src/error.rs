use backing_store::Collection;
use thiserror::Error;

/// Per-collection sync failures. Stored in the collection's view rather
/// than returned to a caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("fetch of {collection} failed: {message}")]
    FetchFailed { collection: Collection, message: String },

    #[error("subscription to {collection} failed: {message}")]
    SubscribeFailed { collection: Collection, message: String },

    #[error("no signed-in user")]
    NoUser,

    #[error("{0} is not synced")]
    Untracked(Collection),
}

pub type SyncResult<T> = Result<T, SyncError>;
