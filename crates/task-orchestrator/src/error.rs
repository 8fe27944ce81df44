use backing_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// No signed-in user. Raised before any network call.
    #[error("authentication required")]
    AuthenticationRequired,

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("backing store error: {0}")]
    Store(#[from] StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The task-processing call was rejected. The task row is left as is.
    #[error("remote invocation failed for task {task_id}: {message}")]
    RemoteInvocationFailed { task_id: String, message: String },
}

impl OrchestratorError {
    pub fn is_transient(&self) -> bool {
        match self {
            OrchestratorError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
