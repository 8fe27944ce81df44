use backing_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BindingError {
    #[error("backing store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid session: {0}")]
    InvalidSession(String),
}

impl BindingError {
    pub fn is_transient(&self) -> bool {
        match self {
            BindingError::Store(e) => e.is_transient(),
            BindingError::InvalidSession(_) => false,
        }
    }
}

pub type BindingResult<T> = Result<T, BindingError>;
