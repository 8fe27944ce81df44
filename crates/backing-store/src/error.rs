//! Error types for backing store operations.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Network or transport-level HTTP error from reqwest.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Supabase returned a non-success HTTP status.
    #[error("Supabase error: {status} - {message}")]
    Supabase {
        status: u16,
        /// Summary of the response body (length and digest).
        message: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A row did not match its record type.
    #[error("invalid {table} record: {message}")]
    InvalidRecord { table: String, message: String },

    /// WebSocket error on the change feed.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("not connected to realtime")]
    NotConnected,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl StoreError {
    /// Whether retrying the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                e.status().is_some_and(|s| s.is_server_error())
            }
            StoreError::Supabase { status, .. } => *status >= 500,
            StoreError::WebSocket(_) | StoreError::NotConnected => true,
            _ => false,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supabase_5xx_is_transient() {
        let err = StoreError::Supabase {
            status: 503,
            message: "len=0".to_string(),
        };
        assert!(err.is_transient());
        let err = StoreError::Supabase {
            status: 409,
            message: "len=0".to_string(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn invalid_record_is_not_transient() {
        let err = StoreError::InvalidRecord {
            table: "tasks".to_string(),
            message: "missing field `id`".to_string(),
        };
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "invalid tasks record: missing field `id`");
    }
}
