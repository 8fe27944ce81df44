//! Errors raised while setting up a hub process.

use thiserror::Error;

/// Failures loading settings, resolving `~/.hub`, or starting logging.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A setting is present but unusable, e.g. an inverted complexity range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// `config.json` exists but is not valid JSON for [`crate::Config`].
    #[error("malformed config file: {0}")]
    ConfigFile(#[from] serde_json::Error),

    #[error("invalid Supabase URL: {0}")]
    SupabaseUrl(#[from] url::ParseError),

    /// No home directory to place `~/.hub` under; pass an explicit base dir.
    #[error("cannot locate the home directory for ~/.hub")]
    NoHomeDir,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The log file could not be opened or a subscriber is already installed.
    #[error("cannot initialize logging: {0}")]
    Logging(String),
}

/// Result type alias using CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
