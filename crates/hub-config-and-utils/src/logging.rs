//! Logging initialization.
//!
//! Every hub process writes structured JSONL to `~/.hub/logs/hub.jsonl`, one
//! line per event, with the service name attached. `RUST_LOG` overrides the
//! configured default level. Stderr output is optional and human-readable.

use crate::{CoreError, CoreResult, Paths};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize logging for the default `hub` service.
pub fn init_logging(paths: &Paths, level: &str, also_stderr: bool) -> CoreResult<()> {
    init_logging_for_service(paths, "hub", level, also_stderr)
}

/// Initialize logging with a custom service name.
///
/// Returns an error instead of panicking when the log file cannot be opened or
/// a global subscriber is already installed.
pub fn init_logging_for_service(
    paths: &Paths,
    service_name: &str,
    level: &str,
    also_stderr: bool,
) -> CoreResult<()> {
    std::fs::create_dir_all(paths.logs_dir())?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(paths.log_file())?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(parse_level(level).as_str().to_ascii_lowercase()));

    let jsonl = fmt::layer()
        .json()
        .with_current_span(true)
        .with_target(true)
        .with_writer(Mutex::new(file));

    let stderr = also_stderr.then(|| {
        fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(jsonl)
        .with(stderr)
        .try_init()
        .map_err(|e| CoreError::Logging(e.to_string()))?;

    tracing::info!(service = service_name, pid = std::process::id(), "logging initialized");
    Ok(())
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
