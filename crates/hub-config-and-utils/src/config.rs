//! Configuration management for the hub.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default Supabase URL (can be overridden at compile time via SUPABASE_URL env var).
pub const DEFAULT_SUPABASE_URL: &str = match option_env!("SUPABASE_URL") {
    Some(url) => url,
    None => "https://random.supabase.co",
};

/// Default Supabase publishable key (can be overridden at compile time via SUPABASE_PUBLISHABLE_KEY env var).
pub const DEFAULT_SUPABASE_PUBLISHABLE_KEY: &str = match option_env!("SUPABASE_PUBLISHABLE_KEY") {
    Some(key) => key,
    None => "random-key",
};

/// Default edge function that processes a task.
pub const DEFAULT_PROCESS_FUNCTION: &str = "process-task";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Realtime change-feed connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RealtimeConfig {
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Base reconnect delay in seconds.
    pub reconnect_base_delay_secs: u64,
    /// Maximum reconnect delay in seconds.
    pub reconnect_max_delay_secs: u64,
    /// Maximum reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 25,
            reconnect_base_delay_secs: 1,
            reconnect_max_delay_secs: 30,
            max_reconnect_attempts: 10,
        }
    }
}

/// Advisory cost/time estimation parameters for parallel agent runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EstimationConfig {
    /// Token count of a baseline-complexity run.
    pub baseline_tokens: f64,
    /// Wall-clock seconds of a baseline-complexity run.
    pub baseline_seconds: f64,
    /// Share of tokens billed as input (the rest is output).
    pub input_share: f64,
    /// USD per input token.
    pub input_rate_per_token: f64,
    /// USD per output token.
    pub output_rate_per_token: f64,
    /// Lower bound of the per-run complexity factor.
    pub complexity_min: f64,
    /// Upper bound of the per-run complexity factor.
    pub complexity_max: f64,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            baseline_tokens: 8_000.0,
            baseline_seconds: 45.0,
            input_share: 0.6,
            input_rate_per_token: 0.000_003,
            output_rate_per_token: 0.000_015,
            complexity_min: 0.8,
            complexity_max: 1.2,
        }
    }
}

/// Main hub configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Supabase project URL.
    #[serde(default = "default_supabase_url")]
    pub supabase_url: String,
    /// Supabase publishable API key (public, safe to expose).
    #[serde(default = "default_supabase_publishable_key")]
    pub supabase_publishable_key: String,
    /// Edge function invoked once per created task.
    #[serde(default = "default_process_function")]
    pub process_function: String,
    /// Realtime change-feed settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Parallel run estimation settings.
    #[serde(default)]
    pub estimation: EstimationConfig,
}

fn default_supabase_url() -> String {
    DEFAULT_SUPABASE_URL.to_string()
}

fn default_supabase_publishable_key() -> String {
    DEFAULT_SUPABASE_PUBLISHABLE_KEY.to_string()
}

fn default_process_function() -> String {
    DEFAULT_PROCESS_FUNCTION.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            supabase_url: DEFAULT_SUPABASE_URL.to_string(),
            supabase_publishable_key: DEFAULT_SUPABASE_PUBLISHABLE_KEY.to_string(),
            process_function: DEFAULT_PROCESS_FUNCTION.to_string(),
            realtime: RealtimeConfig::default(),
            estimation: EstimationConfig::default(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults.
    ///
    /// Environment variables win over file values.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override configuration from environment variables.
    fn load_from_env(&mut self) {
        if let Some(log_level) = non_empty_env("HUB_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Some(url) = non_empty_env("HUB_SUPABASE_URL") {
            self.supabase_url = url;
        }
        if let Some(key) = non_empty_env("HUB_SUPABASE_PUBLISHABLE_KEY") {
            self.supabase_publishable_key = key;
        }
    }

    /// Reject configurations that cannot work at runtime.
    pub fn validate(&self) -> CoreResult<()> {
        self.supabase_url()?;
        let est = &self.estimation;
        if est.complexity_min <= 0.0 || est.complexity_min > est.complexity_max {
            return Err(CoreError::Config(format!(
                "invalid complexity range [{}, {}]",
                est.complexity_min, est.complexity_max
            )));
        }
        if !(0.0..=1.0).contains(&est.input_share) {
            return Err(CoreError::Config(format!(
                "input_share must be within [0, 1], got {}",
                est.input_share
            )));
        }
        Ok(())
    }

    /// Get the Supabase URL as a parsed URL.
    pub fn supabase_url(&self) -> CoreResult<Url> {
        Url::parse(&self.supabase_url).map_err(CoreError::from)
    }

    /// Websocket endpoint of the Supabase realtime service.
    pub fn realtime_url(&self) -> CoreResult<Url> {
        let mut url = self.supabase_url()?;
        let scheme = if url.scheme() == "http" { "ws" } else { "wss" };
        url.set_scheme(scheme)
            .map_err(|_| CoreError::Config(format!("cannot derive websocket url from {}", self.supabase_url)))?;
        url.set_path("/realtime/v1/websocket");
        url.query_pairs_mut()
            .clear()
            .append_pair("apikey", &self.supabase_publishable_key)
            .append_pair("vsn", "1.0.0");
        Ok(url)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
