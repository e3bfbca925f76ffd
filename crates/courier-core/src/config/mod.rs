mod telegram;

pub use telegram::{redact, TelegramConfig};

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::CourierError;

/// Top-level Courier configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Long-polling and dispatch settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Server-side wait for each `getUpdates` call.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
    /// First backoff delay after a failed fetch.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,
    /// Backoff ceiling.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
    /// Maximum handler tasks running at once. Absent = unbounded.
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    /// Single-instance lock file. `~/` is expanded.
    #[serde(default = "default_lock_path")]
    pub lock_path: String,
    /// Skip whatever is already queued on the server at start.
    #[serde(default = "default_true")]
    pub discard_old_updates: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_timeout_secs: default_poll_timeout(),
            backoff_base_secs: default_backoff_base(),
            max_backoff_secs: default_max_backoff(),
            max_concurrency: None,
            lock_path: default_lock_path(),
            discard_old_updates: true,
        }
    }
}

/// Log sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log file path. Absent = stderr only.
    #[serde(default)]
    pub file: Option<String>,
    /// Also log to stderr.
    #[serde(default = "default_true")]
    pub console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            console: true,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_poll_timeout() -> u64 {
    5
}
fn default_backoff_base() -> u64 {
    1
}
fn default_max_backoff() -> u64 {
    32
}
fn default_lock_path() -> String {
    "courier.lock".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Reject settings the poller cannot run with.
    pub fn validate(&self) -> Result<(), CourierError> {
        let p = &self.poller;
        if p.max_concurrency == Some(0) {
            return Err(CourierError::Config(
                "poller.max_concurrency must be at least 1 (omit it for unbounded)".into(),
            ));
        }
        if p.backoff_base_secs == 0 {
            return Err(CourierError::Config(
                "poller.backoff_base_secs must be at least 1".into(),
            ));
        }
        if p.max_backoff_secs < p.backoff_base_secs {
            return Err(CourierError::Config(format!(
                "poller.max_backoff_secs ({}) is below backoff_base_secs ({})",
                p.max_backoff_secs, p.backoff_base_secs
            )));
        }
        if p.lock_path.trim().is_empty() {
            return Err(CourierError::Config("poller.lock_path is empty".into()));
        }
        Ok(())
    }
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist.
pub fn load(path: &str) -> Result<Config, CourierError> {
    let path = Path::new(path);
    if !path.exists() {
        tracing::info!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| CourierError::Config(format!("failed to read {}: {}", path.display(), e)))?;

    parse(&content)
}

/// Parse and validate configuration from a TOML string.
pub fn parse(content: &str) -> Result<Config, CourierError> {
    let config: Config = toml::from_str(content)
        .map_err(|e| CourierError::Config(format!("failed to parse config: {}", e)))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests;
