//! Configuration for the sentinel supervisor.
//!
//! A single JSON document carries both the manager-level settings
//! ([`Config`]) and the `sentinel` section declaring plugin and process
//! groups ([`ServicesConfig`]). [`ConfigDocument::load`] reads the file once
//! and keeps the raw JSON value so the supervisor can re-run its own
//! structural checks when it is initialised from a value rather than a path.

mod defaults;
mod error;
mod expand;
mod logging;
mod ports;
mod services;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use defaults::{
    DEFAULT_BACKLOG, DEFAULT_BASE_PORT, DEFAULT_DESTROY_TIMEOUT_SECS, DEFAULT_LISTEN_HOST,
    DEFAULT_LOG_FILTER, DEFAULT_MONITOR_INTERVAL_SECS, DEFAULT_TIMEOUT_SECS,
};
pub use error::ConfigError;
pub use expand::{expand_env, expand_with};
pub use logging::{LogFormat, LogFormatParseError};
pub use ports::PortAllocator;
pub use services::{
    MAX_RUN_COUNT, MIN_RUN_COUNT, PLUGINS_KEY, PROCESSES_KEY, PluginEntry, ProcessEntry,
    SENTINEL_KEY, ServicesConfig,
};

/// Manager-level settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Base port; the first managed port is `port + 1`.
    #[serde(default = "defaults::default_port")]
    pub port: u16,
    /// Working directory of spawned processes and base of relative paths.
    #[serde(default = "defaults::default_home_path")]
    pub home_path: Utf8PathBuf,
    /// Seconds a managed listener keeps retrying its bind.
    #[serde(default = "defaults::default_timeout")]
    pub timeout: f64,
    /// Address managed listeners bind to.
    #[serde(default = "defaults::default_listen_host")]
    pub listen_host: String,
    /// Backlog handed to `listen(2)`.
    #[serde(default = "defaults::default_backlog")]
    pub backlog: i32,
    /// Whether managed listeners set `SO_REUSEADDR`.
    #[serde(default = "defaults::default_reuse_address")]
    pub reuse_address: bool,
    /// Seconds between two monitoring passes of the daemon loop.
    #[serde(default = "defaults::default_monitor_interval")]
    pub monitor_interval: f64,
    /// Seconds the daemon spends draining units on exit.
    #[serde(default = "defaults::default_destroy_timeout")]
    pub destroy_timeout: f64,
    /// `tracing` filter expression.
    #[serde(default = "defaults::default_log_filter")]
    pub log_filter: String,
    /// Log output format.
    #[serde(default = "defaults::default_log_format")]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: defaults::default_port(),
            home_path: defaults::default_home_path(),
            timeout: defaults::default_timeout(),
            listen_host: defaults::default_listen_host(),
            backlog: defaults::default_backlog(),
            reuse_address: defaults::default_reuse_address(),
            monitor_interval: defaults::default_monitor_interval(),
            destroy_timeout: defaults::default_destroy_timeout(),
            log_filter: defaults::default_log_filter(),
            log_format: defaults::default_log_format(),
        }
    }
}

impl Config {
    /// Listener bind retry budget.
    #[must_use]
    pub fn bind_timeout(&self) -> Duration {
        seconds_or(self.timeout, DEFAULT_TIMEOUT_SECS)
    }

    /// Daemon monitoring period.
    #[must_use]
    pub fn monitor_period(&self) -> Duration {
        seconds_or(self.monitor_interval, DEFAULT_MONITOR_INTERVAL_SECS)
    }

    /// Daemon drain budget.
    #[must_use]
    pub fn drain_budget(&self) -> Duration {
        seconds_or(self.destroy_timeout, DEFAULT_DESTROY_TIMEOUT_SECS)
    }

    /// Home directory for spawned processes.
    #[must_use]
    pub fn home_path(&self) -> &Utf8Path {
        self.home_path.as_path()
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

fn seconds_or(value: f64, fallback: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_else(|_| Duration::from_secs_f64(fallback))
}

/// A loaded configuration file.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    /// Manager-level settings decoded from the document.
    pub config: Config,
    /// The whole document, consumed by the supervisor's `initialize`.
    pub services: Value,
}

impl ConfigDocument {
    /// Reads and decodes a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read and
    /// [`ConfigError::Parse`] when it is not valid JSON or the manager-level
    /// fields have the wrong types.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source: Arc::new(source),
        })?;
        Self::parse(path, &text)
    }

    /// Decodes a document from text; `path` is only used in errors.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid JSON or mistyped fields.
    pub fn parse(path: &Utf8Path, text: &str) -> Result<Self, ConfigError> {
        let parse_error = |source| ConfigError::Parse {
            path: path.to_path_buf(),
            source: Arc::new(source),
        };
        let services: Value = serde_json::from_str(text).map_err(parse_error)?;
        let config = Config::deserialize(&services).map_err(parse_error)?;
        Ok(Self { config, services })
    }
}
