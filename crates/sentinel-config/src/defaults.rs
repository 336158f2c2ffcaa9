use camino::Utf8PathBuf;

use crate::logging::LogFormat;

/// Base port used when the document does not set one.
pub const DEFAULT_BASE_PORT: u16 = 5000;

/// Seconds a managed listener keeps retrying its bind.
pub const DEFAULT_TIMEOUT_SECS: f64 = 5.0;

/// Address managed listeners bind to.
pub const DEFAULT_LISTEN_HOST: &str = "127.0.0.1";

/// Backlog handed to `listen(2)` for managed listeners.
pub const DEFAULT_BACKLOG: i32 = 128;

/// Seconds between two monitoring passes of the daemon loop.
pub const DEFAULT_MONITOR_INTERVAL_SECS: f64 = 1.0;

/// Seconds the daemon spends draining units on exit.
pub const DEFAULT_DESTROY_TIMEOUT_SECS: f64 = 5.0;

/// Default log filter expression used by the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default base port.
#[must_use]
pub const fn default_port() -> u16 {
    DEFAULT_BASE_PORT
}

/// Default home path: the current directory.
#[must_use]
pub fn default_home_path() -> Utf8PathBuf {
    Utf8PathBuf::from(".")
}

/// Default listener bind retry budget in seconds.
#[must_use]
pub const fn default_timeout() -> f64 {
    DEFAULT_TIMEOUT_SECS
}

/// Owned listen host used by serde.
#[must_use]
pub fn default_listen_host() -> String {
    DEFAULT_LISTEN_HOST.to_owned()
}

/// Default listener backlog.
#[must_use]
pub const fn default_backlog() -> i32 {
    DEFAULT_BACKLOG
}

/// `SO_REUSEADDR` is enabled unless the document opts out.
#[must_use]
pub const fn default_reuse_address() -> bool {
    true
}

/// Default daemon monitoring period in seconds.
#[must_use]
pub const fn default_monitor_interval() -> f64 {
    DEFAULT_MONITOR_INTERVAL_SECS
}

/// Default drain budget in seconds.
#[must_use]
pub const fn default_destroy_timeout() -> f64 {
    DEFAULT_DESTROY_TIMEOUT_SECS
}

/// Owned log filter value used by serde.
#[must_use]
pub fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the daemon.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}
