//! Structured telemetry initialisation for the daemon.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use sentinel_config::{Config, LogFormat};
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the global subscriber on first use.
///
/// Later calls return a fresh [`TelemetryHandle`] without touching the
/// already installed subscriber, even if `config` differs.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for an unparsable filter and
/// [`TelemetryError::Subscriber`] when another global subscriber is already
/// installed.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(config))
        .map(|()| TelemetryHandle)
}

fn install_subscriber(config: &Config) -> Result<(), TelemetryError> {
    let subscriber = build_subscriber(config)?;
    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}

fn build_subscriber(config: &Config) -> Result<Box<dyn Subscriber + Send + Sync>, TelemetryError> {
    let directives = EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;
    let events = fmt::Subscriber::builder()
        .with_env_filter(directives)
        .with_target(true)
        .with_thread_names(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(events.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(events.compact().finish()),
    };
    Ok(subscriber)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_filter_before_installing() {
        let config = Config {
            log_filter: String::from("sentinel=loudest"),
            ..Config::default()
        };
        let error = build_subscriber(&config)
            .err()
            .expect("filter must be rejected");
        assert!(matches!(error, TelemetryError::Filter(_)));
    }

    #[test]
    fn builds_both_formats() {
        for format in [LogFormat::Json, LogFormat::Compact] {
            let config = Config {
                log_format: format,
                ..Config::default()
            };
            assert!(build_subscriber(&config).is_ok());
        }
    }
}
