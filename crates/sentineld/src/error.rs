//! Failures that stop the daemon.

use std::io;
use std::process::ExitCode;

use sentinel::SentinelError;
use sentinel_config::ConfigError;
use thiserror::Error;

use crate::telemetry::TelemetryError;

/// Exit status for a configuration the daemon cannot run.
pub const CONFIG_EXIT: u8 = 2;

/// Errors surfaced by [`run`](crate::run).
#[derive(Debug, Error)]
pub enum DaemonError {
    /// The configuration file could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Logging could not be set up.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    /// Signal handlers could not be installed.
    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] io::Error),
    /// The supervisor rejected the configuration or failed to start.
    #[error(transparent)]
    Supervisor(#[from] SentinelError),
}

impl DaemonError {
    /// Process exit status reported for this error.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) | Self::Supervisor(SentinelError::Config(_)) => {
                ExitCode::from(CONFIG_EXIT)
            }
            _ => ExitCode::FAILURE,
        }
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;

    #[test]
    fn configuration_errors_use_dedicated_status() {
        let missing = DaemonError::Config(ConfigError::DuplicateName {
            name: String::from("dup"),
        });
        assert_eq!(missing.exit_code(), ExitCode::from(CONFIG_EXIT));

        let rejected = DaemonError::Supervisor(SentinelError::Config(
            ConfigError::ExecutableNotFound {
                name: String::from("svc"),
                path: Utf8PathBuf::from("/absent"),
            },
        ));
        assert_eq!(rejected.exit_code(), ExitCode::from(CONFIG_EXIT));
    }

    #[test]
    fn runtime_errors_use_generic_failure() {
        let error = DaemonError::Signals(io::Error::other("refused"));
        assert_eq!(error.exit_code(), ExitCode::FAILURE);
    }
}
