//! The sentinel daemon.
//!
//! `sentineld` loads a configuration document, installs structured logging
//! and signal handlers, builds a [`SentinelManager`] over the bundled task
//! registry and drives it until every worker group has stopped.
//!
//! Signals are mapped onto the manager's own shutdown protocol: SIGINT and
//! SIGTERM request a graceful stop, SIGQUIT forces one. Once nothing is left
//! alive the manager is drained within `destroy_timeout` seconds.

pub mod builtin;
pub mod cli;
pub mod error;
pub mod runtime;
pub mod signals;
pub mod telemetry;

use sentinel::{NoPods, SentinelManager, Services};
use sentinel_config::ConfigDocument;
use tracing::info;

pub use self::cli::Cli;
pub use self::error::DaemonError;
pub use self::runtime::{LoopSettings, RunSummary, supervise};
pub use self::signals::{Request, SignalFlags};
pub use self::telemetry::{TelemetryError, TelemetryHandle};

const DAEMON_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::daemon");

/// Runs the daemon until every unit has stopped.
///
/// # Errors
///
/// Returns a [`DaemonError`] when the configuration cannot be loaded or is
/// rejected, when logging or signal handlers cannot be installed, or when the
/// first start of the services fails.
pub fn run(cli: &Cli) -> Result<RunSummary, DaemonError> {
    let document = ConfigDocument::load(&cli.config)?;
    let mut config = document.config;
    cli.apply(&mut config);
    telemetry::initialise(&config)?;

    let signals = SignalFlags::new();
    signals.install().map_err(DaemonError::Signals)?;

    let settings = LoopSettings {
        period: config.monitor_period(),
        drain_budget: config.drain_budget(),
    };
    let mut manager = SentinelManager::new(config, builtin::registry()?, NoPods);
    manager.initialize(&document.services)?;
    let started = manager.start_services(Services::ALL)?;
    info!(target: DAEMON_TARGET, config = %cli.config, started, "sentinel running");

    let summary = supervise(&mut manager, &signals, settings);
    info!(
        target: DAEMON_TARGET,
        passes = summary.passes,
        request = ?summary.request,
        "sentinel stopped"
    );
    Ok(summary)
}
