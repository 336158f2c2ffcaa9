//! Domain errors raised by supervisor operations.
//!
//! Only configuration and resource-allocation failures surface here. Runtime
//! failures of individual units are absorbed into each unit's terminal
//! outcome and read back through monitoring. I/O errors are wrapped in `Arc`
//! to keep the enum cheap to clone and within the `result_large_err` budget.

use std::sync::Arc;

use thiserror::Error;

use sentinel_config::ConfigError;

/// Errors surfaced to the caller of the supervisor.
#[derive(Debug, Clone, Error)]
pub enum SentinelError {
    /// The configuration document was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A plugin's module path could not be resolved to a task type.
    #[error("group '{group}' cannot resolve task '{module_path}': {source}")]
    Resolve {
        /// Group being built.
        group: String,
        /// Configured module path.
        module_path: String,
        /// Resolver failure.
        #[source]
        source: ResolveError,
    },

    /// A task name was registered twice.
    #[error("task '{name}' is already registered")]
    Registration {
        /// Name that was registered twice.
        name: String,
    },

    /// A process was started while its previous run is still alive.
    #[error("process '{label}' is still running with pid {pid}")]
    AlreadyRunning {
        /// Unit label.
        label: String,
        /// PID of the running process.
        pid: u32,
    },

    /// An in-process worker was started a second time.
    #[error("worker '{label}' has already been started")]
    AlreadyStarted {
        /// Unit label.
        label: String,
    },

    /// The OS refused to create a worker thread.
    #[error("failed to spawn thread for worker '{label}': {source}")]
    ThreadSpawn {
        /// Unit label.
        label: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A managed listener could not be bound.
    #[error("failed to open managed listener for group '{group}' on port {port}: {source}")]
    Listener {
        /// Group owning the listener.
        group: String,
        /// Port that was requested.
        port: u16,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A pod required by a worker could not be provisioned.
    #[error("failed to provision pod for group '{group}' slot {slot}: {source}")]
    Pod {
        /// Group being started.
        group: String,
        /// Slot the pod was meant for.
        slot: usize,
        /// Provider failure.
        #[source]
        source: PodError,
    },
}

/// Failures reported by a [`TaskResolver`](crate::TaskResolver).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// No task type is known under the requested path.
    #[error("no task registered under '{module_path}'")]
    NotFound {
        /// Path that was looked up.
        module_path: String,
    },

    /// The path was found but does not name a constructible task.
    #[error("'{module_path}' is not a valid task: {message}")]
    Invalid {
        /// Path that was looked up.
        module_path: String,
        /// Why the resolver rejected it.
        message: String,
    },
}

/// Failures reported by a [`PodProvider`](crate::PodProvider).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PodError {
    /// The provider is not able to create pods at all.
    #[error("no pod provider is configured")]
    Unavailable,

    /// Opening the underlying connection failed.
    #[error("connection failed: {message}")]
    Connection {
        /// Provider-supplied description.
        message: String,
    },

    /// Building the pod on top of an open connection failed.
    #[error("pod construction failed: {message}")]
    Construction {
        /// Provider-supplied description.
        message: String,
    },
}
