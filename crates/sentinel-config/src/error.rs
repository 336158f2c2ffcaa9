//! Errors raised while loading or validating sentinel configuration.

use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Configuration failures. All of them are fatal to `initialize`.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration '{path}': {source}")]
    Read {
        /// File that was read.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The configuration file is not valid JSON or has mistyped fields.
    #[error("failed to parse configuration '{path}': {source}")]
    Parse {
        /// File that was parsed.
        path: Utf8PathBuf,
        /// Underlying JSON error.
        #[source]
        source: Arc<serde_json::Error>,
    },

    /// A section was present but had the wrong shape.
    #[error("configuration section '{section}' must be {expected}")]
    MalformedSection {
        /// Dotted section name, for example `sentinel.processes`.
        section: String,
        /// Shape that was expected ("an object", "a list").
        expected: &'static str,
    },

    /// An entry inside a section could not be decoded.
    #[error("entry {index} of '{section}' is invalid: {source}")]
    MalformedEntry {
        /// Dotted section name.
        section: String,
        /// Position of the entry in the section.
        index: usize,
        /// Underlying JSON error.
        #[source]
        source: Arc<serde_json::Error>,
    },

    /// An entry had an empty name.
    #[error("entry {index} of '{section}' has an empty name")]
    EmptyName {
        /// Dotted section name.
        section: String,
        /// Position of the entry in the section.
        index: usize,
    },

    /// A name contained a control character such as NUL.
    #[error("entry {index} of '{section}' has a name with control characters: {name:?}")]
    InvalidName {
        /// Dotted section name.
        section: String,
        /// Position of the entry in the section.
        index: usize,
        /// The rejected name.
        name: String,
    },

    /// Two groups share the same name.
    #[error("group name '{name}' is declared more than once")]
    DuplicateName {
        /// The repeated name.
        name: String,
    },

    /// The replica count is outside `1..=256`.
    #[error("group '{name}' has run-count {value}, expected 1..=256")]
    RunCountOutOfRange {
        /// Group name.
        name: String,
        /// Configured value.
        value: i64,
    },

    /// An explicit port is outside `1..=65535`.
    #[error("group '{name}' has port {value}, expected 1..=65535")]
    InvalidPort {
        /// Group name.
        name: String,
        /// Configured value.
        value: i64,
    },

    /// The managed-port counter ran past the last valid port.
    #[error("no managed port left for group '{name}' (base port {base})")]
    PortsExhausted {
        /// Group that asked for a port.
        name: String,
        /// Configured base port.
        base: u16,
    },

    /// The process executable does not exist or is not a regular file.
    #[error("group '{name}' executable is not a regular file: {path}")]
    ExecutableNotFound {
        /// Group name.
        name: String,
        /// Path that was checked.
        path: Utf8PathBuf,
    },
}
