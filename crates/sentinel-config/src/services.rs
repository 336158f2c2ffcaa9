//! The `sentinel` section: plugin and process group declarations.
//!
//! [`ServicesConfig::from_value`] only checks the shape of the document and
//! decodes each entry. Semantic checks live on the entries themselves
//! ([`PluginEntry::validate`], [`ProcessEntry::validate`]) because the
//! supervisor runs them for active entries only.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;
use crate::expand::expand_env;

/// Top-level key holding both group sections.
pub const SENTINEL_KEY: &str = "sentinel";
/// Key of the in-process worker section.
pub const PLUGINS_KEY: &str = "pluggins";
/// Key of the external process section.
pub const PROCESSES_KEY: &str = "processes";

/// Smallest accepted `run-count`.
pub const MIN_RUN_COUNT: i64 = 1;
/// Largest accepted `run-count`.
pub const MAX_RUN_COUNT: i64 = 256;

const fn default_run_count() -> i64 {
    1
}

const fn default_proc_interval() -> f64 {
    1.0
}

const fn default_true() -> bool {
    true
}

/// Declaration of an in-process worker group.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PluginEntry {
    /// Group name, unique across both sections.
    pub name: String,
    /// Name handed to the task resolver.
    pub module_path: String,
    /// Number of replicas.
    #[serde(default = "default_run_count")]
    pub run_count: i64,
    /// Seconds between two `process()` calls.
    #[serde(default = "default_proc_interval")]
    pub proc_interval: f64,
    /// Inactive entries are skipped by the supervisor.
    #[serde(default = "default_true")]
    pub active: bool,
}

impl PluginEntry {
    /// Returns the validated replica count.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::RunCountOutOfRange`] outside `1..=256`.
    pub fn replica_count(&self) -> Result<usize, ConfigError> {
        checked_run_count(&self.name, self.run_count)
    }

    /// Checks the entry before the supervisor builds its group.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::RunCountOutOfRange`] when the replica count is
    /// invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.replica_count().map(drop)
    }
}

/// Declaration of an external process group.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProcessEntry {
    /// Group name, unique across both sections.
    pub name: String,
    /// Executable to spawn; relative paths resolve against `home_path`.
    pub proc_path: Utf8PathBuf,
    /// Extra arguments, environment-expanded and split on whitespace.
    #[serde(default)]
    pub proc_args: Option<String>,
    /// Number of replicas.
    #[serde(default = "default_run_count")]
    pub run_count: i64,
    /// Whether the supervisor pre-binds a listener for the group.
    #[serde(default)]
    pub manage_port: bool,
    /// Explicit port for groups that bind their own socket.
    #[serde(default)]
    pub port: Option<i64>,
    /// Inactive entries are skipped by the supervisor.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Whether the managed listener's descriptor is handed to the child.
    #[serde(default = "default_true")]
    pub share_descriptor: bool,
}

impl ProcessEntry {
    /// Returns the validated replica count.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::RunCountOutOfRange`] outside `1..=256`.
    pub fn replica_count(&self) -> Result<usize, ConfigError> {
        checked_run_count(&self.name, self.run_count)
    }

    /// Returns the explicit port when one is configured and valid.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPort`] outside `1..=65535`.
    pub fn explicit_port(&self) -> Result<Option<u16>, ConfigError> {
        let Some(value) = self.port else {
            return Ok(None);
        };
        u16::try_from(value)
            .ok()
            .filter(|port| *port != 0)
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidPort {
                name: self.name.clone(),
                value,
            })
    }

    /// Resolves the executable path against `home`.
    #[must_use]
    pub fn executable(&self, home: &Utf8Path) -> Utf8PathBuf {
        if self.proc_path.is_absolute() {
            self.proc_path.clone()
        } else {
            home.join(&self.proc_path)
        }
    }

    /// Expands and splits `proc-args`.
    #[must_use]
    pub fn arguments(&self) -> Vec<String> {
        self.proc_args
            .as_deref()
            .map(expand_env)
            .map(|expanded| expanded.split_whitespace().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    /// Checks the entry before the supervisor builds its group.
    ///
    /// The explicit port is only checked for groups that do not ask for a
    /// managed port.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for an invalid replica count, an invalid
    /// explicit port, or a missing executable.
    pub fn validate(&self, home: &Utf8Path) -> Result<(), ConfigError> {
        self.replica_count()?;
        if !self.manage_port {
            self.explicit_port()?;
        }
        let executable = self.executable(home);
        if !executable.is_file() {
            return Err(ConfigError::ExecutableNotFound {
                name: self.name.clone(),
                path: executable,
            });
        }
        Ok(())
    }
}

fn checked_run_count(name: &str, value: i64) -> Result<usize, ConfigError> {
    if (MIN_RUN_COUNT..=MAX_RUN_COUNT).contains(&value)
        && let Ok(count) = usize::try_from(value)
    {
        return Ok(count);
    }
    Err(ConfigError::RunCountOutOfRange {
        name: name.to_owned(),
        value,
    })
}

/// Both group sections in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServicesConfig {
    /// In-process worker groups.
    pub pluggins: Vec<PluginEntry>,
    /// External process groups.
    pub processes: Vec<ProcessEntry>,
}

impl ServicesConfig {
    /// Decodes the `sentinel` section of a configuration document.
    ///
    /// A missing `sentinel` key or a missing section yields no groups.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MalformedSection`] when the document, the
    /// `sentinel` value or a section has the wrong shape, and
    /// [`ConfigError::MalformedEntry`], [`ConfigError::EmptyName`] or
    /// [`ConfigError::InvalidName`] for an undecodable entry.
    pub fn from_value(document: &Value) -> Result<Self, ConfigError> {
        let root = document
            .as_object()
            .ok_or_else(|| ConfigError::MalformedSection {
                section: String::from("<root>"),
                expected: "an object",
            })?;
        let Some(sentinel) = root.get(SENTINEL_KEY) else {
            return Ok(Self::default());
        };
        let sections = sentinel
            .as_object()
            .ok_or_else(|| ConfigError::MalformedSection {
                section: SENTINEL_KEY.to_owned(),
                expected: "an object",
            })?;

        let pluggins: Vec<PluginEntry> = decode_section(sections.get(PLUGINS_KEY), PLUGINS_KEY)?;
        let processes: Vec<ProcessEntry> =
            decode_section(sections.get(PROCESSES_KEY), PROCESSES_KEY)?;

        check_names(pluggins.iter().map(|entry| entry.name.as_str()), PLUGINS_KEY)?;
        check_names(
            processes.iter().map(|entry| entry.name.as_str()),
            PROCESSES_KEY,
        )?;

        Ok(Self {
            pluggins,
            processes,
        })
    }
}

fn section_name(key: &str) -> String {
    format!("{SENTINEL_KEY}.{key}")
}

fn decode_section<T>(value: Option<&Value>, key: &str) -> Result<Vec<T>, ConfigError>
where
    T: DeserializeOwned,
{
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    if value.is_null() {
        return Ok(Vec::new());
    }
    let entries = value
        .as_array()
        .ok_or_else(|| ConfigError::MalformedSection {
            section: section_name(key),
            expected: "a list",
        })?;
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            if !entry.is_object() {
                return Err(ConfigError::MalformedSection {
                    section: format!("{}[{index}]", section_name(key)),
                    expected: "an object",
                });
            }
            T::deserialize(entry).map_err(|source| ConfigError::MalformedEntry {
                section: section_name(key),
                index,
                source: Arc::new(source),
            })
        })
        .collect()
}

fn check_names<'a>(names: impl Iterator<Item = &'a str>, key: &str) -> Result<(), ConfigError> {
    for (index, name) in names.enumerate() {
        if name.trim().is_empty() {
            return Err(ConfigError::EmptyName {
                section: section_name(key),
                index,
            });
        }
        if name.chars().any(char::is_control) {
            return Err(ConfigError::InvalidName {
                section: section_name(key),
                index,
                name: name.to_owned(),
            });
        }
    }
    Ok(())
}
