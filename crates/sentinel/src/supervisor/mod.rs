//! The sentinel manager: builds worker groups from configuration, starts them
//! in two phases, reaps finished units and drains everything on teardown.
//!
//! The manager is driven synchronously by an outer loop. It never spawns a
//! thread of its own; worker threads and child processes report back only
//! through their terminal outcome, which monitoring reads and records.

use std::collections::HashSet;
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use serde_json::Value;
use tracing::{debug, info, warn};

use sentinel_config::{
    Config, ConfigDocument, ConfigError, PluginEntry, PortAllocator, ProcessEntry, ServicesConfig,
};

use crate::error::SentinelError;
use crate::group::{PluginGroup, ProcessGroup};
use crate::listener::ListenerSettings;
use crate::pod::{NoPods, PodProvider};
use crate::registry::TaskResolver;
use crate::shutdown::ShutdownFlags;
use crate::status::{ManagerState, ManagerStatus};
use crate::task::TaskFactory;

const SUPERVISOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::supervisor");

/// Budget used by `destroy` when the manager is dropped or re-initialised.
pub const DEFAULT_DESTROY_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause between two retries of the drain loop.
pub const DRAIN_STEP: Duration = Duration::from_millis(200);

const MONITOR_WAIT_STEP: Duration = Duration::from_millis(50);

/// Selects which sections an operation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Services {
    /// In-process worker groups.
    pub plugins: bool,
    /// External process groups.
    pub processes: bool,
}

impl Services {
    /// Both sections.
    pub const ALL: Self = Self {
        plugins: true,
        processes: true,
    };

    /// In-process worker groups only.
    pub const PLUGINS: Self = Self {
        plugins: true,
        processes: false,
    };

    /// External process groups only.
    pub const PROCESSES: Self = Self {
        plugins: false,
        processes: true,
    };
}

impl Default for Services {
    fn default() -> Self {
        Self::ALL
    }
}

/// Supervisor of every configured worker group.
pub struct SentinelManager<R, P = NoPods> {
    config: Config,
    resolver: R,
    pods: P,
    state: ManagerState,
    flags: ShutdownFlags,
    plugins: Vec<PluginGroup>,
    processes: Vec<ProcessGroup>,
}

impl<R, P> SentinelManager<R, P> {
    /// Creates an uninitialised manager.
    #[must_use]
    pub fn new(config: Config, resolver: R, pods: P) -> Self {
        Self {
            config,
            resolver,
            pods,
            state: ManagerState::Uninitialized,
            flags: ShutdownFlags::new(),
            plugins: Vec::new(),
            processes: Vec::new(),
        }
    }

    /// Manager-level settings.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Lifecycle stage.
    #[must_use]
    pub const fn state(&self) -> ManagerState {
        self.state
    }

    /// Flags handed to running tasks. Replaced on every `initialize`.
    #[must_use]
    pub fn flags(&self) -> ShutdownFlags {
        self.flags.clone()
    }

    /// `true` once `shutdown` or `kill` was called, until the next
    /// `initialize`.
    #[must_use]
    pub fn shutting_down(&self) -> bool {
        self.flags.shutting_down()
    }

    /// In-process groups in declaration order.
    #[must_use]
    pub fn plugin_groups(&self) -> &[PluginGroup] {
        &self.plugins
    }

    /// Process groups in declaration order.
    #[must_use]
    pub fn process_groups(&self) -> &[ProcessGroup] {
        &self.processes
    }

    /// Looks up an in-process group by name.
    #[must_use]
    pub fn plugin_group(&self, name: &str) -> Option<&PluginGroup> {
        self.plugins.iter().find(|group| group.name() == name)
    }

    /// Looks up a process group by name.
    #[must_use]
    pub fn process_group(&self, name: &str) -> Option<&ProcessGroup> {
        self.processes.iter().find(|group| group.name() == name)
    }

    /// Snapshot of every group.
    #[must_use]
    pub fn status(&self) -> ManagerStatus {
        ManagerStatus {
            state: self.state,
            shutting_down: self.shutting_down(),
            groups: self
                .plugins
                .iter()
                .map(PluginGroup::status)
                .chain(self.processes.iter().map(ProcessGroup::status))
                .collect(),
        }
    }

    /// Signals every live unit of the selected sections, gracefully or by
    /// force. Returns the number of units signalled.
    pub fn shutdown_services(&mut self, services: Services, kill: bool) -> usize {
        let mut signalled = 0;
        if services.plugins {
            signalled += self
                .plugins
                .iter_mut()
                .map(|group| group.signal(kill))
                .sum::<usize>();
        }
        if services.processes {
            signalled += self
                .processes
                .iter_mut()
                .map(|group| group.signal(kill))
                .sum::<usize>();
        }
        debug!(target: SUPERVISOR_TARGET, signalled, kill, "shutdown signalled");
        signalled
    }

    /// Requests a graceful stop of everything and raises the terminating
    /// flag. Returns the number of units signalled.
    pub fn shutdown(&mut self) -> usize {
        self.flags.terminate();
        info!(target: SUPERVISOR_TARGET, "graceful shutdown requested");
        self.shutdown_services(Services::ALL, false)
    }

    /// Force-stops everything and raises the killed flag. Returns the number
    /// of units signalled.
    pub fn kill(&mut self) -> usize {
        self.flags.kill();
        warn!(target: SUPERVISOR_TARGET, "kill requested");
        self.shutdown_services(Services::ALL, true)
    }

    /// Reaps finished in-process workers. Returns the number alive before
    /// reaping.
    pub fn monitor_plugins(&mut self) -> usize {
        self.plugins.iter_mut().map(PluginGroup::monitor).sum()
    }

    /// Reaps exited processes. Returns the number alive before reaping.
    pub fn monitor_processes(&mut self) -> usize {
        self.processes.iter_mut().map(ProcessGroup::monitor).sum()
    }

    /// Monitors both sections. With `wait`, each section is polled until it
    /// reports no live unit, which blocks for as long as units keep running.
    pub fn monitor_services(&mut self, wait: bool) -> usize {
        if !wait {
            return self.monitor_plugins() + self.monitor_processes();
        }
        while self.monitor_plugins() > 0 {
            thread::sleep(MONITOR_WAIT_STEP);
        }
        while self.monitor_processes() > 0 {
            thread::sleep(MONITOR_WAIT_STEP);
        }
        0
    }

    /// Drains every unit within `max_time`, then clears all groups.
    ///
    /// Each retry force-stops whatever is still alive, so every live unit is
    /// killed at least once even with a zero budget. Once `max_time` has
    /// elapsed the loop gives up, so stragglers may outlive the call.
    pub fn destroy(&mut self, max_time: Duration) {
        let started = Instant::now();
        loop {
            let alive = self.monitor_services(false);
            if alive == 0 {
                break;
            }
            self.shutdown_services(Services::ALL, true);
            let elapsed = started.elapsed();
            if elapsed >= max_time {
                warn!(
                    target: SUPERVISOR_TARGET,
                    alive,
                    budget_ms = u64::try_from(max_time.as_millis()).unwrap_or(u64::MAX),
                    "drain budget exhausted"
                );
                break;
            }
            thread::sleep(DRAIN_STEP.min(max_time.saturating_sub(elapsed)));
        }

        for group in &mut self.plugins {
            group.release_pods();
        }
        for group in &mut self.processes {
            group.close_listener();
        }
        self.plugins.clear();
        self.processes.clear();
        if self.state == ManagerState::Initialized {
            info!(target: SUPERVISOR_TARGET, "manager destroyed");
        }
        self.state = ManagerState::Destroyed;
    }
}

impl<R, P> SentinelManager<R, P>
where
    R: TaskResolver,
{
    /// Builds every active group from a configuration document.
    ///
    /// An initialised manager is destroyed first. On error the manager is
    /// left without groups.
    ///
    /// # Errors
    ///
    /// Returns a [`SentinelError`] for a malformed document, a duplicate
    /// name, an invalid entry, an unresolvable task type or an exhausted
    /// port range.
    pub fn initialize(&mut self, document: &Value) -> Result<(), SentinelError> {
        if self.state == ManagerState::Initialized {
            self.destroy(DEFAULT_DESTROY_TIMEOUT);
        }
        self.flags = ShutdownFlags::new();

        let services = ServicesConfig::from_value(document)?;
        let plugins: Vec<&PluginEntry> = services
            .pluggins
            .iter()
            .filter(|entry| is_active(entry.active, &entry.name))
            .collect();
        let processes: Vec<&ProcessEntry> = services
            .processes
            .iter()
            .filter(|entry| is_active(entry.active, &entry.name))
            .collect();
        ensure_unique(
            plugins
                .iter()
                .map(|entry| entry.name.as_str())
                .chain(processes.iter().map(|entry| entry.name.as_str())),
        )?;
        for entry in &plugins {
            entry.validate()?;
        }
        for entry in &processes {
            entry.validate(self.config.home_path())?;
        }

        let factories = plugins
            .iter()
            .map(|entry| self.resolve(entry))
            .collect::<Result<Vec<_>, _>>()?;
        let plugin_groups = plugins
            .iter()
            .zip(factories)
            .map(|(entry, factory)| PluginGroup::new(entry, factory, self.flags.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut ports = PortAllocator::new(self.config.port);
        let mut process_groups = Vec::with_capacity(processes.len());
        for entry in &processes {
            let managed = if entry.manage_port {
                Some(ports.allocate(&entry.name)?)
            } else {
                None
            };
            process_groups.push(ProcessGroup::new(
                entry,
                self.config.home_path(),
                managed,
            )?);
        }

        info!(
            target: SUPERVISOR_TARGET,
            plugins = plugin_groups.len(),
            processes = process_groups.len(),
            "manager initialized"
        );
        self.plugins = plugin_groups;
        self.processes = process_groups;
        self.state = ManagerState::Initialized;
        Ok(())
    }

    /// Loads a configuration file, adopts its manager-level settings and
    /// initialises from it.
    ///
    /// # Errors
    ///
    /// Returns the load error, or any error of [`Self::initialize`].
    pub fn initialize_from_path(&mut self, path: &Utf8Path) -> Result<(), SentinelError> {
        let document = ConfigDocument::load(path)?;
        if self.state == ManagerState::Initialized {
            self.destroy(DEFAULT_DESTROY_TIMEOUT);
        }
        self.config = document.config;
        self.initialize(&document.services)
    }

    fn resolve(&self, entry: &PluginEntry) -> Result<TaskFactory, SentinelError> {
        self.resolver
            .resolve(&entry.module_path)
            .map_err(|source| SentinelError::Resolve {
                group: entry.name.clone(),
                module_path: entry.module_path.clone(),
                source,
            })
    }
}

impl<R, P> SentinelManager<R, P>
where
    P: PodProvider,
{
    /// Starts the selected sections in two phases.
    ///
    /// The first phase allocates resources for every selected group: managed
    /// listeners are bound, pods are provisioned and reaped slots are
    /// refilled. Only once that has succeeded for all groups does the second
    /// phase start the units. Returns the number of units started.
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::Listener`] or [`SentinelError::Pod`] from the
    /// first phase, in which case nothing is started, and thread-spawn errors
    /// from the second.
    pub fn start_services(&mut self, services: Services) -> Result<usize, SentinelError> {
        let settings = ListenerSettings::from_config(&self.config);
        if services.plugins {
            for group in &mut self.plugins {
                group.prepare(&self.config, &self.pods)?;
            }
        }
        if services.processes {
            for group in &mut self.processes {
                group.prepare(&settings)?;
            }
        }

        let mut started = 0;
        if services.plugins {
            for group in &mut self.plugins {
                started += group.launch()?;
            }
        }
        if services.processes {
            for group in &mut self.processes {
                started += group.launch()?;
            }
        }
        info!(target: SUPERVISOR_TARGET, started, "services started");
        Ok(started)
    }
}

impl<R, P> Drop for SentinelManager<R, P> {
    fn drop(&mut self) {
        if self.state == ManagerState::Initialized {
            self.destroy(DEFAULT_DESTROY_TIMEOUT);
        }
    }
}

impl<R, P> fmt::Debug for SentinelManager<R, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SentinelManager")
            .field("state", &self.state)
            .field("shutting_down", &self.shutting_down())
            .field("plugins", &self.plugins)
            .field("processes", &self.processes)
            .finish_non_exhaustive()
    }
}

fn is_active(active: bool, name: &str) -> bool {
    if !active {
        info!(target: SUPERVISOR_TARGET, group = name, "skipping inactive group");
    }
    active
}

fn ensure_unique<'a>(names: impl Iterator<Item = &'a str>) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ConfigError::DuplicateName {
                name: name.to_owned(),
            });
        }
    }
    Ok(())
}
