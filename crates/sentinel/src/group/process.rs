//! External process groups and their managed listeners.

use std::os::fd::RawFd;
use std::path::PathBuf;

use camino::Utf8Path;
use sentinel_config::ProcessEntry;

use super::SlotTable;
use crate::error::SentinelError;
use crate::lifecycle::Lifecycle;
use crate::listener::{ListenerSettings, ManagedListener, PORT_FLAG, managed_port_value};
use crate::status::{GroupKind, GroupStatus};
use crate::worker::ExternalProcess;

/// A named pool of identical external processes.
#[derive(Debug)]
pub struct ProcessGroup {
    name: String,
    executable: PathBuf,
    extra_args: Vec<String>,
    working_dir: PathBuf,
    port: Option<u16>,
    share_descriptor: bool,
    listener: Option<ManagedListener>,
    slots: SlotTable<ExternalProcess>,
}

impl ProcessGroup {
    /// Builds the group and one unstarted process per replica.
    ///
    /// `managed_port` is the port assigned by the supervisor for groups with
    /// `manage-port`; other groups use their explicit port, if any.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid replica count or port.
    pub fn new(
        entry: &ProcessEntry,
        home: &Utf8Path,
        managed_port: Option<u16>,
    ) -> Result<Self, SentinelError> {
        let count = entry.replica_count()?;
        let (port, listener) = match managed_port {
            Some(port) if entry.manage_port => {
                (Some(port), Some(ManagedListener::new(entry.name.clone(), port)))
            }
            _ => (entry.explicit_port()?, None),
        };
        let mut group = Self {
            name: entry.name.clone(),
            executable: entry.executable(home).into_std_path_buf(),
            extra_args: entry.arguments(),
            working_dir: home.as_std_path().to_path_buf(),
            port,
            share_descriptor: entry.share_descriptor,
            listener,
            slots: SlotTable::from_units(Vec::new()),
        };
        let units = (0..count).map(|slot| group.build_unit(slot)).collect();
        group.slots = SlotTable::from_units(units);
        Ok(group)
    }

    /// Group name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Port assigned to the group, managed or explicit.
    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        self.port
    }

    /// Whether the supervisor owns a listener for the group.
    #[must_use]
    pub const fn manages_port(&self) -> bool {
        self.listener.is_some()
    }

    /// The group's managed listener, if it has one.
    #[must_use]
    pub const fn listener(&self) -> Option<&ManagedListener> {
        self.listener.as_ref()
    }

    /// Slot table of the group.
    #[must_use]
    pub const fn slots(&self) -> &SlotTable<ExternalProcess> {
        &self.slots
    }

    /// Allocation phase of a start: reaps finished processes, opens the
    /// managed listener and rebuilds every unstarted slot so its arguments
    /// carry the listener's descriptor. Nothing is spawned.
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::Listener`] when the listener cannot be bound.
    pub(crate) fn prepare(&mut self, settings: &ListenerSettings) -> Result<(), SentinelError> {
        self.monitor();
        if let Some(listener) = self.listener.as_mut() {
            listener.open(settings)?;
        }
        for slot in 0..self.slots.len() {
            if self.slots.unit(slot).is_none_or(|unit| !unit.has_started()) {
                let fresh = self.build_unit(slot);
                self.slots.fill(slot, fresh);
            }
        }
        Ok(())
    }

    /// Start phase: spawns every process that has not been started yet.
    /// Returns the number of processes started.
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::AlreadyRunning`] if a slot's previous run is
    /// unexpectedly still alive.
    pub(crate) fn launch(&mut self) -> Result<usize, SentinelError> {
        let inherited: Vec<_> = self.shared_descriptor().into_iter().collect();
        let mut started = 0;
        for unit in self.slots.units_mut() {
            if !unit.has_started() {
                unit.start(&inherited)?;
                started += 1;
            }
        }
        Ok(started)
    }

    /// Signals every live process. Returns the number signalled.
    pub(crate) fn signal(&mut self, kill: bool) -> usize {
        self.slots.signal(kill)
    }

    /// Reaps exited processes and closes the listener once every slot is
    /// empty. Returns the number of processes alive before reaping.
    pub(crate) fn monitor(&mut self) -> usize {
        let pass = self.slots.reap(&self.name);
        if self.slots.is_drained() {
            self.close_listener();
        }
        pass.alive
    }

    /// Closes the managed listener, if open.
    pub(crate) fn close_listener(&mut self) {
        if let Some(listener) = self.listener.as_mut() {
            listener.close();
        }
    }

    pub(crate) fn status(&self) -> GroupStatus {
        GroupStatus {
            name: self.name.clone(),
            kind: GroupKind::ExternalProcess,
            replica_count: self.slots.len(),
            port: self.port,
            listener_open: self.listener.as_ref().is_some_and(ManagedListener::is_open),
            slots: self.slots.snapshot(),
        }
    }

    fn shared_descriptor(&self) -> Option<RawFd> {
        if !self.share_descriptor {
            return None;
        }
        self.listener.as_ref().and_then(ManagedListener::descriptor)
    }

    fn command_args(&self) -> Vec<String> {
        let mut args = self.extra_args.clone();
        let port_value = match (&self.listener, self.port) {
            (Some(listener), _) => Some(managed_port_value(
                listener.port(),
                self.shared_descriptor(),
            )),
            (None, Some(port)) => Some(port.to_string()),
            (None, None) => None,
        };
        if let Some(value) = port_value {
            args.push(String::from(PORT_FLAG));
            args.push(value);
        }
        args
    }

    fn build_unit(&self, slot: usize) -> ExternalProcess {
        ExternalProcess::new(
            format!("{}:{slot}", self.name),
            self.executable.clone(),
            self.command_args(),
        )
        .with_working_dir(self.working_dir.clone())
    }
}
