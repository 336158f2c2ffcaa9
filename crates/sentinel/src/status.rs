//! Serialisable snapshot of the supervisor's groups.

use serde::Serialize;

use crate::lifecycle::UnitOutcome;

/// Lifecycle stage of a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerState {
    /// No configuration has been ingested yet.
    Uninitialized,
    /// Groups are built; units may be running.
    Initialized,
    /// Groups were drained and cleared.
    Destroyed,
}

/// Which kind of unit fills a group's slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    /// Thread-backed workers.
    InProcess,
    /// Spawned OS processes.
    ExternalProcess,
}

/// Point-in-time view of a manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagerStatus {
    /// Lifecycle stage.
    pub state: ManagerState,
    /// Whether a shutdown or kill was requested.
    pub shutting_down: bool,
    /// Every group, plugins first, in declaration order.
    pub groups: Vec<GroupStatus>,
}

impl ManagerStatus {
    /// Looks up a group by name.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&GroupStatus> {
        self.groups.iter().find(|group| group.name == name)
    }
}

/// Point-in-time view of one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupStatus {
    /// Group name.
    pub name: String,
    /// Unit kind.
    pub kind: GroupKind,
    /// Configured number of slots.
    pub replica_count: usize,
    /// Managed or explicit port of a process group.
    pub port: Option<u16>,
    /// Whether the group's managed listener is bound.
    pub listener_open: bool,
    /// Per-slot detail.
    pub slots: Vec<SlotStatus>,
}

/// Point-in-time view of one slot.
///
/// `running` reflects the last observation; it is not a fresh liveness probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotStatus {
    /// Slot index.
    pub index: usize,
    /// Thread identity or process id of the unit in the slot.
    pub identity: Option<String>,
    /// Whether the unit in the slot has been started.
    pub started: bool,
    /// Whether the unit was started and has no terminal outcome yet.
    pub running: bool,
    /// Outcome of the last unit reaped from this slot.
    pub last_outcome: Option<UnitOutcome>,
}
