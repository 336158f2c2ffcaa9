//! Per-group slot bookkeeping.
//!
//! Every configured group owns a fixed-length [`SlotTable`]: slot `i` holds at
//! most one worker unit plus the outcome of the last unit reaped from it. The
//! slot index is the stable identity; the unit inside comes and goes between
//! runs.

mod plugin;
mod process;

use tracing::info;

pub use self::plugin::PluginGroup;
pub use self::process::ProcessGroup;

use crate::lifecycle::{Lifecycle, UnitOutcome};
use crate::status::SlotStatus;

const GROUP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::group");

/// Fixed-length sequence of optional worker units with their last outcomes.
#[derive(Debug)]
pub struct SlotTable<T> {
    units: Vec<Option<T>>,
    last_error: Vec<Option<UnitOutcome>>,
}

/// Result of one monitoring pass over a slot table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct MonitorPass {
    /// Units observed alive before reaping.
    pub(crate) alive: usize,
    /// Slots reaped during this pass.
    pub(crate) reaped: Vec<usize>,
}

impl<T: Lifecycle> SlotTable<T> {
    pub(crate) fn from_units(units: Vec<T>) -> Self {
        let last_error = vec![None; units.len()];
        Self {
            units: units.into_iter().map(Some).collect(),
            last_error,
        }
    }

    /// Number of slots, the group's replica count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// `true` for a table without slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Unit currently held by `slot`.
    #[must_use]
    pub fn unit(&self, slot: usize) -> Option<&T> {
        self.units.get(slot).and_then(Option::as_ref)
    }

    /// Outcome of the last unit reaped from `slot`.
    #[must_use]
    pub fn last_error(&self, slot: usize) -> Option<&UnitOutcome> {
        self.last_error.get(slot).and_then(Option::as_ref)
    }

    /// Number of slots currently holding a unit.
    #[must_use]
    pub fn occupied(&self) -> usize {
        self.units.iter().flatten().count()
    }

    /// `true` once every slot is empty.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.units.iter().all(Option::is_none)
    }

    pub(crate) fn unit_mut(&mut self, slot: usize) -> Option<&mut T> {
        self.units.get_mut(slot).and_then(Option::as_mut)
    }

    /// Units currently held, in slot order.
    pub(crate) fn units_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.units.iter_mut().flatten()
    }

    /// Puts `unit` into `slot`, replacing whatever was there.
    pub(crate) fn fill(&mut self, slot: usize, unit: T) {
        if let Some(entry) = self.units.get_mut(slot) {
            *entry = Some(unit);
        }
    }

    /// Signals every live unit, gracefully or by force. Returns the number of
    /// units signalled.
    pub(crate) fn signal(&mut self, kill: bool) -> usize {
        let mut signalled = 0;
        for unit in self.units.iter_mut().flatten() {
            if !unit.is_alive() {
                continue;
            }
            if kill {
                unit.force_kill();
            } else {
                unit.request_shutdown();
            }
            signalled += 1;
        }
        signalled
    }

    /// Polls every unit and reaps the ones that started and are no longer
    /// alive, recording their outcome and emptying their slot.
    pub(crate) fn reap(&mut self, group: &str) -> MonitorPass {
        let mut pass = MonitorPass::default();
        for (slot, (entry, last)) in self
            .units
            .iter_mut()
            .zip(self.last_error.iter_mut())
            .enumerate()
        {
            let Some(unit) = entry.as_mut() else {
                continue;
            };
            if unit.is_alive() {
                pass.alive += 1;
                continue;
            }
            if !unit.has_started() {
                continue;
            }
            let outcome = unit.outcome();
            info!(
                target: GROUP_TARGET,
                group,
                slot,
                identity = %unit.identity(),
                code = outcome.as_ref().map(|outcome| outcome.code),
                "unit reaped"
            );
            *last = outcome;
            *entry = None;
            pass.reaped.push(slot);
        }
        pass
    }

    pub(crate) fn snapshot(&self) -> Vec<SlotStatus> {
        self.units
            .iter()
            .zip(&self.last_error)
            .enumerate()
            .map(|(index, (unit, last))| SlotStatus {
                index,
                identity: unit
                    .as_ref()
                    .map(Lifecycle::identity)
                    .filter(|identity| !identity.is_empty()),
                started: unit.as_ref().is_some_and(Lifecycle::has_started),
                running: unit
                    .as_ref()
                    .is_some_and(|unit| unit.has_started() && unit.outcome().is_none()),
                last_outcome: last.clone(),
            })
            .collect()
    }
}
