//! In-process worker groups.

use std::sync::Arc;

use sentinel_config::{Config, PluginEntry};
use tracing::debug;

use super::{GROUP_TARGET, SlotTable};
use crate::error::SentinelError;
use crate::lifecycle::Lifecycle;
use crate::pod::{self, Pod, PodProvider};
use crate::shutdown::ShutdownFlags;
use crate::status::{GroupKind, GroupStatus};
use crate::task::TaskFactory;
use crate::worker::InProcessWorker;

/// A named pool of identical in-process workers.
pub struct PluginGroup {
    name: String,
    module_path: String,
    poll_interval: f64,
    factory: TaskFactory,
    pod_required: bool,
    flags: ShutdownFlags,
    slots: SlotTable<InProcessWorker>,
    pods: Vec<Option<Arc<dyn Pod>>>,
}

impl PluginGroup {
    /// Builds the group and one unstarted worker per replica.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the replica count is out of range.
    pub fn new(
        entry: &PluginEntry,
        factory: TaskFactory,
        flags: ShutdownFlags,
    ) -> Result<Self, SentinelError> {
        let count = entry.replica_count()?;
        let mut group = Self {
            name: entry.name.clone(),
            module_path: entry.module_path.clone(),
            poll_interval: entry.proc_interval,
            factory,
            pod_required: false,
            flags,
            slots: SlotTable::from_units(Vec::new()),
            pods: vec![None; count],
        };
        let units: Vec<InProcessWorker> = (0..count).map(|slot| group.build_unit(slot)).collect();
        group.pod_required = units
            .first()
            .is_some_and(InProcessWorker::requires_shared_resource);
        group.slots = SlotTable::from_units(units);
        Ok(group)
    }

    /// Group name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Module path the task type was resolved from.
    #[must_use]
    pub fn module_path(&self) -> &str {
        &self.module_path
    }

    /// Whether each worker needs a pod.
    #[must_use]
    pub const fn pod_required(&self) -> bool {
        self.pod_required
    }

    /// Slot table of the group.
    #[must_use]
    pub const fn slots(&self) -> &SlotTable<InProcessWorker> {
        &self.slots
    }

    /// Pod currently held for `slot`.
    #[must_use]
    pub fn pod(&self, slot: usize) -> Option<&Arc<dyn Pod>> {
        self.pods.get(slot).and_then(Option::as_ref)
    }

    /// Allocation phase of a start: reaps finished workers, refills empty
    /// slots with fresh workers and provisions a pod for every slot that
    /// needs one. Nothing is started.
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::Pod`] when a required pod cannot be built.
    pub(crate) fn prepare<P>(&mut self, config: &Config, provider: &P) -> Result<(), SentinelError>
    where
        P: PodProvider + ?Sized,
    {
        self.monitor();
        for slot in 0..self.slots.len() {
            if self.slots.unit(slot).is_none() {
                let fresh = self.build_unit(slot);
                self.slots.fill(slot, fresh);
            }
            if !self.pod_required {
                continue;
            }
            let resource = self.ensure_pod(slot, config, provider)?;
            if let Some(unit) = self.slots.unit_mut(slot)
                && !unit.has_started()
            {
                unit.attach_resource(resource);
            }
        }
        Ok(())
    }

    /// Start phase: starts every worker that has not been started yet.
    /// Returns the number of workers started.
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::ThreadSpawn`] when a thread cannot be created.
    pub(crate) fn launch(&mut self) -> Result<usize, SentinelError> {
        let mut started = 0;
        for unit in self.slots.units_mut() {
            if !unit.has_started() {
                unit.start()?;
                started += 1;
            }
        }
        Ok(started)
    }

    /// Signals every live worker. Returns the number signalled.
    pub(crate) fn signal(&mut self, kill: bool) -> usize {
        self.slots.signal(kill)
    }

    /// Reaps finished workers, releasing their pods. Returns the number of
    /// workers alive before reaping.
    pub(crate) fn monitor(&mut self) -> usize {
        let pass = self.slots.reap(&self.name);
        for slot in pass.reaped {
            self.release_pod(slot);
        }
        pass.alive
    }

    /// Releases every pod still held by the group.
    pub(crate) fn release_pods(&mut self) {
        for slot in 0..self.pods.len() {
            self.release_pod(slot);
        }
    }

    pub(crate) fn status(&self) -> GroupStatus {
        GroupStatus {
            name: self.name.clone(),
            kind: GroupKind::InProcess,
            replica_count: self.slots.len(),
            port: None,
            listener_open: false,
            slots: self.slots.snapshot(),
        }
    }

    fn build_unit(&self, slot: usize) -> InProcessWorker {
        let unit = InProcessWorker::new(&self.name, slot, (self.factory)(), self.flags.clone());
        unit.set_poll_interval(self.poll_interval);
        unit
    }

    fn ensure_pod<P>(
        &mut self,
        slot: usize,
        config: &Config,
        provider: &P,
    ) -> Result<Arc<dyn Pod>, SentinelError>
    where
        P: PodProvider + ?Sized,
    {
        if let Some(existing) = self.pod(slot) {
            return Ok(Arc::clone(existing));
        }
        let created =
            pod::provision(provider, config, &self.name).map_err(|source| SentinelError::Pod {
                group: self.name.clone(),
                slot,
                source,
            })?;
        debug!(target: GROUP_TARGET, group = %self.name, slot, "pod provisioned");
        if let Some(entry) = self.pods.get_mut(slot) {
            *entry = Some(Arc::clone(&created));
        }
        Ok(created)
    }

    fn release_pod(&mut self, slot: usize) {
        if let Some(resource) = self.pods.get_mut(slot).and_then(Option::take) {
            pod::release(resource.as_ref());
            debug!(target: GROUP_TARGET, group = %self.name, slot, "pod released");
        }
    }
}

impl std::fmt::Debug for PluginGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginGroup")
            .field("name", &self.name)
            .field("module_path", &self.module_path)
            .field("poll_interval", &self.poll_interval)
            .field("pod_required", &self.pod_required)
            .field("slots", &self.slots)
            .field("pods", &self.pods)
            .finish_non_exhaustive()
    }
}
