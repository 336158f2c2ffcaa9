//! Supervision of long-running worker units.
//!
//! The `sentinel` crate keeps a set of named worker groups alive. A group is a
//! fixed number of identical replicas, each occupying a slot. Replicas come in
//! two kinds:
//!
//! - **In-process workers** run a [`Task`] on a dedicated thread, calling
//!   [`Task::process`] at the group's poll interval until asked to stop.
//! - **External processes** are spawned OS processes whose output is drained
//!   without blocking and whose exit status is collected on reap.
//!
//! Process groups may ask the supervisor for a managed port. The supervisor
//! then binds the listener itself and passes its descriptor to every child as
//! `--port <port>:<fd>`.
//!
//! # Architecture
//!
//! [`SentinelManager`] is driven synchronously by an outer loop such as the
//! `sentineld` daemon. `initialize` builds every group from the configuration
//! document, `start_services` allocates listeners and pods for *all* groups
//! before starting any unit, `monitor_services` reaps finished units and
//! `destroy` drains everything within a time budget.
//!
//! Task types are looked up by name through a [`TaskResolver`]; the bundled
//! [`TaskRegistry`] maps names to factories. Workers that need a shared
//! resource obtain it from a [`PodProvider`].
//!
//! # Example
//!
//! ```rust,no_run
//! use sentinel::{SentinelManager, Services, Task, TaskContext, TaskError, TaskRegistry};
//! use sentinel::NoPods;
//! use sentinel_config::Config;
//!
//! struct Tick;
//!
//! impl Task for Tick {
//!     fn process(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
//!         tracing::info!(worker = ctx.label(), "tick");
//!         Ok(())
//!     }
//! }
//!
//! let mut registry = TaskRegistry::new();
//! registry.register_fn("demo::tick", || Tick).expect("registration succeeds");
//!
//! let mut manager = SentinelManager::new(Config::default(), registry, NoPods);
//! let document = serde_json::json!({
//!     "sentinel": {"pluggins": [{"name": "ticker", "module-path": "demo::tick"}]}
//! });
//! manager.initialize(&document).expect("valid configuration");
//! manager.start_services(Services::ALL).expect("start");
//! ```

pub mod error;
pub mod group;
pub mod lifecycle;
pub mod listener;
pub mod pod;
pub mod registry;
pub mod shutdown;
pub mod status;
pub mod supervisor;
pub mod task;
pub mod worker;

#[cfg(test)]
mod tests;

pub use self::error::{PodError, ResolveError, SentinelError};
pub use self::group::{PluginGroup, ProcessGroup, SlotTable};
pub use self::lifecycle::{Lifecycle, UnitOutcome};
pub use self::listener::{ListenerSettings, ManagedListener, PORT_FLAG, managed_port_value};
pub use self::pod::{Connection, NoPods, Pod, PodProvider};
pub use self::registry::{TaskRegistry, TaskResolver};
pub use self::shutdown::ShutdownFlags;
pub use self::status::{GroupKind, GroupStatus, ManagerState, ManagerStatus, SlotStatus};
pub use self::supervisor::{DEFAULT_DESTROY_TIMEOUT, DRAIN_STEP, SentinelManager, Services};
pub use self::task::{Task, TaskContext, TaskError, TaskFactory, factory};
pub use self::worker::{ExternalProcess, FailureInfo, InProcessWorker};
