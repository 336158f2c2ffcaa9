//! Business-logic seam run by in-process workers.

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::pod::Pod;
use crate::shutdown::ShutdownFlags;

/// Error type returned by task callbacks.
pub type TaskError = Box<dyn Error + Send + Sync + 'static>;

/// Constructs a fresh task instance for one worker slot.
pub type TaskFactory = Arc<dyn Fn() -> Box<dyn Task> + Send + Sync>;

/// Repeated unit of work driven by an
/// [`InProcessWorker`](crate::worker::InProcessWorker).
///
/// The worker calls [`Task::init`] once, then [`Task::process`] once per poll
/// interval until a stop is requested or a call fails. [`Task::teardown`] runs
/// after the loop in every case.
pub trait Task: Send + 'static {
    /// Prepares the task before the first `process` call.
    ///
    /// # Errors
    ///
    /// A returned error ends the worker as crashed without calling `process`.
    fn init(&mut self, _ctx: &TaskContext) -> Result<(), TaskError> {
        Ok(())
    }

    /// Performs one cycle of work.
    ///
    /// # Errors
    ///
    /// A returned error ends the worker as crashed.
    fn process(&mut self, ctx: &TaskContext) -> Result<(), TaskError>;

    /// Releases whatever `init` acquired. May be called more than once.
    fn teardown(&mut self) {}

    /// Whether the task must be given a pod before it runs.
    fn requires_pod(&self) -> bool {
        false
    }
}

/// View of the supervisor handed to a running task.
#[derive(Clone)]
pub struct TaskContext {
    label: String,
    slot: usize,
    stop: Arc<AtomicBool>,
    flags: ShutdownFlags,
    pod: Option<Arc<dyn Pod>>,
}

impl TaskContext {
    pub(crate) const fn new(
        label: String,
        slot: usize,
        stop: Arc<AtomicBool>,
        flags: ShutdownFlags,
        pod: Option<Arc<dyn Pod>>,
    ) -> Self {
        Self {
            label,
            slot,
            stop,
            flags,
            pod,
        }
    }

    /// Label of the worker running the task, `<group>:<slot>`.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Slot index of the worker within its group.
    #[must_use]
    pub const fn slot(&self) -> usize {
        self.slot
    }

    /// Pod attached to the worker, if any.
    #[must_use]
    pub fn pod(&self) -> Option<&Arc<dyn Pod>> {
        self.pod.as_ref()
    }

    /// `true` once this worker was asked to stop.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// `true` once this worker or the whole manager is shutting down.
    ///
    /// Long-running `process` implementations poll this to return early.
    #[must_use]
    pub fn shutting_down(&self) -> bool {
        self.stop_requested() || self.flags.shutting_down()
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("label", &self.label)
            .field("slot", &self.slot)
            .field("stop_requested", &self.stop_requested())
            .field("has_pod", &self.pod.is_some())
            .finish_non_exhaustive()
    }
}

/// Wraps a closure as a [`TaskFactory`].
pub fn factory<F, T>(build: F) -> TaskFactory
where
    F: Fn() -> T + Send + Sync + 'static,
    T: Task,
{
    Arc::new(move || Box::new(build()) as Box<dyn Task>)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl Task for Noop {
        fn process(&mut self, _ctx: &TaskContext) -> Result<(), TaskError> {
            Ok(())
        }
    }

    #[test]
    fn context_reports_manager_shutdown() {
        let flags = ShutdownFlags::new();
        let ctx = TaskContext::new(
            "a:0".into(),
            0,
            Arc::new(AtomicBool::new(false)),
            flags.clone(),
            None,
        );
        assert!(!ctx.shutting_down());
        flags.terminate();
        assert!(ctx.shutting_down());
        assert!(!ctx.stop_requested());
    }

    #[test]
    fn context_reports_own_stop_request() {
        let stop = Arc::new(AtomicBool::new(false));
        let ctx = TaskContext::new(
            "a:1".into(),
            1,
            Arc::clone(&stop),
            ShutdownFlags::new(),
            None,
        );
        stop.store(true, Ordering::SeqCst);
        assert!(ctx.stop_requested());
        assert!(ctx.shutting_down());
        assert_eq!(ctx.slot(), 1);
        assert_eq!(ctx.label(), "a:1");
    }

    #[test]
    fn factory_builds_independent_tasks() {
        let make = factory(|| Noop);
        let first = make();
        let second = make();
        assert!(!first.requires_pod());
        assert!(!second.requires_pod());
    }
}
