//! Thread-backed worker running a [`Task`] in a polling loop.

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::SentinelError;
use crate::lifecycle::{Lifecycle, UnitOutcome};
use crate::pod::Pod;
use crate::shutdown::ShutdownFlags;
use crate::task::{Task, TaskContext, TaskError};

const WORKER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::worker");

/// Smallest accepted poll interval in seconds.
pub const MIN_POLL_INTERVAL_SECS: f64 = 0.2;

/// Interval used when none, or an out-of-range one, is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Granularity at which a sleeping worker re-checks its stop flag.
pub const SLEEP_STEP: Duration = Duration::from_millis(200);

/// Exit code recorded for a crashed worker.
pub const CRASH_CODE: i32 = 1;

/// Failure captured when a worker's task errors or panics.
#[derive(Debug, Clone)]
pub struct FailureInfo {
    /// Always [`CRASH_CODE`].
    pub code: i32,
    /// Error returned by the task, absent when the task panicked.
    pub error: Option<Arc<dyn Error + Send + Sync>>,
    /// Rendered error or panic message.
    pub message: String,
}

#[derive(Debug, Clone)]
enum WorkerExit {
    Stopped,
    Crashed(FailureInfo),
}

impl WorkerExit {
    fn from_error(error: TaskError) -> Self {
        let message = error.to_string();
        Self::Crashed(FailureInfo {
            code: CRASH_CODE,
            error: Some(Arc::from(error)),
            message,
        })
    }

    fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self::Crashed(FailureInfo {
            code: CRASH_CODE,
            error: None,
            message: format!("task panicked: {}", panic_message(payload)),
        })
    }
}

/// One replica of an in-process worker group.
///
/// The worker owns its task until [`InProcessWorker::start`] moves it onto a
/// dedicated thread. From then on the only state shared with that thread is
/// the stop flag, the poll interval and the set-once exit record.
pub struct InProcessWorker {
    label: String,
    slot: usize,
    task: Option<Box<dyn Task>>,
    requires_pod: bool,
    pod: Option<Arc<dyn Pod>>,
    poll_millis: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
    flags: ShutdownFlags,
    exit: Arc<OnceLock<WorkerExit>>,
    identity: String,
    handle: Option<JoinHandle<()>>,
}

impl InProcessWorker {
    /// Wraps `task` for slot `slot` of `group`.
    #[must_use]
    pub fn new(group: &str, slot: usize, task: Box<dyn Task>, flags: ShutdownFlags) -> Self {
        let requires_pod = task.requires_pod();
        Self {
            label: format!("{group}:{slot}"),
            slot,
            task: Some(task),
            requires_pod,
            pod: None,
            poll_millis: Arc::new(AtomicU64::new(duration_millis(DEFAULT_POLL_INTERVAL))),
            stop: Arc::new(AtomicBool::new(false)),
            flags,
            exit: Arc::new(OnceLock::new()),
            identity: String::new(),
            handle: None,
        }
    }

    /// Unit label, `<group>:<slot>`.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Sets the pause between two `process` calls.
    ///
    /// Values below [`MIN_POLL_INTERVAL_SECS`], and values that are not finite,
    /// are replaced by [`DEFAULT_POLL_INTERVAL`]. A running worker picks the
    /// new value up on its next sleep.
    pub fn set_poll_interval(&self, seconds: f64) {
        let interval = if seconds >= MIN_POLL_INTERVAL_SECS {
            Duration::try_from_secs_f64(seconds).unwrap_or(DEFAULT_POLL_INTERVAL)
        } else {
            DEFAULT_POLL_INTERVAL
        };
        self.poll_millis
            .store(duration_millis(interval), Ordering::SeqCst);
    }

    /// Current pause between two `process` calls.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_millis.load(Ordering::SeqCst))
    }

    /// Whether the wrapped task needs a pod attached before it starts.
    #[must_use]
    pub const fn requires_shared_resource(&self) -> bool {
        self.requires_pod
    }

    /// Attaches the pod handed to the task. Has no effect once started.
    pub fn attach_resource(&mut self, pod: Arc<dyn Pod>) {
        if self.task.is_some() {
            self.pod = Some(pod);
        }
    }

    /// Pod attached to this worker, if any.
    #[must_use]
    pub const fn resource(&self) -> Option<&Arc<dyn Pod>> {
        self.pod.as_ref()
    }

    /// Spawns the worker thread and returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::AlreadyStarted`] on a second call and
    /// [`SentinelError::ThreadSpawn`] when the OS refuses a new thread. In the
    /// latter case the worker is left crashed.
    pub fn start(&mut self) -> Result<(), SentinelError> {
        let Some(task) = self.task.take() else {
            return Err(SentinelError::AlreadyStarted {
                label: self.label.clone(),
            });
        };
        let ctx = TaskContext::new(
            self.label.clone(),
            self.slot,
            Arc::clone(&self.stop),
            self.flags.clone(),
            self.pod.clone(),
        );
        let pod_missing = self.requires_pod && self.pod.is_none();
        let poll_millis = Arc::clone(&self.poll_millis);
        let exit = Arc::clone(&self.exit);

        let spawned = thread::Builder::new()
            .name(thread_name(&self.label))
            .spawn(move || {
                let result = run(task, &ctx, pod_missing, &poll_millis);
                if exit.set(result).is_err() {
                    debug!(target: WORKER_TARGET, label = ctx.label(), "exit already recorded");
                }
            });
        match spawned {
            Ok(handle) => {
                self.identity = format!("{}@{:?}", self.label, handle.thread().id());
                debug!(
                    target: WORKER_TARGET,
                    label = %self.label,
                    identity = %self.identity,
                    "worker started"
                );
                self.handle = Some(handle);
                Ok(())
            }
            Err(source) => {
                let message = format!("failed to spawn worker thread: {source}");
                self.record_exit(WorkerExit::Crashed(FailureInfo {
                    code: CRASH_CODE,
                    error: None,
                    message,
                }));
                Err(SentinelError::ThreadSpawn {
                    label: self.label.clone(),
                    source: Arc::new(source),
                })
            }
        }
    }

    /// Opaque identity of the running thread, empty before `start`.
    #[must_use]
    pub fn get_identity(&self) -> &str {
        &self.identity
    }

    /// `true` once [`Lifecycle::request_shutdown`] was called.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Failure details of a crashed worker, `None` while running or after a
    /// clean stop.
    #[must_use]
    pub fn get_failure_info(&self) -> Option<FailureInfo> {
        match self.exit.get() {
            Some(WorkerExit::Crashed(info)) => Some(info.clone()),
            Some(WorkerExit::Stopped) | None => None,
        }
    }

    fn record_exit(&self, exit: WorkerExit) {
        if self.exit.set(exit).is_err() {
            debug!(target: WORKER_TARGET, label = %self.label, "exit already recorded");
        }
    }

    fn join_finished(&mut self) {
        let Some(handle) = self.handle.take_if(|handle| handle.is_finished()) else {
            return;
        };
        if let Err(payload) = handle.join() {
            self.record_exit(WorkerExit::from_panic(payload.as_ref()));
        }
    }
}

impl Lifecycle for InProcessWorker {
    fn is_alive(&mut self) -> bool {
        self.join_finished();
        self.handle.is_some()
    }

    fn request_shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    fn force_kill(&mut self) {
        // Threads cannot be pre-empted; a kill is a stop request.
        self.request_shutdown();
    }

    fn completed_ok(&self) -> Option<bool> {
        self.exit
            .get()
            .map(|exit| matches!(exit, WorkerExit::Stopped))
    }

    fn identity(&self) -> String {
        self.identity.clone()
    }

    fn has_started(&self) -> bool {
        self.task.is_none()
    }

    fn outcome(&self) -> Option<UnitOutcome> {
        self.exit.get().map(|exit| match exit {
            WorkerExit::Stopped => UnitOutcome::clean(),
            WorkerExit::Crashed(info) => UnitOutcome::failed(info.code, info.message.clone()),
        })
    }
}

impl Drop for InProcessWorker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

impl fmt::Debug for InProcessWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcessWorker")
            .field("label", &self.label)
            .field("identity", &self.identity)
            .field("requires_pod", &self.requires_pod)
            .field("has_pod", &self.pod.is_some())
            .field("poll_interval", &self.poll_interval())
            .field("stop_requested", &self.stop_requested())
            .field("exit", &self.exit.get())
            .finish_non_exhaustive()
    }
}

fn run(
    mut task: Box<dyn Task>,
    ctx: &TaskContext,
    pod_missing: bool,
    poll_millis: &AtomicU64,
) -> WorkerExit {
    let driven = panic::catch_unwind(AssertUnwindSafe(|| {
        drive(task.as_mut(), ctx, pod_missing, poll_millis)
    }));
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task.teardown())) {
        warn!(
            target: WORKER_TARGET,
            label = ctx.label(),
            panic = %panic_message(payload.as_ref()),
            "task teardown panicked"
        );
    }

    let exit = match driven {
        Ok(Ok(())) => WorkerExit::Stopped,
        Ok(Err(error)) => WorkerExit::from_error(error),
        Err(payload) => WorkerExit::from_panic(payload.as_ref()),
    };
    match &exit {
        WorkerExit::Stopped => {
            info!(target: WORKER_TARGET, label = ctx.label(), "worker stopped");
        }
        WorkerExit::Crashed(info) => {
            warn!(
                target: WORKER_TARGET,
                label = ctx.label(),
                code = info.code,
                error = %info.message,
                "worker crashed"
            );
        }
    }
    exit
}

fn drive(
    task: &mut dyn Task,
    ctx: &TaskContext,
    pod_missing: bool,
    poll_millis: &AtomicU64,
) -> Result<(), TaskError> {
    if pod_missing {
        let label = ctx.label();
        return Err(format!("worker '{label}' requires a pod but none was attached").into());
    }
    task.init(ctx)?;
    loop {
        task.process(ctx)?;
        if ctx.stop_requested() || pause(ctx, poll_millis) {
            return Ok(());
        }
    }
}

/// Sleeps for the current poll interval in [`SLEEP_STEP`] increments.
/// Returns `true` when a stop was requested while sleeping.
fn pause(ctx: &TaskContext, poll_millis: &AtomicU64) -> bool {
    let total = Duration::from_millis(poll_millis.load(Ordering::SeqCst));
    let mut slept = Duration::ZERO;
    while slept < total {
        if ctx.stop_requested() {
            return true;
        }
        let step = SLEEP_STEP.min(total.saturating_sub(slept));
        thread::sleep(step);
        slept = slept.saturating_add(step);
    }
    ctx.stop_requested()
}

/// Thread name for `label`; std refuses names with interior NUL bytes.
fn thread_name(label: &str) -> String {
    label.chars().filter(|c| !c.is_control()).collect()
}

fn duration_millis(interval: Duration) -> u64 {
    u64::try_from(interval.as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("unknown panic")
    }
}
