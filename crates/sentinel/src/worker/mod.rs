//! The two kinds of worker unit filling group slots.
//!
//! [`InProcessWorker`] runs a [`Task`](crate::Task) on its own thread;
//! [`ExternalProcess`] supervises a spawned OS process. Both implement
//! [`Lifecycle`](crate::Lifecycle), which is all the supervisor's monitor and
//! shutdown passes need.

mod external;
#[cfg(test)]
mod external_tests;
mod in_process;

pub use self::external::{ExternalProcess, SPAWN_FAILURE_CODE, STDERR_TAIL_LIMIT, STDOUT_CHUNK};
pub use self::in_process::{
    CRASH_CODE, DEFAULT_POLL_INTERVAL, FailureInfo, InProcessWorker, MIN_POLL_INTERVAL_SECS,
    SLEEP_STEP,
};
