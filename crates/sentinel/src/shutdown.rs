//! Manager-wide termination flags shared with running tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cloneable view of the manager's "terminating" and "killed" flags.
///
/// Flags only ever go from unset to set. A fresh `initialize` gives the
/// manager a new pair, so tasks from an earlier generation keep observing
/// their own.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlags {
    terminating: Arc<AtomicBool>,
    killed: Arc<AtomicBool>,
}

impl ShutdownFlags {
    /// Creates a pair of unset flags.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` once either a graceful shutdown or a kill was requested.
    #[must_use]
    pub fn shutting_down(&self) -> bool {
        self.is_terminating() || self.is_killed()
    }

    /// `true` once a graceful shutdown was requested.
    #[must_use]
    pub fn is_terminating(&self) -> bool {
        self.terminating.load(Ordering::SeqCst)
    }

    /// `true` once a kill was requested.
    #[must_use]
    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    pub(crate) fn terminate(&self) {
        self.terminating.store(true, Ordering::SeqCst);
    }

    pub(crate) fn kill(&self) {
        self.killed.store(true, Ordering::SeqCst);
    }
}
