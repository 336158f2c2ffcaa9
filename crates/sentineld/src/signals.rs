//! OS signal handling for the supervision loop.
//!
//! Handlers only raise atomic flags; the loop reads them between monitoring
//! passes and forwards them to the manager.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::signal::{SIGINT, SIGQUIT, SIGTERM};
use signal_hook::flag;

/// Operator requests observed since the daemon started.
#[derive(Debug, Clone, Default)]
pub struct SignalFlags {
    terminate: Arc<AtomicBool>,
    kill: Arc<AtomicBool>,
}

/// What the operator asked for, strongest request first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Force-stop every unit.
    Kill,
    /// Ask every unit to stop gracefully.
    Shutdown,
}

impl SignalFlags {
    /// Flags with no request raised and no handler installed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes SIGINT and SIGTERM to a graceful shutdown and SIGQUIT to a kill.
    ///
    /// # Errors
    ///
    /// Returns the OS error when a handler cannot be registered.
    pub fn install(&self) -> io::Result<()> {
        for signal in [SIGINT, SIGTERM] {
            flag::register(signal, Arc::clone(&self.terminate))?;
        }
        flag::register(SIGQUIT, Arc::clone(&self.kill))?;
        Ok(())
    }

    /// Raises the graceful shutdown request.
    pub fn request_shutdown(&self) {
        self.terminate.store(true, Ordering::SeqCst);
    }

    /// Raises the kill request.
    pub fn request_kill(&self) {
        self.kill.store(true, Ordering::SeqCst);
    }

    /// `true` while a request is waiting to be taken.
    #[must_use]
    pub fn pending(&self) -> bool {
        self.kill.load(Ordering::SeqCst) || self.terminate.load(Ordering::SeqCst)
    }

    /// Consumes the strongest pending request, if any.
    ///
    /// A kill also clears a pending shutdown, which it supersedes.
    #[must_use]
    pub fn take(&self) -> Option<Request> {
        if self.kill.swap(false, Ordering::SeqCst) {
            self.terminate.store(false, Ordering::SeqCst);
            return Some(Request::Kill);
        }
        self.terminate
            .swap(false, Ordering::SeqCst)
            .then_some(Request::Shutdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_pending_by_default() {
        assert_eq!(SignalFlags::new().take(), None);
    }

    #[test]
    fn requests_are_consumed_once() {
        let flags = SignalFlags::new();
        flags.request_shutdown();
        assert!(flags.pending());
        assert_eq!(flags.take(), Some(Request::Shutdown));
        assert!(!flags.pending());
        assert_eq!(flags.take(), None);
    }

    #[test]
    fn kill_supersedes_shutdown() {
        let flags = SignalFlags::new();
        flags.request_shutdown();
        flags.request_kill();
        assert_eq!(flags.take(), Some(Request::Kill));
        assert_eq!(flags.take(), None);
    }

    #[test]
    fn clones_share_requests() {
        let flags = SignalFlags::new();
        flags.clone().request_kill();
        assert_eq!(flags.take(), Some(Request::Kill));
    }
}
