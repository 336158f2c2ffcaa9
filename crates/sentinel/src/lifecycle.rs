//! Capability set shared by both kinds of worker unit.

use serde::Serialize;

/// Terminal result recorded for a slot when its unit is reaped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitOutcome {
    /// `0` on a clean exit. Processes killed by a signal report `-signal`.
    pub code: i32,
    /// Failure description, absent on a clean exit.
    pub message: Option<String>,
}

impl UnitOutcome {
    /// Outcome of a clean exit.
    #[must_use]
    pub const fn clean() -> Self {
        Self {
            code: 0,
            message: None,
        }
    }

    /// Outcome of a failed run.
    #[must_use]
    pub fn failed(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }

    /// `true` when the exit code is zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code == 0
    }
}

/// Operations the supervisor's monitor and shutdown passes dispatch on.
///
/// Starting is variant-specific and not part of the trait.
pub trait Lifecycle {
    /// Non-blocking liveness probe. `false` before the unit starts.
    fn is_alive(&mut self) -> bool;

    /// Asks the unit to stop. Returns without waiting.
    fn request_shutdown(&mut self);

    /// Stops the unit as abruptly as the variant allows.
    fn force_kill(&mut self);

    /// `None` while running, then whether the unit exited cleanly.
    fn completed_ok(&self) -> Option<bool>;

    /// Opaque identity, empty before the unit starts.
    fn identity(&self) -> String;

    /// `true` once `start` has been called.
    fn has_started(&self) -> bool;

    /// Terminal outcome, `None` until one is known.
    fn outcome(&self) -> Option<UnitOutcome>;
}
