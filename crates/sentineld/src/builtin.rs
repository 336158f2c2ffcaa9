//! Tasks bundled with the daemon.

use sentinel::{SentinelError, Task, TaskContext, TaskError, TaskRegistry};
use tracing::info;

const BUILTIN_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::builtin");

/// Module path of [`HeartbeatTask`].
pub const HEARTBEAT: &str = "sentinel::heartbeat";

/// Logs one event per cycle so operators can see a group is alive.
#[derive(Debug, Default)]
pub struct HeartbeatTask {
    beats: u64,
}

impl HeartbeatTask {
    /// Number of completed cycles.
    #[must_use]
    pub const fn beats(&self) -> u64 {
        self.beats
    }
}

impl Task for HeartbeatTask {
    fn process(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
        self.beats = self.beats.saturating_add(1);
        info!(
            target: BUILTIN_TARGET,
            worker = ctx.label(),
            beat = self.beats,
            shutting_down = ctx.shutting_down(),
            "heartbeat"
        );
        Ok(())
    }
}

/// Registry holding every bundled task.
///
/// # Errors
///
/// Returns [`SentinelError::Registration`] if two bundled tasks share a name.
pub fn registry() -> Result<TaskRegistry, SentinelError> {
    let mut registry = TaskRegistry::new();
    registry.register_fn(HEARTBEAT, HeartbeatTask::default)?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use sentinel::TaskResolver;

    use super::*;

    #[test]
    fn heartbeat_is_registered() {
        let registry = registry().expect("bundled registry");
        assert!(registry.resolve(HEARTBEAT).is_ok());
        assert_eq!(registry.len(), 1);
    }
}
