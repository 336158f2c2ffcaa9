//! The outer supervision loop.
//!
//! The manager is only ever touched from this loop. Each pass forwards any
//! pending operator request, reaps finished units and then waits for the next
//! period. The loop ends once no unit is alive, after which everything is
//! drained within the configured budget.

use std::thread;
use std::time::{Duration, Instant};

use sentinel::SentinelManager;
use tracing::{debug, info};

use crate::signals::{Request, SignalFlags};

const RUNTIME_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::runtime");

/// Granularity at which a waiting loop notices operator requests.
pub const SIGNAL_POLL_STEP: Duration = Duration::from_millis(100);

/// Timing of the supervision loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    /// Pause between two monitoring passes.
    pub period: Duration,
    /// Budget handed to `destroy` once the loop ends.
    pub drain_budget: Duration,
}

/// How a supervision run went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Monitoring passes performed.
    pub passes: u64,
    /// Strongest operator request received.
    pub request: Option<Request>,
}

/// Drives `manager` until no unit is alive, then destroys it.
pub fn supervise<R, P>(
    manager: &mut SentinelManager<R, P>,
    signals: &SignalFlags,
    settings: LoopSettings,
) -> RunSummary {
    let mut summary = RunSummary::default();
    loop {
        if let Some(request) = signals.take() {
            forward(manager, request);
            summary.request = strongest(summary.request, request);
        }
        let alive = manager.monitor_services(false);
        summary.passes += 1;
        debug!(target: RUNTIME_TARGET, alive, pass = summary.passes, "monitoring pass");
        if alive == 0 {
            info!(target: RUNTIME_TARGET, "no unit left alive");
            break;
        }
        wait(settings.period, signals);
    }
    manager.destroy(settings.drain_budget);
    summary
}

fn forward<R, P>(manager: &mut SentinelManager<R, P>, request: Request) {
    let signalled = match request {
        Request::Kill => manager.kill(),
        Request::Shutdown => manager.shutdown(),
    };
    info!(target: RUNTIME_TARGET, ?request, signalled, "operator request forwarded");
}

const fn strongest(current: Option<Request>, next: Request) -> Option<Request> {
    match (current, next) {
        (Some(Request::Kill), _) | (_, Request::Kill) => Some(Request::Kill),
        _ => Some(Request::Shutdown),
    }
}

/// Sleeps for `period`, returning early once a request is pending.
fn wait(period: Duration, signals: &SignalFlags) {
    let started = Instant::now();
    loop {
        let remaining = period.saturating_sub(started.elapsed());
        if remaining.is_zero() || signals.pending() {
            return;
        }
        thread::sleep(remaining.min(SIGNAL_POLL_STEP));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rstest::{fixture, rstest};
    use sentinel::{NoPods, Services, Task, TaskContext, TaskError, TaskRegistry};
    use sentinel_config::Config;
    use serde_json::json;

    use super::*;

    struct Finite {
        remaining: usize,
    }

    impl Task for Finite {
        fn process(&mut self, _ctx: &TaskContext) -> Result<(), TaskError> {
            self.remaining = self.remaining.saturating_sub(1);
            if self.remaining == 0 {
                return Err("done".into());
            }
            Ok(())
        }
    }

    struct Forever {
        stops: Arc<AtomicUsize>,
    }

    impl Task for Forever {
        fn process(&mut self, _ctx: &TaskContext) -> Result<(), TaskError> {
            Ok(())
        }

        fn teardown(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[fixture]
    fn settings() -> LoopSettings {
        LoopSettings {
            period: Duration::from_millis(50),
            drain_budget: Duration::from_secs(2),
        }
    }

    fn started(module_path: &str, stops: &Arc<AtomicUsize>) -> SentinelManager<TaskRegistry> {
        let mut registry = TaskRegistry::new();
        registry
            .register_fn("test::finite", || Finite { remaining: 2 })
            .expect("register finite");
        let counter = Arc::clone(stops);
        registry
            .register_fn("test::forever", move || Forever {
                stops: Arc::clone(&counter),
            })
            .expect("register forever");
        let mut manager = SentinelManager::new(Config::default(), registry, NoPods);
        manager
            .initialize(&json!({"sentinel": {"pluggins": [{
                "name": "group",
                "module-path": module_path,
                "run-count": 2,
                "proc-interval": 0.2
            }]}}))
            .expect("initialize");
        manager.start_services(Services::ALL).expect("start");
        manager
    }

    #[rstest]
    fn loop_ends_when_every_unit_finished(settings: LoopSettings) {
        let stops = Arc::new(AtomicUsize::new(0));
        let mut manager = started("test::finite", &stops);
        let summary = supervise(&mut manager, &SignalFlags::new(), settings);
        assert!(summary.passes >= 1);
        assert_eq!(summary.request, None);
        assert!(manager.plugin_groups().is_empty());
    }

    #[rstest]
    #[case(Request::Shutdown)]
    #[case(Request::Kill)]
    fn operator_request_stops_the_loop(settings: LoopSettings, #[case] request: Request) {
        let stops = Arc::new(AtomicUsize::new(0));
        let mut manager = started("test::forever", &stops);
        let signals = SignalFlags::new();
        match request {
            Request::Shutdown => signals.request_shutdown(),
            Request::Kill => signals.request_kill(),
        }

        let began = Instant::now();
        let summary = supervise(&mut manager, &signals, settings);
        assert!(began.elapsed() < Duration::from_secs(5));
        assert_eq!(summary.request, Some(request));
        assert!(manager.shutting_down());
        assert_eq!(stops.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn kill_outranks_shutdown() {
        assert_eq!(strongest(None, Request::Shutdown), Some(Request::Shutdown));
        assert_eq!(
            strongest(Some(Request::Kill), Request::Shutdown),
            Some(Request::Kill)
        );
        assert_eq!(
            strongest(Some(Request::Shutdown), Request::Kill),
            Some(Request::Kill)
        );
    }
}
