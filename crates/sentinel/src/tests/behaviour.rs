//! Behaviour-driven tests for group supervision.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use sentinel_config::Config;
use serde_json::{Value, json};

use crate::pod::NoPods;
use crate::registry::TaskRegistry;
use crate::supervisor::{SentinelManager, Services};
use crate::task::{Task, TaskContext, TaskError};

use super::wait_until;

// ---------------------------------------------------------------------------
// Test world
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TestWorld {
    plugins: Vec<Value>,
    running: Arc<AtomicUsize>,
    manager: Option<SentinelManager<TaskRegistry>>,
}

#[fixture]
fn world() -> TestWorld {
    TestWorld::default()
}

struct Tick {
    running: Arc<AtomicUsize>,
}

impl Task for Tick {
    fn init(&mut self, _ctx: &TaskContext) -> Result<(), TaskError> {
        self.running.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn process(&mut self, _ctx: &TaskContext) -> Result<(), TaskError> {
        Ok(())
    }

    fn teardown(&mut self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Fail;

impl Task for Fail {
    fn process(&mut self, _ctx: &TaskContext) -> Result<(), TaskError> {
        Err("unrecoverable".into())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn registry(running: &Arc<AtomicUsize>) -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    let counter = Arc::clone(running);
    registry
        .register_fn("demo::tick", move || Tick {
            running: Arc::clone(&counter),
        })
        .expect("register tick");
    registry
        .register_fn("demo::fail", || Fail)
        .expect("register fail");
    registry
}

fn manager(world: &mut TestWorld) -> &mut SentinelManager<TaskRegistry> {
    world.manager.as_mut().expect("manager not started")
}

// ---------------------------------------------------------------------------
// Given steps
// ---------------------------------------------------------------------------

#[given("a plugin group {name} running {count} replicas of {task}")]
fn given_plugin_group(world: &mut TestWorld, name: String, count: i64, task: String) {
    world.plugins.push(json!({
        "name": name.trim_matches('"'),
        "module-path": task.trim_matches('"'),
        "run-count": count,
        "proc-interval": 0.2
    }));
}

// ---------------------------------------------------------------------------
// When steps
// ---------------------------------------------------------------------------

#[when("the services are started")]
fn when_started(world: &mut TestWorld) {
    let mut manager = SentinelManager::new(Config::default(), registry(&world.running), NoPods);
    manager
        .initialize(&json!({ "sentinel": { "pluggins": world.plugins.clone() } }))
        .expect("initialize");
    manager.start_services(Services::ALL).expect("start");
    world.manager = Some(manager);
}

#[when("the manager shuts down")]
fn when_shutdown(world: &mut TestWorld) {
    manager(world).shutdown();
}

#[when("the manager monitors until {name} is drained")]
fn when_monitor_until_drained(world: &mut TestWorld, name: String) {
    let group = name.trim_matches('"').to_owned();
    let manager = manager(world);
    let drained = wait_until(Duration::from_secs(3), || {
        manager.monitor_services(false);
        manager
            .plugin_group(&group)
            .is_some_and(|found| found.slots().is_drained())
    });
    assert!(drained, "group {group} never drained");
}

// ---------------------------------------------------------------------------
// Then steps
// ---------------------------------------------------------------------------

#[then("{count} workers are running")]
fn then_workers_running(world: &mut TestWorld, count: usize) {
    let running = Arc::clone(&world.running);
    assert!(wait_until(Duration::from_secs(3), || {
        running.load(Ordering::SeqCst) == count
    }));
    assert_eq!(manager(world).monitor_services(false), count);
}

#[then("the manager reports shutting down")]
fn then_shutting_down(world: &mut TestWorld) {
    assert!(manager(world).shutting_down());
}

#[then("the manager is not shutting down")]
fn then_not_shutting_down(world: &mut TestWorld) {
    assert!(!manager(world).shutting_down());
}

#[then("every slot of {name} is reaped with a clean outcome")]
fn then_clean_reap(world: &mut TestWorld, name: String) {
    let group = name.trim_matches('"').to_owned();
    let manager = manager(world);
    assert!(wait_until(Duration::from_secs(3), || {
        manager.monitor_services(false) == 0
    }));
    let status = manager.status();
    let slots = &status.group(&group).expect("group status").slots;
    assert!(slots.iter().all(|slot| {
        slot.last_outcome
            .as_ref()
            .is_some_and(crate::lifecycle::UnitOutcome::is_success)
    }));
}

#[then("slot {slot} of {name} recorded exit code {code}")]
fn then_exit_code(world: &mut TestWorld, slot: usize, name: String, code: i32) {
    let group = name.trim_matches('"').to_owned();
    let recorded = manager(world)
        .plugin_group(&group)
        .and_then(|found| found.slots().last_error(slot))
        .map(|outcome| outcome.code);
    assert_eq!(recorded, Some(code));
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[scenario(path = "tests/features/supervisor_lifecycle.feature")]
fn supervisor_lifecycle_behaviour(world: TestWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/crash_reaping.feature")]
fn crash_reaping_behaviour(world: TestWorld) {
    let _ = world;
}
