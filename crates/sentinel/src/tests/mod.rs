//! Crate-level integration and BDD tests.

use std::thread;
use std::time::{Duration, Instant};

use sentinel_config::Config;
use serde_json::json;

use crate::pod::NoPods;
use crate::registry::TaskRegistry;
use crate::status::ManagerState;
use crate::supervisor::{SentinelManager, Services};
use crate::task::{Task, TaskContext, TaskError};

mod behaviour;

pub(super) fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    condition()
}

struct Idle;

impl Task for Idle {
    fn process(&mut self, _ctx: &TaskContext) -> Result<(), TaskError> {
        Ok(())
    }
}

#[test]
fn status_snapshot_serialises_to_json() {
    let mut registry = TaskRegistry::new();
    registry.register_fn("demo::idle", || Idle).expect("register");
    let mut manager = SentinelManager::new(Config::default(), registry, NoPods);
    manager
        .initialize(&json!({
            "sentinel": {"pluggins": [{"name": "idle", "module-path": "demo::idle"}]}
        }))
        .expect("initialize");
    manager.start_services(Services::ALL).expect("start");

    let snapshot = serde_json::to_value(manager.status()).expect("serialise status");
    assert_eq!(snapshot["state"], json!("initialized"));
    assert_eq!(snapshot["shutting_down"], json!(false));
    assert_eq!(snapshot["groups"][0]["kind"], json!("in_process"));
    assert_eq!(snapshot["groups"][0]["replica_count"], json!(1));
    assert_eq!(snapshot["groups"][0]["slots"][0]["started"], json!(true));
    let identity = snapshot["groups"][0]["slots"][0]["identity"]
        .as_str()
        .expect("identity");
    assert!(identity.starts_with("idle:0@"));

    manager.destroy(Duration::from_secs(2));
    assert_eq!(manager.state(), ManagerState::Destroyed);
}
