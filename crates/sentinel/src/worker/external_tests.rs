//! Tests for supervised subprocesses.

use std::fs;
use std::io::{self, Write};
use std::net::TcpListener;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::thread;
use std::time::{Duration, Instant};

use rstest::rstest;
use tempfile::TempDir;

use super::external::{ExternalProcess, SPAWN_FAILURE_CODE, STDERR_TAIL_LIMIT};
use crate::error::SentinelError;
use crate::lifecycle::Lifecycle;

fn shell(script: &str) -> ExternalProcess {
    ExternalProcess::new("b:0", "/bin/sh", vec![String::from("-c"), script.to_owned()])
}

fn wait_for_exit(process: &mut ExternalProcess) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if !process.is_alive() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    false
}

#[test]
fn unstarted_process_is_inert() {
    let mut process = shell("exit 0");
    assert!(!process.is_alive());
    assert!(!process.has_started());
    assert!(process.get_pid().is_empty());
    assert_eq!(process.completed_ok(), None);
    assert_eq!(process.outcome(), None);
    process.request_shutdown();
    process.force_kill();
    assert_eq!(process.return_code(), None);
}

#[rstest]
#[case("exit 0", 0)]
#[case("exit 3", 3)]
fn return_code_is_recorded(#[case] script: &str, #[case] expected: i32) {
    let mut process = shell(script);
    process.start(&[]).expect("start");
    assert!(!process.get_pid().is_empty());
    assert!(wait_for_exit(&mut process));
    assert_eq!(process.return_code(), Some(expected));
    assert_eq!(process.completed_ok(), Some(expected == 0));
    assert!(!process.is_alive(), "reaped process stays dead");
}

#[test]
fn stderr_is_kept_in_outcome() {
    let mut process = shell("echo oops >&2; exit 2");
    process.start(&[]).expect("start");
    assert!(wait_for_exit(&mut process));
    assert!(process.get_stderr_tail().contains("oops"));
    let outcome = process.outcome().expect("outcome");
    assert_eq!(outcome.code, 2);
    assert_eq!(outcome.message.as_deref(), Some("oops"));
}

#[test]
fn stderr_tail_is_bounded() {
    let mut process = shell("i=0; while [ $i -lt 50 ]; do printf '%0100d' 0 >&2; i=$((i+1)); done");
    process.start(&[]).expect("start");
    assert!(wait_for_exit(&mut process));
    let tail = process.get_stderr_tail();
    assert_eq!(tail.len(), STDERR_TAIL_LIMIT);
    assert!(tail.bytes().all(|byte| byte == b'0'));
}

#[test]
fn interrupt_stops_process() {
    let mut process = shell("exec sleep 30");
    process.start(&[]).expect("start");
    assert!(process.is_alive());
    process.request_shutdown();
    assert!(wait_for_exit(&mut process));
    assert_eq!(process.return_code(), Some(-libc::SIGINT));
    assert_eq!(process.completed_ok(), Some(false));
}

#[test]
fn force_kill_stops_process() {
    let mut process = shell("exec sleep 30");
    process.start(&[]).expect("start");
    process.force_kill();
    assert!(wait_for_exit(&mut process));
    assert_eq!(process.return_code(), Some(-libc::SIGKILL));
}

#[test]
fn second_start_while_running_is_rejected() {
    let mut process = shell("exec sleep 30");
    process.start(&[]).expect("start");
    let error = process.start(&[]).expect_err("second start must fail");
    assert!(matches!(error, SentinelError::AlreadyRunning { .. }));
    process.force_kill();
    assert!(wait_for_exit(&mut process));
}

#[test]
fn exited_process_can_be_restarted() {
    let mut process = shell("exit 4");
    process.start(&[]).expect("start");
    assert!(wait_for_exit(&mut process));
    process.start(&[]).expect("restart");
    assert_eq!(process.return_code(), None);
    assert!(wait_for_exit(&mut process));
    assert_eq!(process.return_code(), Some(4));
}

#[test]
fn spawn_failure_is_absorbed() {
    let mut process = ExternalProcess::new("b:0", "/nonexistent/sentinel-test-binary", Vec::new());
    process.start(&[]).expect("spawn failures are not returned");
    assert!(process.has_started());
    assert!(!process.is_alive());
    assert_eq!(process.return_code(), Some(SPAWN_FAILURE_CODE));
    assert_eq!(process.completed_ok(), Some(false));
    let outcome = process.outcome().expect("outcome");
    assert!(
        outcome
            .message
            .as_deref()
            .is_some_and(|message| message.contains("failed to spawn")),
        "unexpected outcome: {outcome:?}"
    );
}

#[test]
fn pipe_that_cannot_be_polled_is_held_and_reported() {
    let (reader, mut writer) = UnixStream::pair().expect("socket pair");
    let mut process = shell("exit 0");
    let adopted = process.adopt_pipe(reader, "stdout", |_| {
        Err(io::Error::from_raw_os_error(libc::EBADF))
    });
    assert!(adopted.is_none());
    writer
        .write_all(b"still read")
        .expect("held pipe keeps its reading end open");

    process.record_exit(5);
    let outcome = process.outcome().expect("outcome");
    assert_eq!(outcome.code, 5);
    assert!(
        outcome
            .message
            .as_deref()
            .is_some_and(|message| message.starts_with("stdout left uncaptured")),
        "unexpected outcome: {outcome:?}"
    );
    assert!(writer.write_all(b"after exit").is_err(), "pipe released on exit");
}

#[test]
fn working_directory_is_applied() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join("marker"), b"").expect("write marker");
    let mut process = shell("test -f marker").with_working_dir(dir.path());
    process.start(&[]).expect("start");
    assert!(wait_for_exit(&mut process));
    assert_eq!(process.return_code(), Some(0));
}

#[cfg(target_os = "linux")]
#[rstest]
#[case::inherited(true, 0)]
#[case::closed(false, 1)]
fn only_listed_descriptors_reach_the_child(#[case] inherit: bool, #[case] expected: i32) {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
    let fd = listener.as_raw_fd();
    let mut process = shell(&format!("test -e /proc/self/fd/{fd}"));
    let inherited = if inherit { vec![fd] } else { Vec::new() };
    process.start(&inherited).expect("start");
    assert!(wait_for_exit(&mut process));
    assert_eq!(process.return_code(), Some(expected));
}
