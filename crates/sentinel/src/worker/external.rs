//! OS subprocess supervised without blocking the caller.

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use crate::error::SentinelError;
use crate::lifecycle::{Lifecycle, UnitOutcome};

const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

/// Size of one stdout read, and of one logged stdout chunk.
pub const STDOUT_CHUNK: usize = 4096;

/// Number of trailing stderr bytes retained per process.
pub const STDERR_TAIL_LIMIT: usize = 1024;

/// Return code recorded when the process could not be spawned or polled.
pub const SPAWN_FAILURE_CODE: i32 = 1;

/// One replica of an external process group.
#[derive(Debug)]
pub struct ExternalProcess {
    label: String,
    program: PathBuf,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    held_pipes: Vec<OwnedFd>,
    stderr_tail: VecDeque<u8>,
    return_code: Option<i32>,
    failure: Option<String>,
    started: bool,
}

impl ExternalProcess {
    /// Describes a process running `program` with `args`.
    #[must_use]
    pub fn new(label: impl Into<String>, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            args,
            working_dir: None,
            child: None,
            stdout: None,
            stderr: None,
            held_pipes: Vec::new(),
            stderr_tail: VecDeque::with_capacity(STDERR_TAIL_LIMIT),
            return_code: None,
            failure: None,
            started: false,
        }
    }

    /// Runs the process from `dir` instead of the supervisor's directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Unit label, `<group>:<slot>`.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Executable being run.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Argument vector passed to the executable.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Spawns the process with stdout and stderr captured.
    ///
    /// Descriptors listed in `inherited` stay open in the child; every other
    /// descriptor of the supervisor is closed on exec. Spawn failures are not
    /// returned: they are logged and recorded as return code
    /// [`SPAWN_FAILURE_CODE`].
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::AlreadyRunning`] while a previous run of this
    /// unit is still alive.
    pub fn start(&mut self, inherited: &[RawFd]) -> Result<(), SentinelError> {
        if let Some(child) = self.child.as_mut()
            && matches!(child.try_wait(), Ok(None))
        {
            return Err(SentinelError::AlreadyRunning {
                label: self.label.clone(),
                pid: child.id(),
            });
        }
        self.reset();
        self.started = true;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        prepare_child(&mut command, inherited);

        match command.spawn() {
            Ok(mut child) => {
                info!(
                    target: PROCESS_TARGET,
                    label = %self.label,
                    pid = child.id(),
                    program = %self.program.display(),
                    inherited = ?inherited,
                    "process started"
                );
                self.stdout = child
                    .stdout
                    .take()
                    .and_then(|pipe| self.adopt_pipe(pipe, "stdout", set_nonblocking));
                self.stderr = child
                    .stderr
                    .take()
                    .and_then(|pipe| self.adopt_pipe(pipe, "stderr", set_nonblocking));
                self.child = Some(child);
            }
            Err(error) => {
                warn!(
                    target: PROCESS_TARGET,
                    label = %self.label,
                    program = %self.program.display(),
                    %error,
                    "process failed to spawn"
                );
                self.failure = Some(format!(
                    "failed to spawn '{}': {error}",
                    self.program.display()
                ));
                self.return_code = Some(SPAWN_FAILURE_CODE);
            }
        }
        Ok(())
    }

    /// OS process id as text, empty if never spawned.
    #[must_use]
    pub fn get_pid(&self) -> String {
        self.child
            .as_ref()
            .map(|child| child.id().to_string())
            .unwrap_or_default()
    }

    /// Recorded return code, `None` while running or before `start`.
    #[must_use]
    pub const fn return_code(&self) -> Option<i32> {
        self.return_code
    }

    /// Last captured bytes of standard error, decoded lossily.
    #[must_use]
    pub fn get_stderr_tail(&self) -> String {
        let (front, back) = self.stderr_tail.as_slices();
        let mut bytes = Vec::with_capacity(self.stderr_tail.len());
        bytes.extend_from_slice(front);
        bytes.extend_from_slice(back);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn reset(&mut self) {
        self.close_pipes();
        self.child = None;
        self.stderr_tail.clear();
        self.return_code = None;
        self.failure = None;
    }

    fn live_pid(&self) -> Option<Pid> {
        if self.return_code.is_some() {
            return None;
        }
        let child = self.child.as_ref()?;
        i32::try_from(child.id()).ok().map(Pid::from_raw)
    }

    fn drain_output(&mut self) {
        if let Some(pipe) = self.stdout.as_mut() {
            let label = self.label.as_str();
            drain_pipe(pipe, |chunk| {
                info!(
                    target: PROCESS_TARGET,
                    label,
                    stream = "stdout",
                    output = %String::from_utf8_lossy(chunk).trim_end(),
                    "process output"
                );
            });
        }
        if let Some(pipe) = self.stderr.as_mut() {
            let label = self.label.as_str();
            let tail = &mut self.stderr_tail;
            drain_pipe(pipe, |chunk| {
                info!(
                    target: PROCESS_TARGET,
                    label,
                    stream = "stderr",
                    output = %String::from_utf8_lossy(chunk).trim_end(),
                    "process output"
                );
                tail.extend(chunk);
                while tail.len() > STDERR_TAIL_LIMIT {
                    tail.pop_front();
                }
            });
        }
    }

    /// Switches a child pipe to non-blocking mode so it can be drained.
    ///
    /// A pipe that cannot be switched is held open unread until the process
    /// exits, and the failure is kept for the outcome.
    pub(super) fn adopt_pipe<P>(
        &mut self,
        pipe: P,
        stream: &str,
        switch: fn(RawFd) -> io::Result<()>,
    ) -> Option<P>
    where
        P: AsRawFd + Into<OwnedFd>,
    {
        match switch(pipe.as_raw_fd()) {
            Ok(()) => Some(pipe),
            Err(error) => {
                warn!(
                    target: PROCESS_TARGET,
                    label = %self.label,
                    stream,
                    %error,
                    "cannot make pipe non-blocking; output will not be captured"
                );
                self.held_pipes.push(pipe.into());
                self.failure = Some(format!("{stream} left uncaptured: {error}"));
                None
            }
        }
    }

    fn close_pipes(&mut self) {
        self.stdout = None;
        self.stderr = None;
        self.held_pipes.clear();
    }

    pub(super) fn record_exit(&mut self, code: i32) {
        self.drain_output();
        self.close_pipes();
        self.return_code = Some(code);
        info!(
            target: PROCESS_TARGET,
            label = %self.label,
            pid = %self.get_pid(),
            code,
            "process exited"
        );
    }
}

impl Lifecycle for ExternalProcess {
    fn is_alive(&mut self) -> bool {
        if self.return_code.is_some() {
            return false;
        }
        self.drain_output();
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                self.record_exit(exit_code(status));
                false
            }
            Err(error) => {
                warn!(
                    target: PROCESS_TARGET,
                    label = %self.label,
                    %error,
                    "failed to poll process status"
                );
                self.failure = Some(format!("failed to poll process status: {error}"));
                self.record_exit(SPAWN_FAILURE_CODE);
                false
            }
        }
    }

    fn request_shutdown(&mut self) {
        let Some(pid) = self.live_pid() else {
            return;
        };
        if let Err(error) = signal::kill(pid, Signal::SIGINT) {
            debug!(target: PROCESS_TARGET, label = %self.label, %error, "SIGINT not delivered");
        }
    }

    fn force_kill(&mut self) {
        if self.return_code.is_some() {
            return;
        }
        if let Some(child) = self.child.as_mut()
            && let Err(error) = child.kill()
        {
            debug!(target: PROCESS_TARGET, label = %self.label, %error, "kill not delivered");
        }
    }

    fn completed_ok(&self) -> Option<bool> {
        self.return_code.map(|code| code == 0)
    }

    fn identity(&self) -> String {
        self.get_pid()
    }

    fn has_started(&self) -> bool {
        self.started
    }

    fn outcome(&self) -> Option<UnitOutcome> {
        let code = self.return_code?;
        if code == 0 {
            return Some(UnitOutcome::clean());
        }
        let message = self
            .failure
            .clone()
            .or_else(|| {
                let tail = self.get_stderr_tail();
                let trimmed = tail.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_owned())
            })
            .unwrap_or_else(|| format!("exited with code {code}"));
        Some(UnitOutcome::failed(code, message))
    }
}

/// Exit code of `status`, or the negated signal number when the process was
/// killed by a signal.
fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|number| -number))
        .unwrap_or(SPAWN_FAILURE_CODE)
}

fn prepare_child(command: &mut Command, inherited: &[RawFd]) {
    let descriptors = inherited.to_vec();
    // SAFETY: the hook runs between fork and exec and only calls signal(2)
    // and fcntl(2), both async-signal-safe, on state owned by this process.
    unsafe {
        command.pre_exec(move || {
            // SIGINT is the graceful stop request and must not stay ignored.
            if libc::signal(libc::SIGINT, libc::SIG_DFL) == libc::SIG_ERR {
                return Err(io::Error::last_os_error());
            }
            for &fd in &descriptors {
                clear_close_on_exec(fd)?;
            }
            Ok(())
        });
    }
}

fn clear_close_on_exec(fd: RawFd) -> io::Result<()> {
    // SAFETY: F_GETFD and F_SETFD only read and write descriptor flags.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: F_GETFL and F_SETFL only read and write file status flags.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Reads everything currently available from a non-blocking pipe, handing
/// each chunk to `sink`. Stops at end of file, on `WouldBlock`, or after a
/// short read.
fn drain_pipe<R: Read>(pipe: &mut R, mut sink: impl FnMut(&[u8])) {
    let mut buffer = [0_u8; STDOUT_CHUNK];
    loop {
        match pipe.read(&mut buffer) {
            Ok(0) => return,
            Ok(read) => {
                sink(buffer.get(..read).unwrap_or_default());
                if read < STDOUT_CHUNK {
                    return;
                }
            }
            Err(error) if error.kind() == ErrorKind::Interrupted => {}
            Err(error) if error.kind() == ErrorKind::WouldBlock => return,
            Err(error) => {
                debug!(target: PROCESS_TARGET, %error, "pipe read failed");
                return;
            }
        }
    }
}
