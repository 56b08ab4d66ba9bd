//! Command execution utilities
//!
//! Everything the engine learns about the host, and everything it changes,
//! goes through a [`CommandRunner`]. Detectors use a runner directly; state
//! changing commands go through [`CommandExecutor`], which adds dry-run
//! suppression and the failure ledger.

use crate::data::{CommandResult, CommandSpec, ExecutionOutcome};
use crate::interrupt::InterruptFlag;
use crate::session::SessionState;
use std::io::Read;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Budget for state-changing commands unless a step overrides it
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Budget for every detection and package query
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Exit code reported for a command cut short by an operator interrupt
pub const INTERRUPTED_EXIT: i32 = 128 + libc::SIGINT;

/// Runs one external command and classifies how it ended.
///
/// Implementations never fail: spawn errors, timeouts and non-zero exits are
/// all reported through [`ExecutionOutcome::result`].
pub trait CommandRunner {
    fn run(&self, command: &CommandSpec, timeout: Duration) -> ExecutionOutcome;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, command: &CommandSpec, timeout: Duration) -> ExecutionOutcome {
        (**self).run(command, timeout)
    }
}

/// Real runner backed by `std::process::Command`.
///
/// Each command runs in its own process group, so a timeout or an interrupt
/// takes down everything it spawned, not just the direct child.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    env: Vec<(String, String)>,
    interrupt: InterruptFlag,
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self {
            env: vec![("DEBIAN_FRONTEND".to_string(), "noninteractive".to_string())],
            interrupt: InterruptFlag::new(),
        }
    }
}

impl SystemRunner {
    /// Kill the running command when the operator interrupts
    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }
}

fn kill_group(child: &mut Child) {
    // SAFETY: killpg only sends a signal; the group id is our own child's pid
    // because it was spawned with process_group(0)
    unsafe {
        libc::killpg(child.id() as libc::pid_t, libc::SIGKILL);
    }
    let _ = child.kill();
    let _ = child.wait();
}

impl CommandRunner for SystemRunner {
    fn run(&self, command: &CommandSpec, timeout: Duration) -> ExecutionOutcome {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                return ExecutionOutcome::failed(
                    &command.description,
                    CommandResult::LaunchError(err.to_string()),
                )
            }
        };

        // Drain both pipes while we wait so a chatty child cannot block on a full pipe
        let stdout_reader = drain(child.stdout.take());
        let stderr_reader = drain(child.stderr.take());

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    kill_group(&mut child);
                    // Readers finish once the group is gone; only a process that left
                    // the group could still hold a pipe, so they are not joined
                    return ExecutionOutcome::failed(&command.description, CommandResult::TimedOut);
                }
                Ok(None) if self.interrupt.is_raised() => {
                    kill_group(&mut child);
                    return ExecutionOutcome::failed(
                        &command.description,
                        CommandResult::NonZeroExit(INTERRUPTED_EXIT),
                    );
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(err) => {
                    kill_group(&mut child);
                    return ExecutionOutcome::failed(
                        &command.description,
                        CommandResult::LaunchError(err.to_string()),
                    );
                }
            }
        };

        let stdout = collect(stdout_reader);
        let stderr = collect(stderr_reader);

        let result = if status.success() {
            CommandResult::Success
        } else {
            let code = status
                .code()
                .or_else(|| status.signal().map(|sig| 128 + sig))
                .unwrap_or(-1);
            CommandResult::NonZeroExit(code)
        };

        ExecutionOutcome {
            command_description: command.description.clone(),
            result,
            stdout,
            stderr,
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn collect(reader: Option<JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Executes state-changing commands on behalf of the pipeline.
///
/// Under dry-run nothing is spawned and every command reports `Success` with
/// empty output. Otherwise each non-`Success` outcome is appended to the
/// session's failure ledger before being returned.
pub struct CommandExecutor<R: CommandRunner> {
    runner: R,
    dry_run: bool,
    default_timeout: Duration,
}

impl<R: CommandRunner> CommandExecutor<R> {
    pub fn new(runner: R, dry_run: bool) -> Self {
        Self {
            runner,
            dry_run,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn execute(&self, command: &CommandSpec, session: &mut SessionState) -> ExecutionOutcome {
        self.execute_with_timeout(command, self.default_timeout, session)
    }

    pub fn execute_with_timeout(
        &self,
        command: &CommandSpec,
        timeout: Duration,
        session: &mut SessionState,
    ) -> ExecutionOutcome {
        if self.dry_run {
            info!("[DRY RUN] would execute: {}", command);
            return ExecutionOutcome::success(&command.description, String::new(), String::new());
        }

        info!("{}", command.description);
        debug!("running `{}` (timeout {}s)", command, timeout.as_secs());

        let outcome = self.runner.run(command, timeout);
        match &outcome.result {
            CommandResult::Success => {
                if !outcome.stdout.is_empty() {
                    debug!("{}", outcome.stdout.trim_end());
                }
                info!("SUCCESS: {}", command.description);
            }
            CommandResult::NonZeroExit(code) => {
                warn!("FAILED: {} (exit code {})", command.description, code);
                if !outcome.stderr.is_empty() {
                    warn!("{}", outcome.stderr.trim_end());
                }
            }
            CommandResult::TimedOut => {
                error!(
                    "TIMEOUT: {} (exceeded {} seconds)",
                    command.description,
                    timeout.as_secs()
                );
            }
            CommandResult::LaunchError(msg) => {
                error!("EXCEPTION: {} - {}", command.description, msg);
            }
        }

        session.record_failure(outcome.clone());
        outcome
    }
}
