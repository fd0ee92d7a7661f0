//! Running the engine as a subprocess.
//!
//! The [`Runner`] trait is the seam between compiled commands and the
//! operating system. [`ProcessRunner`] spawns real processes with an explicit
//! working directory; [`RecordingRunner`] records invocations for tests.

use crate::commands::options::{CancellationToken, is_cancelled};
use crate::error::{Error, Result};
use crate::types::ExecutionResult;
use std::collections::{BTreeMap, VecDeque};
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command as StdCommand, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A fully resolved engine invocation.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    /// Program to run.
    pub program: String,
    /// Arguments after the program.
    pub args: Vec<String>,
    /// Working directory for the child; the caller's when `None`.
    pub cwd: Option<PathBuf>,
    /// Variables added to the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Collect stdout/stderr instead of forwarding them.
    pub capture: bool,
    /// Drop stdout when streaming.
    pub quiet: bool,
    /// Kill the child after this long.
    pub timeout: Option<Duration>,
    /// Kill the child when this token trips.
    pub cancel: Option<CancellationToken>,
}

impl Invocation {
    /// Program and arguments as one vector.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

/// Executes invocations.
pub trait Runner: Send + Sync {
    /// Run to completion.
    ///
    /// A non-zero exit code is a successful run. Only failure to start,
    /// timeouts and cancellation are errors.
    fn run(&self, invocation: &Invocation) -> Result<ExecutionResult>;
}

/// Spawns real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Create a process runner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Runner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<ExecutionResult> {
        let program = invocation.program.clone();
        let mut command = StdCommand::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(&invocation.env)
            .stdin(Stdio::inherit());

        if let Some(cwd) = &invocation.cwd {
            command.current_dir(cwd);
        }

        if invocation.capture {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else if invocation.quiet {
            command.stdout(Stdio::null()).stderr(Stdio::inherit());
        } else {
            command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }

        log::debug!("Spawning {}", invocation.argv().join(" "));
        let mut child = command.spawn().map_err(|source| Error::Spawn {
            program: program.clone(),
            source,
        })?;

        let stdout = child.stdout.take().map(collect);
        let stderr = child.stderr.take().map(collect);

        let exit_code = wait(&mut child, invocation)?;

        if invocation.capture {
            Ok(ExecutionResult::captured(
                exit_code,
                joined(stdout),
                joined(stderr),
            ))
        } else {
            Ok(ExecutionResult::streamed(exit_code))
        }
    }
}

/// Drain a pipe on its own thread. A read error keeps what was read so far.
fn collect<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(e) = pipe.read_to_end(&mut buf) {
            log::warn!("Failed to read child output after {} bytes: {}", buf.len(), e);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn joined(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

fn wait(child: &mut Child, invocation: &Invocation) -> Result<i32> {
    let program = &invocation.program;
    let spawn_error = |source| Error::Spawn {
        program: program.clone(),
        source,
    };

    if invocation.timeout.is_none() && invocation.cancel.is_none() {
        let status = child.wait().map_err(spawn_error)?;
        return Ok(status.code().unwrap_or(-1));
    }

    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait().map_err(spawn_error)? {
            return Ok(status.code().unwrap_or(-1));
        }

        if invocation.cancel.as_ref().is_some_and(is_cancelled) {
            log::debug!("Cancellation requested, killing {} (PID: {})", program, child.id());
            kill(child);
            return Err(Error::Cancelled {
                program: program.clone(),
            });
        }

        if let Some(after) = invocation.timeout
            && started.elapsed() >= after
        {
            log::warn!("{} exceeded {:?}, killing (PID: {})", program, after, child.id());
            kill(child);
            return Err(Error::Timeout {
                program: program.clone(),
                after,
            });
        }

        thread::sleep(POLL_INTERVAL);
    }
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::warn!("Failed to kill child process {}: {}", child.id(), e);
    }
    child.wait().ok();
}

/// Test double that records invocations and replays scripted results.
///
/// Results are returned in the order they were pushed; once exhausted every
/// run exits `0` with empty output.
///
/// ```
/// use tfkit::{Invocation, RecordingRunner, Runner, ExecutionResult};
///
/// let runner = RecordingRunner::new();
/// runner.push(ExecutionResult::captured(2, "+ aws_instance.web", ""));
///
/// let result = runner.run(&Invocation { program: "terraform".into(), ..Default::default() }).unwrap();
/// assert_eq!(result.exit_code, 2);
/// assert_eq!(runner.calls(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordingRunner {
    invocations: Arc<Mutex<Vec<Invocation>>>,
    results: Arc<Mutex<VecDeque<ExecutionResult>>>,
}

impl RecordingRunner {
    /// Create a runner with no scripted results.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next run.
    pub fn push(&self, result: ExecutionResult) {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(result);
    }

    /// Every invocation so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of runs so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// The most recent invocation.
    #[must_use]
    pub fn last(&self) -> Option<Invocation> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl Runner for RecordingRunner {
    fn run(&self, invocation: &Invocation) -> Result<ExecutionResult> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(invocation.clone());

        let scripted = self
            .results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        Ok(scripted.unwrap_or_else(|| {
            if invocation.capture {
                ExecutionResult::captured(0, "", "")
            } else {
                ExecutionResult::streamed(0)
            }
        }))
    }
}
