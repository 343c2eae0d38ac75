//! Process-isolated execution of call plans.

use super::capture::{read_capped, read_events, CappedBytes, EventLog};
use super::driver::{driver_script, DriverEvent, DriverRequest};
use super::result::{ExecutionResult, Phase, RaiseSite, INTERNAL_FAULT, OUTPUT_LIMIT_EXCEEDED};
use crate::config::ExecLimits;
use crate::error::HarnessError;
use crate::harness::CancelToken;
use crate::synth::{CallPlan, Value};
use std::io::{self, PipeWriter, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Environment variables passed through to the sandbox.
const ALLOWED_ENV_VARS: &[&str] = &["PATH", "LANG", "LC_ALL", "LC_CTYPE", "SYSTEMROOT", "TZ"];

/// Interval between checks of the wall clock, cancellation and overflow.
const POLL: Duration = Duration::from_millis(25);

/// How long stream readers may take to finish once the sandbox is killed.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Signal delivered when RLIMIT_CPU is exceeded.
#[cfg(unix)]
const SIGXCPU: i32 = libc::SIGXCPU;

/// One implementation and the plan to run against it.
#[derive(Debug, Clone, Copy)]
pub struct ExecRequest<'a> {
    /// Unit id, for logging.
    pub unit_id: &'a str,
    /// Source text of the implementation.
    pub source: &'a str,
    /// File name shown in tracebacks.
    pub filename: &'a str,
    /// Class to construct.
    pub class_name: &'a str,
    /// Calls to perform.
    pub plan: &'a CallPlan,
}

/// Runs call plans and reports what happened.
///
/// Implementations never fail: every problem, including infrastructure
/// failures, is folded into the returned [`ExecutionResult`].
pub trait Executor: Send + Sync {
    /// Execute one request.
    fn execute(&self, request: &ExecRequest<'_>) -> ExecutionResult;

    /// Executor name for reporting.
    fn name(&self) -> &str;
}

/// Runs each plan in a fresh Python process.
pub struct ProcessExecutor {
    limits: ExecLimits,
    cancel: CancelToken,
    script: String,
}

impl ProcessExecutor {
    /// Executor with the given limits, killed early when `cancel` fires.
    pub fn new(limits: ExecLimits, cancel: CancelToken) -> Self {
        Self {
            limits,
            cancel,
            script: driver_script(),
        }
    }

    fn command(&self, workdir: &Path, events: &PipeWriter) -> Command {
        let mut cmd = Command::new(&self.limits.python);
        cmd.args(["-s", "-u", "-c", &self.script])
            .current_dir(workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd.env_clear();
        for var_name in ALLOWED_ENV_VARS {
            if let Ok(value) = std::env::var(var_name) {
                cmd.env(var_name, value);
            }
        }
        cmd.env("PYTHONHASHSEED", "0")
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .env("PYTHONIOENCODING", "utf-8");
        isolate(&mut cmd, events);
        cmd
    }

    fn spawn(&self, workdir: &Path, unit: &str, events: &PipeWriter) -> io::Result<Child> {
        let mut last_error = None;
        for attempt in 1..=self.limits.spawn_attempts {
            match self.command(workdir, events).spawn() {
                Ok(child) => return Ok(child),
                Err(e) => {
                    warn!(unit, attempt, error = %e, "sandbox spawn failed");
                    last_error = Some(e);
                    thread::sleep(Duration::from_millis(10 * u64::from(attempt)));
                }
            }
        }
        Err(last_error.unwrap_or_else(|| io::Error::other("no spawn attempts configured")))
    }

    fn wait(&self, child: &mut Child, overflow: &AtomicBool, started: Instant) -> WaitOutcome {
        loop {
            if self.cancel.is_cancelled() {
                terminate_and_reap(child);
                return WaitOutcome::Cancelled;
            }
            if overflow.load(Ordering::Relaxed) {
                terminate_and_reap(child);
                return WaitOutcome::Overflowed;
            }
            let elapsed = started.elapsed();
            if elapsed >= self.limits.timeout {
                terminate_and_reap(child);
                return WaitOutcome::TimedOut;
            }
            let slice = POLL.min(self.limits.timeout - elapsed);
            match child.wait_timeout(slice) {
                Ok(Some(status)) => return WaitOutcome::Exited(status),
                Ok(None) => {}
                Err(e) => {
                    terminate_and_reap(child);
                    return WaitOutcome::Failed(e.to_string());
                }
            }
        }
    }
}

impl Executor for ProcessExecutor {
    fn execute(&self, request: &ExecRequest<'_>) -> ExecutionResult {
        let started = Instant::now();
        let unit = request.unit_id;
        let mut phase = Phase::Pending;

        let (event_reader, event_writer) = match io::pipe() {
            Ok(pipe) => pipe,
            Err(e) => return internal_fault(format!("event pipe failed: {e}"), started),
        };
        let driver_request = DriverRequest::new(request, &self.limits, raw_fd(&event_writer));
        let body = match serde_json::to_vec(&driver_request) {
            Ok(body) => body,
            Err(e) => return internal_fault(format!("request encoding failed: {e}"), started),
        };
        let workdir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(e) => return internal_fault(format!("sandbox directory failed: {e}"), started),
        };
        let spawned = self.spawn(workdir.path(), unit, &event_writer);
        // Only the sandbox may hold the write end, or the reader never sees EOF.
        drop(event_writer);
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => return internal_fault(format!("sandbox spawn failed: {e}"), started),
        };
        phase.advance(Phase::Loading, unit);

        let (Some(mut stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            terminate_and_reap(&mut child);
            return internal_fault("sandbox pipes unavailable".to_string(), started);
        };

        // A unit that exits early closes the pipe; that is not an error here.
        thread::spawn(move || {
            let _ = stdin.write_all(&body);
        });
        let cap = self.limits.output_cap;
        let overflow = Arc::new(AtomicBool::new(false));
        let stdout_rx = drain({
            let flag = Arc::clone(&overflow);
            move || read_capped(stdout, cap, &flag)
        });
        let stderr_rx = drain({
            let flag = Arc::clone(&overflow);
            move || read_capped(stderr, cap, &flag)
        });
        let max_events = request.plan.calls.len() + 3;
        let events_rx = drain(move || read_events(event_reader, max_events));

        let outcome = self.wait(&mut child, &overflow, started);
        // Processes the unit started may still hold the pipes open.
        kill_group(child.id());

        let deadline = Instant::now() + DRAIN_GRACE;
        let mut stalled = false;
        let streams = Streams {
            stdout: collect(&stdout_rx, deadline, &mut stalled),
            stderr: collect(&stderr_rx, deadline, &mut stalled),
            events: collect(&events_rx, deadline, &mut stalled),
            stalled,
        };
        if stalled {
            warn!(unit, "sandbox streams still open after kill");
        }

        let result = interpret(outcome, streams, request.plan.calls.len(), &mut phase, unit, started);
        debug!(
            unit,
            seed = request.plan.seed,
            status = %result.status,
            duration_ms = result.duration_ms,
            "execution finished"
        );
        result
    }

    fn name(&self) -> &str {
        "python"
    }
}

/// How waiting on the process ended.
#[derive(Debug)]
pub(crate) enum WaitOutcome {
    Exited(ExitStatus),
    TimedOut,
    Overflowed,
    Cancelled,
    Failed(String),
}

/// Everything read back from one sandbox.
#[derive(Debug, Default)]
pub(crate) struct Streams {
    stdout: CappedBytes,
    stderr: CappedBytes,
    events: EventLog,
    /// A reader was still blocked when the drain grace ran out.
    stalled: bool,
}

/// Run `read` on its own thread; the receiver yields its result.
fn drain<T, F>(read: F) -> mpsc::Receiver<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(read());
    });
    rx
}

fn collect<T: Default>(rx: &mpsc::Receiver<T>, deadline: Instant, stalled: &mut bool) -> T {
    rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
        .unwrap_or_else(|_| {
            *stalled = true;
            T::default()
        })
}

/// Own process group plus an inheritable event pipe for the sandbox.
#[cfg(unix)]
fn isolate(cmd: &mut Command, events: &PipeWriter) {
    use std::os::unix::process::CommandExt;
    let fd = raw_fd(events);
    cmd.process_group(0);
    // SAFETY: the hook only calls fcntl, which is async-signal-safe, and
    // touches no memory of the parent.
    unsafe {
        cmd.pre_exec(move || {
            if libc::fcntl(fd, libc::F_SETFD, 0) == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn isolate(_cmd: &mut Command, _events: &PipeWriter) {}

#[cfg(unix)]
fn raw_fd(events: &PipeWriter) -> i32 {
    use std::os::fd::AsRawFd;
    events.as_raw_fd()
}

#[cfg(not(unix))]
fn raw_fd(_events: &PipeWriter) -> i32 {
    -1
}

/// Kill every process in the sandbox's group.
#[cfg(unix)]
fn kill_group(pid: u32) {
    if let Ok(pgid) = libc::pid_t::try_from(pid) {
        // SAFETY: killpg has no memory-safety preconditions; a group that
        // is already gone yields ESRCH, which is ignored.
        unsafe {
            libc::killpg(pgid, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

fn terminate_and_reap(child: &mut Child) {
    kill_group(child.id());
    let _ = child.kill();
    let _ = child.wait();
}

fn internal_fault(message: String, started: Instant) -> ExecutionResult {
    warn!(%message, "sandbox infrastructure failure");
    ExecutionResult::load_error(INTERNAL_FAULT).with_capture(
        String::new(),
        message,
        false,
        elapsed_ms(started),
    )
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(unix)]
fn hit_cpu_ceiling(status: &ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.signal() == Some(SIGXCPU)
}

#[cfg(not(unix))]
fn hit_cpu_ceiling(_status: &ExitStatus) -> bool {
    false
}

/// Driver events replayed against the only order the driver emits them in.
#[derive(Debug, Default)]
struct Progress {
    loaded: bool,
    constructed: bool,
    returned: Vec<Value>,
    terminal: Option<ExecutionResult>,
    violation: Option<String>,
}

impl Progress {
    fn replay(events: &[DriverEvent], calls: usize, phase: &mut Phase, unit: &str) -> Self {
        let mut progress = Self::default();
        for (position, event) in events.iter().enumerate() {
            if !progress.apply(event, calls) {
                progress.violation = Some(format!("unexpected {} event at position {position}", event.name()));
                progress.terminal = None;
                break;
            }
            if progress.loaded {
                phase.advance(Phase::Running, unit);
            }
        }
        progress
    }

    /// Apply one event; `false` when it cannot follow what came before.
    fn apply(&mut self, event: &DriverEvent, calls: usize) -> bool {
        if self.terminal.is_some() {
            return false;
        }
        let next = self.returned.len();
        match event {
            DriverEvent::Loaded if !self.loaded => self.loaded = true,
            DriverEvent::LoadError { kind } if !self.loaded => {
                self.terminal = Some(ExecutionResult::load_error(kind.as_str()));
            }
            DriverEvent::Constructed if self.loaded && !self.constructed => self.constructed = true,
            DriverEvent::Raised { index: None, kind } if self.loaded && !self.constructed => {
                self.terminal = Some(ExecutionResult::raised(kind.as_str(), RaiseSite::Construction, Vec::new()));
            }
            DriverEvent::Raised { index: Some(i), kind } if self.constructed && *i == next && next < calls => {
                self.terminal = Some(ExecutionResult::raised(kind.as_str(), RaiseSite::Call(*i), self.returned.clone()));
            }
            DriverEvent::Returned { index, value } if self.constructed && *index == next && next < calls => {
                self.returned.push(value.clone());
            }
            DriverEvent::Completed if self.constructed && next == calls => {
                self.terminal = Some(ExecutionResult::completed(self.returned.clone()));
            }
            _ => return false,
        }
        true
    }

    /// Where the next error would have been raised.
    fn next_site(&self) -> RaiseSite {
        if !self.loaded {
            RaiseSite::Load
        } else if !self.constructed {
            RaiseSite::Construction
        } else {
            RaiseSite::Call(self.returned.len())
        }
    }
}

/// Fold the wait outcome and the captured streams into a result.
pub(crate) fn interpret(
    outcome: WaitOutcome,
    streams: Streams,
    calls: usize,
    phase: &mut Phase,
    unit: &str,
    started: Instant,
) -> ExecutionResult {
    let Streams {
        stdout,
        stderr,
        events,
        stalled,
    } = streams;
    let progress = Progress::replay(&events.events, calls, phase, unit);
    let next_site = progress.next_site();
    let loaded = progress.loaded;

    let violation = progress.violation.clone().or_else(|| {
        (!events.is_clean()).then(|| {
            format!(
                "{} undecodable and {} surplus driver events",
                events.malformed, events.excess
            )
        })
    });
    let truncated = stdout.overflowed || stderr.overflowed;
    let mut diagnostics = stderr.text();
    if let Some(violation) = &violation {
        let error = HarnessError::Protocol(violation.clone());
        diagnostics.push_str(&format!("\n[{error}]"));
    }
    if stalled {
        diagnostics.push_str("\n[streams held open after the sandbox was killed]");
    }

    let Progress { returned, terminal, .. } = progress;
    let fault = |returned: Vec<Value>| {
        if loaded {
            ExecutionResult::raised(INTERNAL_FAULT, next_site, returned)
        } else {
            ExecutionResult::load_error(INTERNAL_FAULT)
        }
    };

    let result = match outcome {
        WaitOutcome::Cancelled => {
            diagnostics.push_str("\n[run cancelled]");
            ExecutionResult::timeout()
        }
        WaitOutcome::TimedOut => ExecutionResult::timeout(),
        WaitOutcome::Overflowed => ExecutionResult::raised(OUTPUT_LIMIT_EXCEEDED, next_site, returned),
        WaitOutcome::Failed(message) => {
            diagnostics.push_str(&format!("\n[wait failed: {message}]"));
            fault(returned)
        }
        WaitOutcome::Exited(_) if truncated => {
            ExecutionResult::raised(OUTPUT_LIMIT_EXCEEDED, next_site, returned)
        }
        WaitOutcome::Exited(_) if violation.is_some() => fault(returned),
        WaitOutcome::Exited(status) => match terminal {
            Some(result) => result,
            None if hit_cpu_ceiling(&status) => ExecutionResult::timeout(),
            None => {
                diagnostics.push_str(&format!("\n[process exited without result: {status}]"));
                fault(returned)
            }
        },
    };

    result.with_capture(stdout.text(), diagnostics, truncated, elapsed_ms(started))
}
