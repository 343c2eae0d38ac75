//! Execution results and the per-execution state machine.

use crate::synth::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

/// Error kind recorded when the sandbox itself fails or the process dies.
pub const INTERNAL_FAULT: &str = "InternalFault";

/// Error kind recorded when a unit exceeds the output cap.
pub const OUTPUT_LIMIT_EXCEEDED: &str = "OutputLimitExceeded";

/// Terminal status of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecStatus {
    /// Construction and every call returned.
    Completed,
    /// Construction or a call raised.
    Raised,
    /// Killed by the wall clock or the CPU ceiling.
    Timeout,
    /// The source did not load or the class is missing.
    LoadError,
}

impl fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Completed => "COMPLETED",
            Self::Raised => "RAISED",
            Self::Timeout => "TIMEOUT",
            Self::LoadError => "LOAD_ERROR",
        };
        f.write_str(name)
    }
}

/// Where an error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "site", content = "index", rename_all = "snake_case")]
pub enum RaiseSite {
    /// While loading the source.
    Load,
    /// In the constructor.
    Construction,
    /// In the method call at this index.
    Call(usize),
}

impl fmt::Display for RaiseSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load => f.write_str("load"),
            Self::Construction => f.write_str("construction"),
            Self::Call(i) => write!(f, "invocation {i}"),
        }
    }
}

/// Execution phase, advanced as driver events arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not yet spawned.
    Pending,
    /// Process running, source not loaded yet.
    Loading,
    /// Class loaded; constructing or calling.
    Running,
}

impl Phase {
    /// Move to `next`, tracing the transition.
    pub fn advance(&mut self, next: Phase, unit: &str) {
        if *self != next {
            trace!(unit, from = ?*self, to = ?next, "executor phase");
            *self = next;
        }
    }
}

/// Observed outcome of running one plan against one implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Terminal status.
    pub status: ExecStatus,
    /// One value per completed method call.
    pub return_values: Vec<Value>,
    /// Python exception class name, when raised.
    pub raised_error_kind: Option<String>,
    /// Where the error was raised.
    pub raised_at: Option<RaiseSite>,
    /// Wall-clock duration.
    pub duration_ms: u64,
    /// Unit stdout, excluding driver events.
    pub captured_output: String,
    /// Captured stderr (tracebacks, warnings).
    pub diagnostics: String,
    /// Whether either stream hit the output cap.
    pub output_truncated: bool,
}

impl ExecutionResult {
    /// Result with the given status and nothing observed.
    pub fn empty(status: ExecStatus) -> Self {
        Self {
            status,
            return_values: Vec::new(),
            raised_error_kind: None,
            raised_at: None,
            duration_ms: 0,
            captured_output: String::new(),
            diagnostics: String::new(),
            output_truncated: false,
        }
    }

    /// Successful run with these return values.
    pub fn completed(return_values: Vec<Value>) -> Self {
        Self {
            return_values,
            ..Self::empty(ExecStatus::Completed)
        }
    }

    /// Run that raised `kind` at `site` after returning `preceding`.
    pub fn raised(kind: impl Into<String>, site: RaiseSite, preceding: Vec<Value>) -> Self {
        Self {
            return_values: preceding,
            raised_error_kind: Some(kind.into()),
            raised_at: Some(site),
            ..Self::empty(ExecStatus::Raised)
        }
    }

    /// Load failure with error kind `kind`.
    pub fn load_error(kind: impl Into<String>) -> Self {
        Self {
            raised_error_kind: Some(kind.into()),
            raised_at: Some(RaiseSite::Load),
            ..Self::empty(ExecStatus::LoadError)
        }
    }

    /// Timed-out run.
    pub fn timeout() -> Self {
        Self::empty(ExecStatus::Timeout)
    }

    /// Attach stream captures and duration.
    pub fn with_capture(mut self, output: String, diagnostics: String, truncated: bool, duration_ms: u64) -> Self {
        self.captured_output = output;
        self.diagnostics = diagnostics;
        self.output_truncated = truncated;
        self.duration_ms = duration_ms;
        self
    }

    /// Whether the process failed without a unit-level explanation.
    pub fn is_internal_fault(&self) -> bool {
        self.raised_error_kind.as_deref() == Some(INTERNAL_FAULT)
    }

    /// One-line summary for explanations and logs.
    pub fn summary(&self) -> String {
        match (&self.raised_error_kind, &self.raised_at) {
            (Some(kind), Some(site)) => format!("{} {kind} at {site}", self.status),
            (Some(kind), None) => format!("{} {kind}", self.status),
            _ => format!("{} with {} values", self.status, self.return_values.len()),
        }
    }
}
