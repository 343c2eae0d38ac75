//! Verdict engine: classify a candidate's behavior against the pinned
//! reference behavior for one plan.

use super::equivalence::first_divergence;
use crate::assemble::TestCase;
use crate::config::Tolerance;
use crate::sandbox::{ExecStatus, ExecutionResult, RaiseSite};
use crate::synth::{CallPlan, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of one (reference, candidate) comparison.
///
/// Declaration order is severity order: the worst outcome of a pair is the
/// maximum across its plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// Reference behavior could not be pinned; excluded from scoring.
    ReferenceUnstable,
    /// Same observable behavior.
    Equivalent,
    /// Observable behavior differs.
    Mismatch,
    /// Candidate failed to load or its process died.
    CandidateCrashed,
    /// Candidate exceeded the time or CPU budget.
    CandidateTimedOut,
}

impl Outcome {
    /// Whether this outcome counts toward the pass rate.
    pub fn is_scored(self) -> bool {
        self != Self::ReferenceUnstable
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReferenceUnstable => "REFERENCE_UNSTABLE",
            Self::Equivalent => "EQUIVALENT",
            Self::Mismatch => "MISMATCH",
            Self::CandidateCrashed => "CANDIDATE_CRASHED",
            Self::CandidateTimedOut => "CANDIDATE_TIMED_OUT",
        };
        f.write_str(name)
    }
}

/// Terminal classification with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Outcome.
    pub outcome: Outcome,
    /// Why.
    pub explanation: String,
}

impl Verdict {
    /// Build a verdict.
    pub fn new(outcome: Outcome, explanation: impl Into<String>) -> Self {
        Self {
            outcome,
            explanation: explanation.into(),
        }
    }
}

/// Whether the reference's behavior on a plan can be pinned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum Stability {
    /// Two runs agreed and the reference neither hung nor failed to load.
    Stable,
    /// The reference cannot serve as an oracle for this plan.
    Unstable(String),
}

/// Compares execution results.
#[derive(Debug, Clone, Default)]
pub struct VerdictEngine {
    tolerance: Tolerance,
}

impl VerdictEngine {
    /// Engine with the given float tolerance.
    pub fn new(tolerance: Tolerance) -> Self {
        Self { tolerance }
    }

    /// Decide whether two independent reference runs pin a behavior.
    pub fn check_reference(&self, plan: &CallPlan, first: &ExecutionResult, second: &ExecutionResult) -> Stability {
        match first.status {
            ExecStatus::Timeout => return Stability::Unstable("reference timed out".to_string()),
            ExecStatus::LoadError => {
                return Stability::Unstable(format!("reference failed to load: {}", first.summary()))
            }
            _ if first.is_internal_fault() => {
                return Stability::Unstable(format!("reference process faulted: {}", first.summary()))
            }
            _ => {}
        }
        match self.first_difference(plan, first, second) {
            None => Stability::Stable,
            Some(diff) => Stability::Unstable(format!("reference is nondeterministic: {diff}")),
        }
    }

    /// Classify a candidate result against a pinned test case.
    pub fn judge(&self, case: &TestCase, candidate: &ExecutionResult) -> Verdict {
        if let Stability::Unstable(reason) = &case.stability {
            return Verdict::new(Outcome::ReferenceUnstable, reason.clone());
        }
        let reference = &case.expected;
        match candidate.status {
            ExecStatus::Timeout => {
                return Verdict::new(
                    Outcome::CandidateTimedOut,
                    format!("candidate exceeded its budget after {} ms", candidate.duration_ms),
                )
            }
            ExecStatus::LoadError => {
                let kind = candidate.raised_error_kind.as_deref().unwrap_or("unknown");
                return Verdict::new(Outcome::CandidateCrashed, format!("candidate failed to load: {kind}"));
            }
            _ if candidate.is_internal_fault() && !reference.is_internal_fault() => {
                let site = candidate.raised_at.map_or_else(String::new, |s| describe_site(&case.plan, s));
                return Verdict::new(Outcome::CandidateCrashed, format!("candidate process died during {site}"));
            }
            _ => {}
        }
        match self.first_difference(&case.plan, reference, candidate) {
            None => Verdict::new(Outcome::Equivalent, equivalent_explanation(reference)),
            Some(diff) => Verdict::new(Outcome::Mismatch, format!("first divergence at {diff}")),
        }
    }

    /// Walk both results step by step (construction, then each call) and
    /// describe the first step where they disagree.
    fn first_difference(&self, plan: &CallPlan, expected: &ExecutionResult, actual: &ExecutionResult) -> Option<String> {
        if matches!(expected.status, ExecStatus::Timeout | ExecStatus::LoadError)
            || matches!(actual.status, ExecStatus::Timeout | ExecStatus::LoadError)
        {
            return (expected.status != actual.status
                || expected.raised_error_kind != actual.raised_error_kind)
                .then(|| format!("status: expected {}, got {}", expected.summary(), actual.summary()));
        }
        let steps = plan.calls.len() + 2;
        for step in 0..steps {
            let e = observe(expected, step);
            let a = observe(actual, step);
            match (&e, &a) {
                (Step::Constructed, Step::Constructed) => continue,
                (Step::Returned(x), Step::Returned(y)) => {
                    if let Some(d) = first_divergence(x, y, &self.tolerance) {
                        return Some(format!("{}: {d}", describe_step(plan, step)));
                    }
                }
                (Step::Raised(k1), Step::Raised(k2)) if k1 == k2 => return None,
                (Step::Finished, Step::Finished) => return None,
                _ => {
                    return Some(format!(
                        "{}: expected {}, got {}",
                        describe_step(plan, step),
                        e.describe(),
                        a.describe()
                    ))
                }
            }
        }
        None
    }
}

/// What one result shows at one step.
enum Step<'r> {
    Constructed,
    Returned(&'r Value),
    Raised(&'r str),
    Finished,
}

impl Step<'_> {
    fn describe(&self) -> String {
        match self {
            Self::Constructed => "successful construction".to_string(),
            Self::Returned(v) => v.to_string(),
            Self::Raised(kind) => format!("raise {kind}"),
            Self::Finished => "end of plan".to_string(),
        }
    }
}

/// Step 0 is construction, step `i + 1` is call `i`.
fn observe(result: &ExecutionResult, step: usize) -> Step<'_> {
    let kind = result.raised_error_kind.as_deref().unwrap_or("unknown");
    let raised_here = match (result.status, result.raised_at, step) {
        (ExecStatus::Raised, Some(RaiseSite::Construction | RaiseSite::Load), 0) => true,
        (ExecStatus::Raised, Some(RaiseSite::Call(i)), s) => s == i + 1,
        _ => false,
    };
    if raised_here {
        return Step::Raised(kind);
    }
    if step == 0 {
        return Step::Constructed;
    }
    match result.return_values.get(step - 1) {
        Some(value) => Step::Returned(value),
        None => Step::Finished,
    }
}

fn describe_step(plan: &CallPlan, step: usize) -> String {
    if step == 0 {
        describe_site(plan, RaiseSite::Construction)
    } else {
        describe_site(plan, RaiseSite::Call(step - 1))
    }
}

fn describe_site(plan: &CallPlan, site: RaiseSite) -> String {
    match site {
        RaiseSite::Load => "load".to_string(),
        RaiseSite::Construction => "construction".to_string(),
        RaiseSite::Call(i) => match plan.calls.get(i) {
            Some(call) => format!("invocation {i} ({})", call.method),
            None => format!("invocation {i}"),
        },
    }
}

fn equivalent_explanation(reference: &ExecutionResult) -> String {
    match (reference.status, &reference.raised_error_kind) {
        (ExecStatus::Raised, Some(kind)) => format!(
            "both raised {kind} at {}",
            reference.raised_at.map_or_else(|| "unknown site".to_string(), |s| s.to_string())
        ),
        _ => format!("all {} return values match", reference.return_values.len()),
    }
}
