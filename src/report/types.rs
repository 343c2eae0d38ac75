//! Report types.

use crate::config::Granularity;
use crate::corpus::SkippedUnit;
use crate::error::{HarnessError, HarnessResult};
use crate::sandbox::ExecStatus;
use crate::verdict::Outcome;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Verdict for one plan of one pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRecord {
    /// Plan seed.
    pub seed: u64,
    /// Docstring variant, when variants are collapsed into one pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    /// Outcome for this plan.
    pub outcome: Outcome,
    /// Explanation for this plan.
    pub explanation: String,
    /// Candidate execution status, when it ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_status: Option<ExecStatus>,
    /// Candidate execution time.
    #[serde(default)]
    pub duration_ms: u64,
}

impl PlanRecord {
    /// Short label used in pair explanations.
    pub fn label(&self) -> String {
        match &self.variant {
            Some(variant) => format!("seed {} [{variant}]", self.seed),
            None => format!("seed {}", self.seed),
        }
    }
}

/// Outcome of one (unit, candidate) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairReport {
    /// Worst scored outcome across plans.
    pub outcome: Outcome,
    /// Explanation of the plan that set the outcome.
    pub explanation: String,
    /// Per-plan detail, unstable plans included.
    pub plans: Vec<PlanRecord>,
}

/// Aggregate counts over pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Units with at least one recorded pair.
    pub units: usize,
    /// Recorded pairs.
    pub pairs: usize,
    /// Pairs judged equivalent.
    pub equivalent: usize,
    /// Pairs with a behavioral mismatch.
    pub mismatch: usize,
    /// Pairs whose candidate crashed.
    pub crashed: usize,
    /// Pairs whose candidate timed out.
    pub timed_out: usize,
    /// Pairs excluded because the reference was unstable.
    pub unstable: usize,
    /// Pairs counted in the pass rate.
    pub scored: usize,
    /// `equivalent / scored`; absent when nothing was scored.
    pub pass_rate: Option<f64>,
}

impl Summary {
    /// Count one pair outcome.
    pub fn count(&mut self, outcome: Outcome) {
        self.pairs += 1;
        match outcome {
            Outcome::ReferenceUnstable => self.unstable += 1,
            Outcome::Equivalent => self.equivalent += 1,
            Outcome::Mismatch => self.mismatch += 1,
            Outcome::CandidateCrashed => self.crashed += 1,
            Outcome::CandidateTimedOut => self.timed_out += 1,
        }
        self.scored = self.pairs - self.unstable;
        self.pass_rate = (self.scored > 0).then(|| self.equivalent as f64 / self.scored as f64);
    }

    /// Whether every scored pair is equivalent.
    pub fn all_equivalent(&self) -> bool {
        self.equivalent == self.scored
    }
}

/// Final report of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Harness version.
    pub generator: String,
    /// Variant keying policy used.
    pub granularity: Granularity,
    /// Whether the run was cancelled before all jobs finished.
    pub cancelled: bool,
    /// Aggregate counts.
    pub summary: Summary,
    /// `unit_id -> candidate -> pair`.
    pub units: BTreeMap<String, BTreeMap<String, PairReport>>,
    /// References that could not be used.
    pub skipped_units: Vec<SkippedUnit>,
}

impl Report {
    /// Look up one pair.
    pub fn pair(&self, unit_id: &str, candidate: &str) -> Option<&PairReport> {
        self.units.get(unit_id).and_then(|c| c.get(candidate))
    }

    /// Whether the run found mismatches, crashes or timeouts.
    pub fn has_failures(&self) -> bool {
        !self.summary.all_equivalent()
    }

    /// One-line summary for the console.
    pub fn summary_line(&self) -> String {
        let s = &self.summary;
        let rate = s
            .pass_rate
            .map_or_else(|| "n/a".to_string(), |r| format!("{:.1}%", r * 100.0));
        format!(
            "{} equivalent, {} mismatch, {} crashed, {} timed out, {} unstable (pairs: {}, pass rate: {})",
            s.equivalent, s.mismatch, s.crashed, s.timed_out, s.unstable, s.pairs, rate
        )
    }

    /// Pretty JSON.
    pub fn to_json(&self) -> HarnessResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report as pretty JSON.
    pub fn save(&self, path: &Path) -> HarnessResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| HarnessError::io(parent, e))?;
        }
        fs::write(path, self.to_json()?).map_err(|e| HarnessError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_rate_excludes_unstable() {
        let mut summary = Summary::default();
        summary.count(Outcome::Equivalent);
        summary.count(Outcome::Mismatch);
        summary.count(Outcome::ReferenceUnstable);
        assert_eq!(summary.pairs, 3);
        assert_eq!(summary.scored, 2);
        assert_eq!(summary.pass_rate, Some(0.5));
        assert!(!summary.all_equivalent());
    }

    #[test]
    fn test_pass_rate_null_when_nothing_scored() {
        let mut summary = Summary::default();
        summary.count(Outcome::ReferenceUnstable);
        assert_eq!(summary.pass_rate, None);
        assert!(summary.all_equivalent());
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json["pass_rate"].is_null());
    }

    #[test]
    fn test_plan_label() {
        let record = PlanRecord {
            seed: 4,
            variant: Some("no_docstring".to_string()),
            outcome: Outcome::Equivalent,
            explanation: String::new(),
            candidate_status: None,
            duration_ms: 0,
        };
        assert_eq!(record.label(), "seed 4 [no_docstring]");
    }
}
