//! Reproduction bundles for non-equivalent plans.

use crate::error::{HarnessError, HarnessResult};
use crate::sandbox::ExecutionResult;
use crate::synth::CallPlan;
use crate::verdict::Verdict;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Everything needed to replay one failing comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReproBundle {
    /// Unit id.
    pub unit_id: String,
    /// Candidate report key.
    pub candidate: String,
    /// Candidate source path.
    pub candidate_path: PathBuf,
    /// The plan that exposed the difference.
    pub plan: CallPlan,
    /// Pinned reference behavior.
    pub expected: ExecutionResult,
    /// Observed candidate behavior.
    pub actual: ExecutionResult,
    /// Verdict reached.
    pub verdict: Verdict,
}

impl ReproBundle {
    /// File name for this bundle; `/` in variant keys becomes `__`.
    pub fn file_name(&self) -> String {
        format!(
            "{}__{}__seed_{}.json",
            self.unit_id,
            self.candidate.replace('/', "__"),
            self.plan.seed
        )
    }

    /// Human-readable report.
    pub fn to_report(&self) -> String {
        format!(
            r#"=== Equivalence Failure ===
Unit: {}
Candidate: {} ({})
Verdict: {} ({})
Plan: {}

Reference: {}
Candidate: {}
Candidate stderr:
{}
"#,
            self.unit_id,
            self.candidate,
            self.candidate_path.display(),
            self.verdict.outcome,
            self.verdict.explanation,
            self.plan.describe(),
            self.expected.summary(),
            self.actual.summary(),
            self.actual.diagnostics.trim_end(),
        )
    }

    /// Pretty JSON.
    pub fn to_json(&self) -> HarnessResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the bundle as JSON into `dir`, returning its path.
    pub fn save(&self, dir: &Path) -> HarnessResult<PathBuf> {
        fs::create_dir_all(dir).map_err(|e| HarnessError::io(dir, e))?;
        let path = dir.join(self.file_name());
        fs::write(&path, self.to_json()?).map_err(|e| HarnessError::io(&path, e))?;
        Ok(path)
    }
}
