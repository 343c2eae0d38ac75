//! Test cases: a plan with the reference behavior pinned against it.

use crate::corpus::Unit;
use crate::sandbox::{ExecutionResult, Executor};
use crate::synth::CallPlan;
use crate::verdict::{Stability, VerdictEngine};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A call plan plus the reference's observed behavior on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// The plan.
    pub plan: CallPlan,
    /// Reference result (first of the two runs).
    pub expected: ExecutionResult,
    /// Whether the reference behaved identically on both runs.
    pub stability: Stability,
}

impl TestCase {
    /// Assemble a case from its parts.
    pub fn new(plan: CallPlan, expected: ExecutionResult, stability: Stability) -> Self {
        Self {
            plan,
            expected,
            stability,
        }
    }

    /// Whether the pinned behavior can be scored.
    pub fn is_stable(&self) -> bool {
        self.stability == Stability::Stable
    }

    /// File name of the generated test module.
    pub fn artifact_name(&self) -> String {
        format!("test_{}_seed_{}.py", self.plan.unit_id, self.plan.seed)
    }
}

/// Pins reference behavior by running the reference twice per plan.
pub struct Assembler<'a> {
    executor: &'a dyn Executor,
    engine: &'a VerdictEngine,
}

impl<'a> Assembler<'a> {
    /// Assembler over an executor and the engine used for stability checks.
    pub fn new(executor: &'a dyn Executor, engine: &'a VerdictEngine) -> Self {
        Self { executor, engine }
    }

    /// Run the reference on `plan` and pin the result.
    pub fn pin(&self, reference: &Unit, plan: CallPlan) -> TestCase {
        let first = self.executor.execute(&reference.request(&plan));
        let second = self.executor.execute(&reference.request(&plan));
        let stability = self.engine.check_reference(&plan, &first, &second);
        match &stability {
            Stability::Stable => debug!(
                unit = %reference.id,
                seed = plan.seed,
                result = %first.summary(),
                "reference pinned"
            ),
            Stability::Unstable(reason) => warn!(
                unit = %reference.id,
                seed = plan.seed,
                %reason,
                "reference unstable"
            ),
        }
        TestCase::new(plan, first, stability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{ExecRequest, RaiseSite};
    use crate::signature::extract;
    use crate::synth::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Returns a different value on every run.
    struct Drifting {
        runs: AtomicUsize,
    }

    impl Executor for Drifting {
        fn execute(&self, _request: &ExecRequest<'_>) -> ExecutionResult {
            let n = self.runs.fetch_add(1, Ordering::SeqCst);
            ExecutionResult::completed(vec![Value::int(n as i64)])
        }

        fn name(&self) -> &str {
            "drifting"
        }
    }

    struct Stub;

    impl Executor for Stub {
        fn execute(&self, _request: &ExecRequest<'_>) -> ExecutionResult {
            ExecutionResult::raised("NotImplementedError", RaiseSite::Construction, vec![])
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn unit() -> Unit {
        let source = "class Counter:\n    def increment(self) -> int:\n        return 1\n";
        Unit::new(
            "counter",
            source.to_string(),
            "counter.py".into(),
            Arc::new(extract(source, Some("counter")).unwrap()),
        )
    }

    fn plan() -> CallPlan {
        CallPlan::new("counter", 3, vec![], vec![])
    }

    #[test]
    fn test_drifting_reference_is_unstable() {
        let engine = VerdictEngine::default();
        let executor = Drifting {
            runs: AtomicUsize::new(0),
        };
        let case = Assembler::new(&executor, &engine).pin(&unit(), plan());
        assert!(!case.is_stable());
        assert_eq!(executor.runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_raising_reference_is_pinned() {
        let engine = VerdictEngine::default();
        let case = Assembler::new(&Stub, &engine).pin(&unit(), plan());
        assert!(case.is_stable());
        assert_eq!(case.expected.raised_error_kind.as_deref(), Some("NotImplementedError"));
        assert_eq!(case.artifact_name(), "test_counter_seed_3.py");
    }
}
