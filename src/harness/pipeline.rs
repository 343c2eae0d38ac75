//! Run orchestration.
//!
//! A run has two phases on one fixed-size `rayon` pool. Preparation works
//! per unit: probe untyped parameters, synthesize the plans and pin the
//! reference behavior on each. Comparison then runs one job per
//! (unit, candidate, plan) and feeds the [`Aggregator`].

use super::cancel::CancelToken;
use super::repro::ReproBundle;
use crate::assemble::{render, write_all, Assembler, TestCase};
use crate::config::{Granularity, HarnessConfig};
use crate::corpus::{CandidateSource, Repository, Unit};
use crate::error::{HarnessError, HarnessResult};
use crate::report::{Aggregator, PlanRecord, Report};
use crate::sandbox::{ExecStatus, Executor};
use crate::synth::{derive_seeds, FallbackChoices, PlanBuilder, LADDER_LEN};
use crate::verdict::{Outcome, Verdict, VerdictEngine};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Pinned cases for one reference unit.
struct Prepared {
    unit: Arc<Unit>,
    cases: Vec<TestCase>,
}

/// One candidate implementation of one unit.
struct Pair<'p> {
    prepared: &'p Prepared,
    source: &'p CandidateSource,
    key: String,
    candidate: Result<Unit, String>,
}

/// Differential harness over a loaded repository.
pub struct DiffHarness<E: Executor> {
    config: HarnessConfig,
    repository: Arc<Repository>,
    executor: E,
    engine: VerdictEngine,
    cancel: CancelToken,
    emit_tests: Option<PathBuf>,
    repro_dir: Option<PathBuf>,
}

impl<E: Executor> DiffHarness<E> {
    /// Harness over `repository`; rejects an invalid configuration.
    pub fn new(
        config: HarnessConfig,
        repository: Arc<Repository>,
        executor: E,
        cancel: CancelToken,
    ) -> HarnessResult<Self> {
        config.validate()?;
        Ok(Self {
            engine: VerdictEngine::new(config.tolerance),
            config,
            repository,
            executor,
            cancel,
            emit_tests: None,
            repro_dir: None,
        })
    }

    /// Write a `unittest` module per pinned case into `dir`.
    pub fn with_emit_tests(mut self, dir: impl Into<PathBuf>) -> Self {
        self.emit_tests = Some(dir.into());
        self
    }

    /// Write a repro bundle per non-equivalent scored plan into `dir`.
    pub fn with_repro_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.repro_dir = Some(dir.into());
        self
    }

    /// Run every unit against every candidate.
    pub fn run(&self) -> HarnessResult<Report> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|i| format!("equiv-worker-{i}"))
            .build()
            .map_err(|e| HarnessError::InvalidConfig(format!("worker pool: {e}")))?;

        let aggregator = Aggregator::new(self.config.granularity);
        for skipped in self.repository.skipped() {
            aggregator.record_skipped(skipped.clone());
        }

        info!(
            units = self.repository.len(),
            candidates = self.repository.candidates().len(),
            workers = self.config.workers,
            seeds = self.config.seeds,
            executor = self.executor.name(),
            "run started"
        );

        pool.install(|| -> HarnessResult<()> {
            let units: Vec<Arc<Unit>> = self.repository.units().cloned().collect();
            let prepared: Vec<Prepared> = units
                .into_par_iter()
                .map(|unit| Prepared {
                    cases: self.prepare(&unit),
                    unit,
                })
                .collect();
            info!(
                cases = prepared.iter().map(|p| p.cases.len()).sum::<usize>(),
                "reference behavior pinned"
            );

            if let Some(dir) = &self.emit_tests {
                self.emit(dir, &prepared)?;
            }

            let pairs = self.pairs(&prepared);
            let jobs: Vec<(&Pair<'_>, &TestCase)> = pairs
                .iter()
                .flat_map(|pair| pair.prepared.cases.iter().map(move |case| (pair, case)))
                .collect();
            jobs.into_par_iter()
                .for_each(|(pair, case)| self.compare(pair, case, &aggregator));
            Ok(())
        })?;

        if self.cancel.is_cancelled() {
            warn!("run cancelled; report holds the verdicts recorded so far");
            aggregator.mark_cancelled();
        }
        let report = aggregator.report();
        info!(summary = %report.summary_line(), "run finished");
        Ok(report)
    }

    /// Probe, synthesize and pin the plans for one reference.
    pub fn prepare(&self, unit: &Unit) -> Vec<TestCase> {
        if self.cancel.is_cancelled() {
            return Vec::new();
        }
        let mut builder = PlanBuilder::new(&unit.signature).with_extra_calls(self.config.extra_calls);
        if self.config.probe_untyped && unit.signature.has_untyped_params() {
            builder = builder.with_fallback(self.probe(unit));
        }
        let assembler = Assembler::new(&self.executor, &self.engine);
        derive_seeds(self.config.base_seed, &unit.id, self.config.seeds)
            .into_par_iter()
            .filter_map(|seed| {
                if self.cancel.is_cancelled() {
                    return None;
                }
                let plan = builder.build(&unit.id, seed);
                if let Err(e) = plan.check_arity(&unit.signature) {
                    warn!(unit = %unit.id, seed, error = %e, "discarding malformed plan");
                    return None;
                }
                Some(assembler.pin(unit, plan))
            })
            .collect()
    }

    /// Choose a ladder rung for every untyped parameter of `unit`.
    ///
    /// Each slot takes the first rung on which the reference completes.
    /// Probing stops once the probe budget is spent; remaining slots keep
    /// rung 0.
    pub fn probe(&self, unit: &Unit) -> FallbackChoices {
        let mut choices = FallbackChoices::new();
        let slots = PlanBuilder::new(&unit.signature).untyped_slots();
        let mut budget = self.config.probe_budget;
        'slots: for slot in slots {
            for rung in 0..LADDER_LEN {
                if budget == 0 || self.cancel.is_cancelled() {
                    debug!(unit = %unit.id, "probe budget exhausted");
                    break 'slots;
                }
                budget -= 1;
                let plan = PlanBuilder::new(&unit.signature)
                    .with_fallback(choices.clone())
                    .probe(&unit.id, self.config.base_seed, &slot, rung);
                let result = self.executor.execute(&unit.request(&plan));
                if result.status == ExecStatus::Completed {
                    debug!(unit = %unit.id, ?slot, rung, "untyped parameter resolved");
                    choices.choose(slot, rung);
                    break;
                }
            }
        }
        choices
    }

    fn emit(&self, dir: &Path, prepared: &[Prepared]) -> HarnessResult<()> {
        let mut artifacts = Vec::new();
        for p in prepared {
            for case in &p.cases {
                artifacts.push(render(case, &p.unit, &self.config.tolerance)?);
            }
        }
        let written = write_all(dir, &artifacts)?;
        info!(dir = %dir.display(), files = written.len(), "test modules written");
        Ok(())
    }

    fn pairs<'p>(&'p self, prepared: &'p [Prepared]) -> Vec<Pair<'p>> {
        let mut pairs = Vec::new();
        for p in prepared {
            for source in self.repository.candidates() {
                let candidate = match self.repository.load_candidate(&p.unit, source) {
                    Ok(Some(unit)) => Ok(unit),
                    Ok(None) => Err(format!(
                        "candidate source missing: {}",
                        source.path_for(&p.unit.id).display()
                    )),
                    Err(e) => Err(format!("candidate source unreadable: {e}")),
                };
                pairs.push(Pair {
                    prepared: p,
                    source,
                    key: source.key(self.config.granularity),
                    candidate,
                });
            }
        }
        pairs
    }

    fn compare(&self, pair: &Pair<'_>, case: &TestCase, aggregator: &Aggregator) {
        if self.cancel.is_cancelled() {
            return;
        }
        let unit_id = &pair.prepared.unit.id;
        let variant = match self.config.granularity {
            Granularity::PerUnit => pair.source.variant.clone(),
            Granularity::PerVariant => None,
        };

        let (verdict, actual) = match &pair.candidate {
            Err(reason) if case.is_stable() => (Verdict::new(Outcome::CandidateCrashed, reason.clone()), None),
            Err(_) => (self.engine.judge(case, &case.expected), None),
            Ok(candidate) => {
                let result = self.executor.execute(&candidate.request(&case.plan));
                if self.cancel.is_cancelled() {
                    debug!(unit = %unit_id, candidate = %pair.key, "dropping verdict of cancelled job");
                    return;
                }
                (self.engine.judge(case, &result), Some(result))
            }
        };
        debug!(
            unit = %unit_id,
            candidate = %pair.key,
            seed = case.plan.seed,
            outcome = %verdict.outcome,
            "plan judged"
        );

        if let (Some(dir), Some(result), Ok(candidate)) = (&self.repro_dir, &actual, &pair.candidate) {
            if verdict.outcome.is_scored() && verdict.outcome != Outcome::Equivalent {
                let bundle = ReproBundle {
                    unit_id: unit_id.clone(),
                    candidate: pair.key.clone(),
                    candidate_path: candidate.origin.clone(),
                    plan: case.plan.clone(),
                    expected: case.expected.clone(),
                    actual: result.clone(),
                    verdict: verdict.clone(),
                };
                if let Err(e) = bundle.save(dir) {
                    warn!(unit = %unit_id, error = %e, "repro bundle not written");
                }
            }
        }

        aggregator.record(
            unit_id,
            &pair.key,
            PlanRecord {
                seed: case.plan.seed,
                variant,
                outcome: verdict.outcome,
                explanation: verdict.explanation,
                candidate_status: actual.as_ref().map(|r| r.status),
                duration_ms: actual.as_ref().map_or(0, |r| r.duration_ms),
            },
        );
    }
}
