//! Result aggregation.
//!
//! Workers record plan verdicts concurrently; writes are serialized behind
//! a `parking_lot::RwLock` while readers share it.

use super::types::{PairReport, PlanRecord, Report, Summary};
use crate::config::Granularity;
use crate::corpus::SkippedUnit;
use crate::verdict::Outcome;
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct State {
    pairs: BTreeMap<String, BTreeMap<String, Vec<PlanRecord>>>,
    skipped: Vec<SkippedUnit>,
    cancelled: bool,
}

/// Collects plan verdicts into per-pair outcomes.
#[derive(Debug)]
pub struct Aggregator {
    granularity: Granularity,
    state: RwLock<State>,
}

impl Aggregator {
    /// Empty aggregator.
    pub fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            state: RwLock::new(State::default()),
        }
    }

    /// Record one plan verdict for a (unit, candidate) pair.
    pub fn record(&self, unit_id: &str, candidate: &str, record: PlanRecord) {
        let mut state = self.state.write();
        state
            .pairs
            .entry(unit_id.to_string())
            .or_default()
            .entry(candidate.to_string())
            .or_default()
            .push(record);
    }

    /// List a unit that could not be tested.
    pub fn record_skipped(&self, skipped: SkippedUnit) {
        self.state.write().skipped.push(skipped);
    }

    /// Flag the run as cancelled; recorded verdicts stay valid.
    pub fn mark_cancelled(&self) {
        self.state.write().cancelled = true;
    }

    /// Number of plan verdicts recorded.
    pub fn len(&self) -> usize {
        self.state
            .read()
            .pairs
            .values()
            .flat_map(|c| c.values())
            .map(Vec::len)
            .sum()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build the report from everything recorded so far.
    pub fn report(&self) -> Report {
        let state = self.state.read();
        let mut summary = Summary::default();
        let mut units = BTreeMap::new();
        for (unit_id, candidates) in &state.pairs {
            let mut pairs = BTreeMap::new();
            for (candidate, plans) in candidates {
                let mut plans = plans.clone();
                plans.sort_by(|a, b| a.variant.cmp(&b.variant).then(a.seed.cmp(&b.seed)));
                let pair = fold(&plans);
                summary.count(pair.outcome);
                pairs.insert(candidate.clone(), pair);
            }
            units.insert(unit_id.clone(), pairs);
        }
        summary.units = units.len();
        let mut skipped_units = state.skipped.clone();
        skipped_units.sort_by(|a, b| a.unit_id.cmp(&b.unit_id));
        Report {
            generator: format!("equiv {}", env!("CARGO_PKG_VERSION")),
            granularity: self.granularity,
            cancelled: state.cancelled,
            summary,
            units,
            skipped_units,
        }
    }
}

/// Worst scored outcome across plans; unstable only when nothing was scored.
fn fold(plans: &[PlanRecord]) -> PairReport {
    let worst = plans
        .iter()
        .filter(|p| p.outcome.is_scored())
        .max_by(|a, b| a.outcome.cmp(&b.outcome).then_with(|| b.seed.cmp(&a.seed)));
    let deciding = worst.or_else(|| plans.first());
    let (outcome, explanation) = match deciding {
        Some(plan) => (plan.outcome, format!("{}: {}", plan.label(), plan.explanation)),
        None => (Outcome::ReferenceUnstable, "no plans recorded".to_string()),
    };
    PairReport {
        outcome,
        explanation,
        plans: plans.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn record(seed: u64, outcome: Outcome, explanation: &str) -> PlanRecord {
        PlanRecord {
            seed,
            variant: None,
            outcome,
            explanation: explanation.to_string(),
            candidate_status: None,
            duration_ms: 1,
        }
    }

    #[test]
    fn test_worst_case_wins() {
        let agg = Aggregator::new(Granularity::PerVariant);
        agg.record("counter", "a", record(1, Outcome::Equivalent, "ok"));
        agg.record("counter", "a", record(2, Outcome::Mismatch, "bad value"));
        agg.record("counter", "a", record(3, Outcome::ReferenceUnstable, "flaky"));
        let report = agg.report();
        let pair = report.pair("counter", "a").unwrap();
        assert_eq!(pair.outcome, Outcome::Mismatch);
        assert_eq!(pair.explanation, "seed 2: bad value");
        assert_eq!(pair.plans.len(), 3);
    }

    #[test]
    fn test_timeout_dominates_crash() {
        let agg = Aggregator::new(Granularity::PerVariant);
        agg.record("u", "a", record(1, Outcome::CandidateCrashed, "x"));
        agg.record("u", "a", record(2, Outcome::CandidateTimedOut, "y"));
        let report = agg.report();
        assert_eq!(report.pair("u", "a").unwrap().outcome, Outcome::CandidateTimedOut);
    }

    #[test]
    fn test_only_unstable_is_excluded() {
        let agg = Aggregator::new(Granularity::PerVariant);
        agg.record("u", "a", record(1, Outcome::ReferenceUnstable, "flaky"));
        agg.record("v", "a", record(1, Outcome::Equivalent, "ok"));
        let report = agg.report();
        assert_eq!(report.pair("u", "a").unwrap().outcome, Outcome::ReferenceUnstable);
        assert_eq!(report.summary.scored, 1);
        assert_eq!(report.summary.pass_rate, Some(1.0));
        assert!(!report.has_failures());
    }

    #[test]
    fn test_concurrent_writers() {
        let agg = Arc::new(Aggregator::new(Granularity::PerUnit));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let agg = Arc::clone(&agg);
                thread::spawn(move || {
                    for seed in 0..25 {
                        agg.record(&format!("unit{}", i % 2), "cand", record(seed, Outcome::Equivalent, "ok"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(agg.len(), 200);
        assert_eq!(agg.report().summary.pairs, 2);
    }

    #[test]
    fn test_cancelled_and_skipped_in_report() {
        let agg = Aggregator::new(Granularity::PerVariant);
        agg.record_skipped(SkippedUnit {
            unit_id: "broken".to_string(),
            reason: "unparsable".to_string(),
        });
        agg.mark_cancelled();
        let report = agg.report();
        assert!(report.cancelled);
        assert_eq!(report.skipped_units.len(), 1);
        assert_eq!(report.summary.pass_rate, None);
        assert!(agg.is_empty());
    }
}
