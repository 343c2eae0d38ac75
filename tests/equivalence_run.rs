//! End-to-end runs over the fixture corpus with live Python sandboxes.
//!
//! # Requirements
//!
//! A Python 3 interpreter named by `EQUIV_PYTHON`, or `python3` on `PATH`.
//! Tests skip with a message when none can be started.

use equiv_harness::config::{ExecLimits, Granularity, HarnessConfig};
use equiv_harness::corpus::Repository;
use equiv_harness::harness::{CancelToken, DiffHarness, ReproBundle};
use equiv_harness::report::Report;
use equiv_harness::sandbox::ProcessExecutor;
use equiv_harness::verdict::Outcome;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

fn python_available() -> bool {
    Command::new(&ExecLimits::standard().python)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Skip test if no Python interpreter can be started.
macro_rules! skip_if_no_python {
    () => {
        if !python_available() {
            eprintln!("python interpreter not available, skipping end-to-end tests");
            return;
        }
    };
}

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn candidate_dirs(names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(|n| fixtures().join("candidates").join(n)).collect()
}

fn config(granularity: Granularity) -> HarnessConfig {
    let mut config = HarnessConfig::standard();
    config.workers = 4;
    config.seeds = 2;
    config.granularity = granularity;
    config.limits = ExecLimits::standard().with_timeout(Duration::from_secs(1));
    config
}

fn harness(granularity: Granularity, candidates: &[&str]) -> DiffHarness<ProcessExecutor> {
    let config = config(granularity);
    let repo = Repository::load(&fixtures().join("corpus"), &candidate_dirs(candidates)).unwrap();
    let cancel = CancelToken::new();
    let executor = ProcessExecutor::new(config.limits.clone(), cancel.clone());
    DiffHarness::new(config, Arc::new(repo), executor, cancel).unwrap()
}

fn outcome(report: &Report, unit: &str, candidate: &str) -> Outcome {
    report
        .pair(unit, candidate)
        .unwrap_or_else(|| panic!("no pair {unit}/{candidate}"))
        .outcome
}

#[test]
fn identical_candidate_is_equivalent_everywhere() {
    skip_if_no_python!();
    let report = harness(Granularity::PerVariant, &["identical"]).run().unwrap();
    for unit in ["counter", "ledger", "stub"] {
        let pair = report.pair(unit, "identical").unwrap();
        assert_eq!(pair.outcome, Outcome::Equivalent, "{unit}: {}", pair.explanation);
    }
    assert_eq!(report.summary.pass_rate, Some(1.0));
    assert!(!report.has_failures());
}

#[test]
fn mixed_candidates_are_classified() {
    skip_if_no_python!();
    let report = harness(
        Granularity::PerVariant,
        &["off_by_one", "wrong_kind", "reworded", "hang", "syntax", "model"],
    )
    .run()
    .unwrap();

    let off = report.pair("counter", "off_by_one").unwrap();
    assert_eq!(off.outcome, Outcome::Mismatch);
    assert!(off.explanation.contains("invocation 0"), "{}", off.explanation);

    assert_eq!(outcome(&report, "stub", "wrong_kind"), Outcome::Mismatch);
    assert_eq!(outcome(&report, "stub", "reworded"), Outcome::Equivalent);
    assert_eq!(outcome(&report, "counter", "hang"), Outcome::CandidateTimedOut);
    assert_eq!(outcome(&report, "counter", "syntax"), Outcome::CandidateCrashed);
    assert_eq!(outcome(&report, "counter", "model/full_docstring"), Outcome::Equivalent);
    assert_eq!(outcome(&report, "counter", "model/no_docstring"), Outcome::Mismatch);

    // Units a candidate directory does not provide still get a verdict.
    let missing = report.pair("ledger", "off_by_one").unwrap();
    assert_eq!(missing.outcome, Outcome::CandidateCrashed);
    assert!(missing.explanation.contains("candidate source missing"));
    assert!(report.has_failures());
}

#[test]
fn per_unit_granularity_takes_worst_variant() {
    skip_if_no_python!();
    let report = harness(Granularity::PerUnit, &["model"]).run().unwrap();
    let pair = report.pair("counter", "model").unwrap();
    assert_eq!(pair.outcome, Outcome::Mismatch);
    assert_eq!(pair.plans.len(), 4);
    assert!(pair.explanation.contains("[no_docstring]"), "{}", pair.explanation);
    assert!(report.pair("counter", "model/full_docstring").is_none());
}

#[test]
fn repro_bundles_written_for_failures() {
    skip_if_no_python!();
    let tmp = tempfile::tempdir().unwrap();
    let report = harness(Granularity::PerVariant, &["off_by_one"])
        .with_repro_dir(tmp.path())
        .run()
        .unwrap();
    assert!(report.has_failures());

    let bundles: Vec<PathBuf> = fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.file_name().unwrap().to_string_lossy().starts_with("counter__off_by_one"))
        .collect();
    assert_eq!(bundles.len(), 2);
    let bundle: ReproBundle = serde_json::from_str(&fs::read_to_string(&bundles[0]).unwrap()).unwrap();
    assert_eq!(bundle.verdict.outcome, Outcome::Mismatch);
    assert_eq!(bundle.plan.unit_id, "counter");
}

fn run_artifact(python: &Path, artifact: &Path, unit: &Path) -> bool {
    Command::new(python)
        .arg(artifact)
        .env("EQUIV_UNIT_PATH", unit)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[test]
fn emitted_tests_check_candidates_like_the_harness() {
    skip_if_no_python!();
    let tmp = tempfile::tempdir().unwrap();
    harness(Granularity::PerVariant, &["identical"])
        .with_emit_tests(tmp.path())
        .run()
        .unwrap();

    let python = ExecLimits::standard().python;
    let mut counter_tests: Vec<PathBuf> = fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.file_name().unwrap().to_string_lossy().starts_with("test_counter_seed_"))
        .collect();
    counter_tests.sort();
    assert_eq!(counter_tests.len(), 2);

    let candidates = fixtures().join("candidates");
    for artifact in &counter_tests {
        assert!(run_artifact(&python, artifact, &fixtures().join("corpus/counter.py")));
        assert!(run_artifact(&python, artifact, &candidates.join("identical/counter.py")));
        assert!(!run_artifact(&python, artifact, &candidates.join("off_by_one/counter.py")));
    }

    let stub_test = fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.file_name().unwrap().to_string_lossy().starts_with("test_stub_seed_"))
        .unwrap();
    assert!(run_artifact(&python, &stub_test, &candidates.join("reworded/stub.py")));
    assert!(!run_artifact(&python, &stub_test, &candidates.join("wrong_kind/stub.py")));
}

#[test]
fn unstable_reference_is_reported_and_not_scored() {
    skip_if_no_python!();
    let tmp = tempfile::tempdir().unwrap();
    let corpus = tmp.path().join("corpus");
    let engine = tmp.path().join("engine");
    let jitter = "import random\n\nclass Jitter:\n    def sample(self) -> float:\n        return random.random()\n";
    let counter = fs::read_to_string(fixtures().join("corpus/counter.py")).unwrap();
    for dir in [&corpus, &engine] {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("jitter.py"), jitter).unwrap();
        fs::write(dir.join("counter.py"), &counter).unwrap();
    }

    let config = config(Granularity::PerVariant);
    let seeds = config.seeds;
    let repo = Repository::load(&corpus, &[engine]).unwrap();
    let cancel = CancelToken::new();
    let executor = ProcessExecutor::new(config.limits.clone(), cancel.clone());
    let report = DiffHarness::new(config, Arc::new(repo), executor, cancel)
        .unwrap()
        .run()
        .unwrap();

    let pair = report.pair("jitter", "engine").unwrap();
    assert_eq!(pair.outcome, Outcome::ReferenceUnstable, "{}", pair.explanation);
    assert_eq!(pair.plans.len(), seeds);
    assert!(pair.plans.iter().all(|p| p.outcome == Outcome::ReferenceUnstable));
    assert_eq!(outcome(&report, "counter", "engine"), Outcome::Equivalent);

    assert_eq!(report.summary.unstable, 1);
    assert_eq!(report.summary.scored, 1);
    assert_eq!(report.summary.pass_rate, Some(1.0));
    assert!(!report.has_failures());
}

#[test]
fn single_worker_moves_on_after_timeout() {
    skip_if_no_python!();
    let mut config = config(Granularity::PerVariant);
    config.workers = 1;
    let repo = Repository::load(&fixtures().join("corpus"), &candidate_dirs(&["hang", "identical"])).unwrap();
    let cancel = CancelToken::new();
    let executor = ProcessExecutor::new(config.limits.clone(), cancel.clone());
    let report = DiffHarness::new(config, Arc::new(repo), executor, cancel)
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(outcome(&report, "counter", "hang"), Outcome::CandidateTimedOut);
    for unit in ["counter", "ledger", "stub"] {
        assert_eq!(outcome(&report, unit, "identical"), Outcome::Equivalent, "{unit}");
    }
}
