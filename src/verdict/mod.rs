//! Verdicts.
//!
//! # Requirements
//!
//! Decisions are taken in this order:
//!
//! 1. A reference that hung, failed to load, faulted or disagreed with
//!    itself across two runs gives `REFERENCE_UNSTABLE`.
//! 2. A candidate that timed out gives `CANDIDATE_TIMED_OUT`.
//! 3. A candidate that failed to load or whose process died gives
//!    `CANDIDATE_CRASHED`.
//! 4. Otherwise both behaviors are walked step by step; they are
//!    `EQUIVALENT` when every value matches and any raise has the same kind
//!    at the same step, and `MISMATCH` otherwise. Exception messages are
//!    never compared.

pub mod engine;
pub mod equivalence;

pub use engine::{Outcome, Stability, Verdict, VerdictEngine};
pub use equivalence::{equivalent, first_divergence, floats_close, Divergence};
