//! Run reports.
//!
//! # Requirements
//!
//! - Every attempted pair appears with an outcome, infrastructure failures
//!   included.
//! - A pair's outcome is the worst across its scored plans, in the order
//!   `EQUIVALENT < MISMATCH < CANDIDATE_CRASHED < CANDIDATE_TIMED_OUT`.
//! - Unstable plans are listed but not scored; a pair with only unstable
//!   plans is `REFERENCE_UNSTABLE` and left out of the pass rate.

pub mod aggregator;
pub mod types;

pub use aggregator::Aggregator;
pub use types::{PairReport, PlanRecord, Report, Summary};
