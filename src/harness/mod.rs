//! Run orchestration.
//!
//! # Requirements
//!
//! - One fixed-size worker pool runs both reference pinning and candidate
//!   comparisons; a hanging candidate only occupies its own job.
//! - Jobs share the repository read-only and own their plans.
//! - Cancellation kills in-flight processes; verdicts recorded before it
//!   stay in the report, which is marked cancelled.

pub mod cancel;
pub mod pipeline;
pub mod repro;

pub use cancel::CancelToken;
pub use pipeline::DiffHarness;
pub use repro::ReproBundle;
