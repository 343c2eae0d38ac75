//! Differential functional-equivalence harness for small Python class units.
//!
//! A reference implementation of each unit pins the expected behavior on
//! randomized call sequences; candidate implementations are run against
//! the same sequences in isolated interpreter processes and classified.
//!
//! # Architecture
//!
//! - [`signature`] - static extraction of a unit's public surface
//! - [`synth`] - value model and call-plan synthesis
//! - [`sandbox`] - process-isolated execution with resource ceilings
//! - [`assemble`] - pinning reference behavior and rendering test modules
//! - [`verdict`] - comparing a candidate result against the pinned case
//! - [`report`] - aggregation into per-pair outcomes
//! - [`harness`] - run orchestration, cancellation and repro bundles
//! - [`corpus`] - loading references and candidate layouts
//! - [`config`], [`error`] - configuration and harness errors
//!
//! Unit code never runs inside this process.

// Library code reports failures as data or errors, never by aborting.
// Tests are checked separately with `cargo test`.
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

pub mod assemble;
pub mod config;
pub mod corpus;
pub mod error;
pub mod harness;
pub mod report;
pub mod sandbox;
pub mod signature;
pub mod synth;
pub mod verdict;

// Re-export commonly used types
pub use config::{ExecLimits, Granularity, HarnessConfig, Tolerance};
pub use corpus::{Repository, Unit};
pub use error::{HarnessError, HarnessResult};
pub use harness::{CancelToken, DiffHarness};
pub use report::Report;
pub use sandbox::{ExecStatus, ExecutionResult, Executor, ProcessExecutor};
pub use signature::Signature;
pub use synth::{CallPlan, Value};
pub use verdict::{Outcome, Verdict};
