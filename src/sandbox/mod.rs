//! Sandboxed execution.
//!
//! Every plan runs against one implementation in a fresh interpreter
//! process: no process is reused across candidates, plans or seeds.
//!
//! # Requirements
//!
//! - The executor always returns a well-formed [`ExecutionResult`]; spawn
//!   failures, crashes and protocol problems become `InternalFault`.
//! - Wall-clock timeout kills the process; the result is `TIMEOUT` with
//!   partial output kept and no return values.
//! - CPU and address-space ceilings are applied inside the process before
//!   the unit loads; exceeding the CPU ceiling is a `TIMEOUT`.
//! - Output beyond the per-stream cap kills the process and is reported as
//!   `RAISED OutputLimitExceeded`.
//! - The sandbox runs in its own process group and the whole group is
//!   killed, so processes spawned by the unit cannot outlive the budget.
//! - Driver events travel on a private pipe and must form one valid
//!   sequence; anything else is a protocol violation and an `InternalFault`.

pub mod capture;
pub mod driver;
pub mod executor;
pub mod result;

pub use driver::{driver_script, DriverEvent, CODEC};
pub use executor::{ExecRequest, Executor, ProcessExecutor};
pub use result::{ExecStatus, ExecutionResult, Phase, RaiseSite, INTERNAL_FAULT, OUTPUT_LIMIT_EXCEEDED};
