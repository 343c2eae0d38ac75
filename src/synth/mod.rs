//! Input synthesis.
//!
//! Turns a [`Signature`](crate::signature::Signature) into seeded
//! [`CallPlan`]s. Typed parameters are generated by family in
//! [`generator`]; untyped parameters take a rung of the [`fallback`] ladder
//! chosen by probing the reference.
//!
//! # Requirements
//!
//! - The same signature, seed and fallback choices give an identical plan.
//! - Every call's argument count equals the method's arity, and its
//!   keyword arguments name exactly the method's required keyword-only
//!   parameters.

pub mod fallback;
pub mod generator;
pub mod plan;
pub mod value;

pub use fallback::{ladder_value, FallbackChoices, ParamSlot, LADDER_LEN};
pub use generator::Synthesizer;
pub use plan::{derive_seeds, CallPlan, Invocation, Keywords, PlanBuilder};
pub use value::Value;
