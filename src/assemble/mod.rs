//! Test case assembly.
//!
//! The [`Assembler`] runs the reference twice on a plan to pin its
//! behavior; [`artifact::render`] turns the pinned case into a standalone
//! `unittest` module.
//!
//! # Requirements
//!
//! - A completed reference pins every return value.
//! - A raising reference pins the error kind and the site; the message is
//!   never asserted. A reference that raises during construction still
//!   yields a case asserting that kind.

pub mod artifact;
pub mod case;

pub use artifact::{render, write_all, Artifact};
pub use case::{Assembler, TestCase};
