//! Fallback ladder for parameters without type information.
//!
//! Untyped parameters are tried with `None`, `""`, `0`, `[]` and a sentinel
//! object, in that order. The harness probes the reference and records the
//! first rung that does not raise; when every rung raises, rung 0 is kept
//! and the error becomes part of the pinned reference behavior.

use super::value::Value;
use std::collections::BTreeMap;

/// Number of rungs on the ladder.
pub const LADDER_LEN: usize = 5;

/// Value at a ladder rung; rungs past the end clamp to the sentinel.
pub fn ladder_value(rung: usize) -> Value {
    match rung {
        0 => Value::None,
        1 => Value::str(""),
        2 => Value::int(0),
        3 => Value::list(Vec::new()),
        _ => Value::Sentinel,
    }
}

/// Location of an untyped parameter.
///
/// Positions count positional parameters first, then required keyword-only
/// ones in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParamSlot {
    /// Constructor parameter by position.
    Constructor(usize),
    /// Method parameter by method name and position.
    Method {
        /// Method name.
        method: String,
        /// Parameter position (excluding `self`).
        index: usize,
    },
}

/// Chosen ladder rung per untyped parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FallbackChoices {
    rungs: BTreeMap<ParamSlot, usize>,
}

impl FallbackChoices {
    /// No probing results: every slot uses rung 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rung for a slot.
    pub fn rung(&self, slot: &ParamSlot) -> usize {
        self.rungs.get(slot).copied().unwrap_or(0)
    }

    /// Value for a slot.
    pub fn value(&self, slot: &ParamSlot) -> Value {
        ladder_value(self.rung(slot))
    }

    /// Record the chosen rung for a slot.
    pub fn choose(&mut self, slot: ParamSlot, rung: usize) {
        self.rungs.insert(slot, rung.min(LADDER_LEN - 1));
    }

    /// Copy with one slot overridden, used while probing.
    pub fn with(&self, slot: ParamSlot, rung: usize) -> Self {
        let mut next = self.clone();
        next.choose(slot, rung);
        next
    }

    /// Number of recorded choices.
    pub fn len(&self) -> usize {
        self.rungs.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.rungs.is_empty()
    }
}
