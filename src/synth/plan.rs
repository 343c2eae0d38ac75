//! Call plans: construction plus an ordered sequence of method invocations.

use super::fallback::{FallbackChoices, ParamSlot};
use super::generator::Synthesizer;
use super::value::Value;
use crate::error::{HarnessError, HarnessResult};
use crate::signature::{MethodDescriptor, MethodKind, ParamDescriptor, Signature};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Keyword arguments as `(name, value)` pairs in declaration order.
pub type Keywords = Vec<(String, Value)>;

/// One method invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    /// Method name.
    pub method: String,
    /// Positional arguments.
    pub args: Vec<Value>,
    /// Required keyword-only arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kwargs: Keywords,
    /// Read as an attribute instead of calling (properties).
    #[serde(default)]
    pub access: bool,
}

impl Invocation {
    /// Call `method` with positional arguments only.
    pub fn call(method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            args,
            kwargs: Vec::new(),
            access: false,
        }
    }

    /// Read property `method`.
    pub fn read(method: impl Into<String>) -> Self {
        Self {
            access: true,
            ..Self::call(method, Vec::new())
        }
    }
}

/// A reproducible sequence of construction and method calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallPlan {
    /// Unit the plan was synthesized for.
    pub unit_id: String,
    /// Seed that produced the plan.
    pub seed: u64,
    /// Constructor arguments.
    pub constructor_args: Vec<Value>,
    /// Required keyword-only constructor arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constructor_kwargs: Keywords,
    /// Method calls in order.
    pub calls: Vec<Invocation>,
}

impl CallPlan {
    /// Plan without keyword arguments.
    pub fn new(unit_id: impl Into<String>, seed: u64, constructor_args: Vec<Value>, calls: Vec<Invocation>) -> Self {
        Self {
            unit_id: unit_id.into(),
            seed,
            constructor_args,
            constructor_kwargs: Vec::new(),
            calls,
        }
    }

    /// Check every argument count and keyword name against the signature.
    pub fn check_arity(&self, signature: &Signature) -> HarnessResult<()> {
        if self.constructor_args.len() != signature.constructor_arity() {
            return Err(HarnessError::InvalidConfig(format!(
                "plan for {} passes {} constructor args, expected {}",
                self.unit_id,
                self.constructor_args.len(),
                signature.constructor_arity()
            )));
        }
        if !keywords_match(&self.constructor_kwargs, &signature.constructor_keywords) {
            return Err(HarnessError::InvalidConfig(format!(
                "plan for {} passes constructor keywords [{}], expected [{}]",
                self.unit_id,
                keyword_names(&self.constructor_kwargs),
                param_names(&signature.constructor_keywords)
            )));
        }
        for (index, call) in self.calls.iter().enumerate() {
            let method = signature.method(&call.method).ok_or_else(|| {
                HarnessError::InvalidConfig(format!(
                    "call {index} names unknown method {}",
                    call.method
                ))
            })?;
            if call.args.len() != method.arity {
                return Err(HarnessError::InvalidConfig(format!(
                    "call {index} to {} passes {} args, expected {}",
                    call.method,
                    call.args.len(),
                    method.arity
                )));
            }
            if !keywords_match(&call.kwargs, &method.keywords) {
                return Err(HarnessError::InvalidConfig(format!(
                    "call {index} to {} passes keywords [{}], expected [{}]",
                    call.method,
                    keyword_names(&call.kwargs),
                    param_names(&method.keywords)
                )));
            }
        }
        Ok(())
    }

    /// Short human-readable rendering used in logs and reports.
    pub fn describe(&self) -> String {
        let args = |values: &[Value], kwargs: &Keywords| {
            values
                .iter()
                .map(ToString::to_string)
                .chain(kwargs.iter().map(|(name, v)| format!("{name}={v}")))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut out = format!(
            "seed {}: ({})",
            self.seed,
            args(&self.constructor_args, &self.constructor_kwargs)
        );
        for call in &self.calls {
            if call.access {
                out.push_str(&format!(" .{}", call.method));
            } else {
                out.push_str(&format!(" .{}({})", call.method, args(&call.args, &call.kwargs)));
            }
        }
        out
    }
}

fn keywords_match(kwargs: &[(String, Value)], params: &[ParamDescriptor]) -> bool {
    kwargs.len() == params.len() && kwargs.iter().zip(params).all(|((name, _), p)| *name == p.name)
}

fn keyword_names(kwargs: &[(String, Value)]) -> String {
    kwargs.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>().join(", ")
}

fn param_names(params: &[ParamDescriptor]) -> String {
    params.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(", ")
}

/// Builds call plans for one signature.
pub struct PlanBuilder<'s> {
    signature: &'s Signature,
    fallback: FallbackChoices,
    extra_calls: usize,
}

impl<'s> PlanBuilder<'s> {
    /// Builder with no probing results and no extra calls.
    pub fn new(signature: &'s Signature) -> Self {
        Self {
            signature,
            fallback: FallbackChoices::new(),
            extra_calls: 0,
        }
    }

    /// Use probed ladder rungs for untyped parameters.
    pub fn with_fallback(mut self, fallback: FallbackChoices) -> Self {
        self.fallback = fallback;
        self
    }

    /// Add random calls after every method has been called once.
    pub fn with_extra_calls(mut self, extra_calls: usize) -> Self {
        self.extra_calls = extra_calls;
        self
    }

    /// Synthesize the plan for `seed`.
    ///
    /// Every public method is called once in shuffled order, followed by
    /// `extra_calls` randomly chosen calls.
    pub fn build(&self, unit_id: &str, seed: u64) -> CallPlan {
        let mut synth = Synthesizer::new(self.signature, seed);
        let (constructor_args, constructor_kwargs) = self.constructor_args(&mut synth, &self.fallback);

        let methods = &self.signature.methods;
        let mut order: Vec<usize> = (0..methods.len()).collect();
        synth.shuffle(&mut order);
        if !methods.is_empty() {
            for _ in 0..self.extra_calls {
                order.push(synth.pick(methods.len()));
            }
        }

        let calls = order
            .into_iter()
            .map(|i| self.invocation(&mut synth, &methods[i], &self.fallback))
            .collect();

        CallPlan {
            unit_id: unit_id.to_string(),
            seed,
            constructor_args,
            constructor_kwargs,
            calls,
        }
    }

    /// Plan that exercises a single untyped slot at a given ladder rung.
    ///
    /// Constructor slots produce a construction-only plan; method slots add
    /// one call to that method.
    pub fn probe(&self, unit_id: &str, seed: u64, slot: &ParamSlot, rung: usize) -> CallPlan {
        let choices = self.fallback.with(slot.clone(), rung);
        let mut synth = Synthesizer::new(self.signature, seed);
        let (constructor_args, constructor_kwargs) = self.constructor_args(&mut synth, &choices);
        let calls = match slot {
            ParamSlot::Constructor(_) => Vec::new(),
            ParamSlot::Method { method, .. } => self
                .signature
                .method(method)
                .map(|m| vec![self.invocation(&mut synth, m, &choices)])
                .unwrap_or_default(),
        };
        CallPlan {
            unit_id: unit_id.to_string(),
            seed,
            constructor_args,
            constructor_kwargs,
            calls,
        }
    }

    /// Every untyped parameter slot, constructor first.
    ///
    /// Keyword-only parameters take the positions after the positional ones.
    pub fn untyped_slots(&self) -> Vec<ParamSlot> {
        let sig = self.signature;
        let ctor = sig
            .constructor
            .iter()
            .chain(&sig.constructor_keywords)
            .enumerate()
            .filter(|(_, p)| p.is_untyped())
            .map(|(i, _)| ParamSlot::Constructor(i));
        let methods = sig.methods.iter().flat_map(|m| {
            m.params
                .iter()
                .chain(&m.keywords)
                .enumerate()
                .filter(|(_, p)| p.is_untyped())
                .map(|(index, _)| ParamSlot::Method {
                    method: m.name.clone(),
                    index,
                })
        });
        ctor.chain(methods).collect()
    }

    fn constructor_args(&self, synth: &mut Synthesizer<'_>, choices: &FallbackChoices) -> (Vec<Value>, Keywords) {
        let sig = self.signature;
        let positional = sig.constructor.len();
        let args = sig
            .constructor
            .iter()
            .enumerate()
            .map(|(i, p)| arg(synth, p, &ParamSlot::Constructor(i), choices))
            .collect();
        let kwargs = sig
            .constructor_keywords
            .iter()
            .enumerate()
            .map(|(k, p)| {
                let value = arg(synth, p, &ParamSlot::Constructor(positional + k), choices);
                (p.name.clone(), value)
            })
            .collect();
        (args, kwargs)
    }

    fn invocation(
        &self,
        synth: &mut Synthesizer<'_>,
        method: &MethodDescriptor,
        choices: &FallbackChoices,
    ) -> Invocation {
        let slot = |index: usize| ParamSlot::Method {
            method: method.name.clone(),
            index,
        };
        let args = method
            .params
            .iter()
            .enumerate()
            .map(|(index, p)| arg(synth, p, &slot(index), choices))
            .collect();
        let positional = method.params.len();
        let kwargs = method
            .keywords
            .iter()
            .enumerate()
            .map(|(k, p)| (p.name.clone(), arg(synth, p, &slot(positional + k), choices)))
            .collect();
        Invocation {
            method: method.name.clone(),
            args,
            kwargs,
            access: method.kind == MethodKind::Property,
        }
    }
}

fn arg(
    synth: &mut Synthesizer<'_>,
    param: &ParamDescriptor,
    slot: &ParamSlot,
    choices: &FallbackChoices,
) -> Value {
    if param.is_untyped() {
        choices.value(slot)
    } else {
        synth.generate(&param.family)
    }
}

/// Derive `count` distinct plan seeds for a unit from the run's base seed.
pub fn derive_seeds(base: u64, unit_id: &str, count: usize) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(base ^ fnv1a(unit_id.as_bytes()));
    let mut seeds = Vec::with_capacity(count);
    while seeds.len() < count {
        let next = rng.random::<u64>();
        if !seeds.contains(&next) {
            seeds.push(next);
        }
    }
    seeds
}

/// Stable string hash; `std` hashers may change between releases.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}
