//! Type-directed random value generation.

use super::value::Value;
use crate::signature::{Signature, TypeFamily};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Nesting depth at which custom types become sentinels.
pub const MAX_CUSTOM_DEPTH: usize = 2;

/// Longest synthesized string.
const MAX_STR_LEN: usize = 8;

/// Largest synthesized collection.
const MAX_COLLECTION_LEN: usize = 3;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789 _-";

const INT_BOUNDARIES: [i64; 3] = [0, 1, -1];

const FLOAT_BOUNDARIES: [f64; 4] = [0.0, 1.0, -1.0, 0.5];

const FLOAT_NON_FINITE: [f64; 3] = [f64::NAN, f64::INFINITY, f64::NEG_INFINITY];

/// Seeded generator over the type families of one signature.
pub struct Synthesizer<'s> {
    rng: StdRng,
    signature: &'s Signature,
    next_bool: bool,
}

impl<'s> Synthesizer<'s> {
    /// Create a generator; the same seed yields the same value stream.
    pub fn new(signature: &'s Signature, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let next_bool = rng.random::<bool>();
        Self {
            rng,
            signature,
            next_bool,
        }
    }

    /// Uniform index below `len` (which must be non-zero).
    pub fn pick(&mut self, len: usize) -> usize {
        self.rng.random_range(0..len)
    }

    /// Shuffle a slice in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        use rand::seq::SliceRandom;
        items.shuffle(&mut self.rng);
    }

    /// Generate a top-level value for a family.
    pub fn generate(&mut self, family: &TypeFamily) -> Value {
        self.generate_at(family, 0)
    }

    fn generate_at(&mut self, family: &TypeFamily, depth: usize) -> Value {
        match family {
            TypeFamily::Unknown => self.small_int(),
            TypeFamily::NoneType => Value::None,
            TypeFamily::Bool => {
                let v = self.next_bool;
                self.next_bool = !v;
                Value::bool(v)
            }
            TypeFamily::Int => self.small_int(),
            TypeFamily::Float => self.float(),
            TypeFamily::Str => self.string(),
            TypeFamily::Bytes => {
                let len = self.rng.random_range(0..=6);
                let bytes: Vec<u8> = (0..len).map(|_| self.rng.random::<u8>()).collect();
                Value::Bytes {
                    v: hex::encode(bytes),
                }
            }
            TypeFamily::Sequence { item } => Value::List {
                items: self.collection(item, depth),
            },
            TypeFamily::VarTuple { item } => Value::Tuple {
                items: self.collection(item, depth),
            },
            TypeFamily::Tuple { items } => Value::Tuple {
                items: items
                    .iter()
                    .map(|f| self.generate_at(f, depth + 1))
                    .collect(),
            },
            TypeFamily::Set { item } => {
                let item = hashable(item);
                let mut members = self.collection(&item, depth);
                dedup(&mut members);
                Value::Set { items: members }
            }
            TypeFamily::Mapping { key, value } => {
                let key = hashable(key);
                let len = self.rng.random_range(0..=MAX_COLLECTION_LEN);
                let mut items: Vec<(Value, Value)> = Vec::with_capacity(len);
                for _ in 0..len {
                    let k = self.generate_at(&key, depth + 1);
                    let v = self.generate_at(value, depth + 1);
                    if !items.iter().any(|(existing, _)| *existing == k) {
                        items.push((k, v));
                    }
                }
                Value::Dict { items }
            }
            TypeFamily::Optional { inner } => {
                if self.rng.random_bool(0.2) {
                    Value::None
                } else {
                    self.generate_at(inner, depth)
                }
            }
            TypeFamily::Union { members } if members.is_empty() => Value::None,
            TypeFamily::Union { members } => {
                let idx = self.pick(members.len());
                self.generate_at(&members[idx], depth)
            }
            TypeFamily::Custom { name } => self.instance(name, depth),
        }
    }

    fn instance(&mut self, name: &str, depth: usize) -> Value {
        if depth >= MAX_CUSTOM_DEPTH {
            return Value::Sentinel;
        }
        let signature = self.signature;
        let Some(params) = signature.local_classes.get(name) else {
            return Value::Sentinel;
        };
        let args = params
            .iter()
            .map(|p| {
                if p.is_untyped() {
                    Value::None
                } else {
                    self.generate_at(&p.family, depth + 1)
                }
            })
            .collect();
        Value::Instance {
            class: name.to_string(),
            args,
        }
    }

    fn collection(&mut self, item: &TypeFamily, depth: usize) -> Vec<Value> {
        let len = self.rng.random_range(0..=MAX_COLLECTION_LEN);
        (0..len).map(|_| self.generate_at(item, depth + 1)).collect()
    }

    fn small_int(&mut self) -> Value {
        if self.rng.random_bool(0.3) {
            let idx = self.pick(INT_BOUNDARIES.len());
            Value::int(INT_BOUNDARIES[idx])
        } else {
            Value::int(self.rng.random_range(-100..=100))
        }
    }

    fn float(&mut self) -> Value {
        match self.rng.random_range(0..10) {
            0 => {
                let idx = self.pick(FLOAT_NON_FINITE.len());
                Value::float(FLOAT_NON_FINITE[idx])
            }
            1 | 2 => {
                let idx = self.pick(FLOAT_BOUNDARIES.len());
                Value::float(FLOAT_BOUNDARIES[idx])
            }
            _ => {
                let raw: f64 = self.rng.random_range(-100.0..100.0);
                Value::float((raw * 100.0).round() / 100.0)
            }
        }
    }

    fn string(&mut self) -> Value {
        let len = self.rng.random_range(0..=MAX_STR_LEN);
        let text: String = (0..len)
            .map(|_| ALPHABET[self.pick(ALPHABET.len())] as char)
            .collect();
        Value::str(text)
    }
}

/// Dict keys and set members must be hashable; anything else becomes `str`.
fn hashable(family: &TypeFamily) -> TypeFamily {
    if family.is_hashable_primitive() {
        family.clone()
    } else if matches!(family, TypeFamily::Unknown) {
        TypeFamily::Int
    } else {
        TypeFamily::Str
    }
}

fn dedup(values: &mut Vec<Value>) {
    let mut unique: Vec<Value> = Vec::with_capacity(values.len());
    for v in values.drain(..) {
        if !unique.contains(&v) {
            unique.push(v);
        }
    }
    *values = unique;
}
