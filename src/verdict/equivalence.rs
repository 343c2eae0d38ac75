//! Value equivalence.
//!
//! Primitives compare exactly, floats within a relative/absolute tolerance
//! (NaN equals NaN, infinities by sign), integers and floats compare
//! numerically across the two tags, and opaque objects compare by type name.
//! Containers compare element by element; sets and dicts arrive in a
//! canonical order from the driver.

use crate::config::Tolerance;
use crate::synth::Value;
use std::fmt;

/// First point where two values differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence {
    /// Location inside the value, e.g. `[2][0]`; empty at the root.
    pub path: String,
    /// Reference side.
    pub expected: String,
    /// Candidate side.
    pub actual: String,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "expected {}, got {}", self.expected, self.actual)
        } else {
            write!(
                f,
                "at {}: expected {}, got {}",
                self.path, self.expected, self.actual
            )
        }
    }
}

/// Whether two values are equivalent.
pub fn equivalent(expected: &Value, actual: &Value, tolerance: &Tolerance) -> bool {
    first_divergence(expected, actual, tolerance).is_none()
}

/// Locate the first difference between two values.
pub fn first_divergence(expected: &Value, actual: &Value, tolerance: &Tolerance) -> Option<Divergence> {
    let mut path = String::new();
    diverge(expected, actual, tolerance, &mut path)
}

fn mismatch(expected: &Value, actual: &Value, path: &str) -> Option<Divergence> {
    Some(Divergence {
        path: path.to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    })
}

fn diverge(expected: &Value, actual: &Value, tolerance: &Tolerance, path: &mut String) -> Option<Divergence> {
    use Value as V;
    match (expected, actual) {
        (V::Int { v: a }, V::Int { v: b }) => (a != b).then(|| Divergence {
            path: path.clone(),
            expected: a.clone(),
            actual: b.clone(),
        }),
        (V::Float { .. } | V::Int { .. }, V::Float { .. } | V::Int { .. }) => {
            match (expected.as_f64(), actual.as_f64()) {
                (Some(a), Some(b)) if floats_close(a, b, tolerance) => None,
                _ => mismatch(expected, actual, path),
            }
        }
        (V::Object { type_name: a }, V::Object { type_name: b }) => {
            (a != b).then(|| Divergence {
                path: path.clone(),
                expected: format!("<{a} object>"),
                actual: format!("<{b} object>"),
            })
        }
        (V::List { items: a }, V::List { items: b })
        | (V::Tuple { items: a }, V::Tuple { items: b })
        | (V::Set { items: a }, V::Set { items: b }) => {
            if a.len() != b.len() {
                return Some(Divergence {
                    path: path.clone(),
                    expected: format!("{} of length {}", expected.type_name(), a.len()),
                    actual: format!("{} of length {}", actual.type_name(), b.len()),
                });
            }
            for (i, (x, y)) in a.iter().zip(b).enumerate() {
                let mark = path.len();
                path.push_str(&format!("[{i}]"));
                let found = diverge(x, y, tolerance, path);
                path.truncate(mark);
                if found.is_some() {
                    return found;
                }
            }
            None
        }
        (V::Dict { items: a }, V::Dict { items: b }) => {
            if a.len() != b.len() {
                return Some(Divergence {
                    path: path.clone(),
                    expected: format!("dict of length {}", a.len()),
                    actual: format!("dict of length {}", b.len()),
                });
            }
            for ((ka, va), (kb, vb)) in a.iter().zip(b) {
                let mark = path.len();
                path.push_str(&format!("{{key {ka}}}"));
                let found = diverge(ka, kb, tolerance, path)
                    .or_else(|| {
                        path.truncate(mark);
                        path.push_str(&format!("[{ka}]"));
                        diverge(va, vb, tolerance, path)
                    });
                path.truncate(mark);
                if found.is_some() {
                    return found;
                }
            }
            None
        }
        _ if expected == actual => None,
        _ => mismatch(expected, actual, path),
    }
}

/// `math.isclose` with NaN equal to itself.
pub fn floats_close(a: f64, b: f64, tolerance: &Tolerance) -> bool {
    if a.is_nan() || b.is_nan() {
        return a.is_nan() && b.is_nan();
    }
    if a.is_infinite() || b.is_infinite() {
        return a == b;
    }
    let diff = (a - b).abs();
    diff <= (tolerance.rel * a.abs().max(b.abs())).max(tolerance.abs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tol() -> Tolerance {
        Tolerance::default()
    }

    #[test]
    fn test_primitives_exact() {
        assert!(equivalent(&Value::int(3), &Value::int(3), &tol()));
        assert!(!equivalent(&Value::int(3), &Value::int(4), &tol()));
        assert!(!equivalent(&Value::str("a"), &Value::str("b"), &tol()));
        assert!(!equivalent(&Value::bool(true), &Value::int(1), &tol()));
        assert!(equivalent(&Value::None, &Value::None, &tol()));
    }

    #[test]
    fn test_float_tolerance() {
        assert!(equivalent(&Value::float(0.1 + 0.2), &Value::float(0.3), &tol()));
        assert!(!equivalent(&Value::float(0.3), &Value::float(0.31), &tol()));
        assert!(equivalent(&Value::float(f64::NAN), &Value::float(f64::NAN), &tol()));
        assert!(!equivalent(&Value::float(f64::INFINITY), &Value::float(f64::NEG_INFINITY), &tol()));
        assert!(equivalent(&Value::int(2), &Value::float(2.0), &tol()));
    }

    #[test]
    fn test_objects_by_type_name() {
        let a = Value::Object {
            type_name: "Widget".to_string(),
        };
        let b = Value::Object {
            type_name: "Gadget".to_string(),
        };
        assert!(equivalent(&a, &a.clone(), &tol()));
        assert!(!equivalent(&a, &b, &tol()));
    }

    #[test]
    fn test_nested_path() {
        let expected = Value::list(vec![Value::int(1), Value::list(vec![Value::int(2), Value::int(3)])]);
        let actual = Value::list(vec![Value::int(1), Value::list(vec![Value::int(2), Value::int(4)])]);
        let d = first_divergence(&expected, &actual, &tol()).unwrap();
        assert_eq!(d.path, "[1][1]");
        assert_eq!(d.to_string(), "at [1][1]: expected 3, got 4");
    }

    #[test]
    fn test_dict_value_path() {
        let expected = Value::Dict {
            items: vec![(Value::str("k"), Value::int(1))],
        };
        let actual = Value::Dict {
            items: vec![(Value::str("k"), Value::int(2))],
        };
        let d = first_divergence(&expected, &actual, &tol()).unwrap();
        assert_eq!(d.path, "[\"k\"]");
    }

    #[test]
    fn test_list_vs_tuple_differs() {
        let list = Value::list(vec![]);
        let tuple = Value::Tuple { items: vec![] };
        assert!(!equivalent(&list, &tuple, &tol()));
    }
}
