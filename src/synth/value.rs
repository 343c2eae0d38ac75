//! Tagged value model shared by synthesized inputs and observed outputs.
//!
//! Values cross the process boundary as JSON. Integers and floats travel as
//! text so that arbitrary-size integers and non-finite floats survive the
//! trip unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A value passed to, or returned from, a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum Value {
    /// `None`.
    None,
    /// `True` / `False`.
    Bool {
        /// The boolean.
        v: bool,
    },
    /// Integer in decimal text.
    Int {
        /// Decimal digits with optional sign.
        v: String,
    },
    /// Float in Python `repr` form (`nan`, `inf`, `-inf` included).
    Float {
        /// Float text.
        v: String,
    },
    /// Text string.
    Str {
        /// The string.
        v: String,
    },
    /// Byte string, hex encoded.
    Bytes {
        /// Lowercase hex.
        v: String,
    },
    /// `list`.
    List {
        /// Elements.
        items: Vec<Value>,
    },
    /// `tuple`.
    Tuple {
        /// Elements.
        items: Vec<Value>,
    },
    /// `set` / `frozenset`, canonically ordered by the driver.
    Set {
        /// Members.
        items: Vec<Value>,
    },
    /// `dict`, canonically ordered by key.
    Dict {
        /// Key/value pairs.
        items: Vec<(Value, Value)>,
    },
    /// Opaque placeholder object (input only).
    Sentinel,
    /// Instance of a class defined in the unit's source (input only).
    Instance {
        /// Class name.
        class: String,
        /// Constructor arguments.
        args: Vec<Value>,
    },
    /// Value without a structural encoding; compared by type name.
    Object {
        /// Python type name.
        #[serde(rename = "type")]
        type_name: String,
    },
}

impl Value {
    /// Integer value.
    pub fn int(v: i64) -> Self {
        Self::Int { v: v.to_string() }
    }

    /// Float value in Python `repr` form.
    pub fn float(v: f64) -> Self {
        Self::Float {
            v: float_repr(v),
        }
    }

    /// String value.
    pub fn str(v: impl Into<String>) -> Self {
        Self::Str { v: v.into() }
    }

    /// Boolean value.
    pub fn bool(v: bool) -> Self {
        Self::Bool { v }
    }

    /// List value.
    pub fn list(items: Vec<Value>) -> Self {
        Self::List { items }
    }

    /// Parse a float payload, accepting Python's non-finite spellings.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float { v } => parse_float(v),
            Self::Int { v } => v.parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Python type name of the value.
    pub fn type_name(&self) -> &str {
        match self {
            Self::None => "NoneType",
            Self::Bool { .. } => "bool",
            Self::Int { .. } => "int",
            Self::Float { .. } => "float",
            Self::Str { .. } => "str",
            Self::Bytes { .. } => "bytes",
            Self::List { .. } => "list",
            Self::Tuple { .. } => "tuple",
            Self::Set { .. } => "set",
            Self::Dict { .. } => "dict",
            Self::Sentinel => "sentinel",
            Self::Instance { class, .. } => class,
            Self::Object { type_name } => type_name,
        }
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool { v: true } => f.write_str("True"),
            Self::Bool { v: false } => f.write_str("False"),
            Self::Int { v } | Self::Float { v } => f.write_str(v),
            Self::Str { v } => write!(f, "{v:?}"),
            Self::Bytes { v } => write!(f, "bytes.fromhex({v:?})"),
            Self::List { items } => {
                f.write_str("[")?;
                write_seq(f, items)?;
                f.write_str("]")
            }
            Self::Tuple { items } => {
                f.write_str("(")?;
                write_seq(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Self::Set { items } if items.is_empty() => f.write_str("set()"),
            Self::Set { items } => {
                f.write_str("{")?;
                write_seq(f, items)?;
                f.write_str("}")
            }
            Self::Dict { items } => {
                f.write_str("{")?;
                for (i, (k, v)) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Self::Sentinel => f.write_str("<sentinel>"),
            Self::Instance { class, args } => {
                write!(f, "{class}(")?;
                write_seq(f, args)?;
                f.write_str(")")
            }
            Self::Object { type_name } => write!(f, "<{type_name} object>"),
        }
    }
}

/// Python `repr` of a float.
pub fn float_repr(v: f64) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else if v.is_infinite() && v > 0.0 {
        "inf".to_string()
    } else if v.is_infinite() {
        "-inf".to_string()
    } else {
        format!("{v:?}")
    }
}

/// Parse a float written by Python or by [`float_repr`].
pub fn parse_float(text: &str) -> Option<f64> {
    match text.trim().to_ascii_lowercase().as_str() {
        "nan" | "-nan" => Some(f64::NAN),
        "inf" | "infinity" => Some(f64::INFINITY),
        "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
        other => other.parse::<f64>().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let value = Value::Dict {
            items: vec![(Value::str("a"), Value::list(vec![Value::int(1), Value::None]))],
        };
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(
            json,
            r#"{"t":"dict","items":[[{"t":"str","v":"a"},{"t":"list","items":[{"t":"int","v":"1"},{"t":"none"}]}]]}"#
        );
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_object_type_field() {
        let value: Value = serde_json::from_str(r#"{"t":"object","type":"Widget"}"#).unwrap();
        assert_eq!(value.type_name(), "Widget");
        assert_eq!(value.to_string(), "<Widget object>");
    }

    #[test]
    fn test_float_repr_non_finite() {
        assert_eq!(float_repr(f64::NAN), "nan");
        assert_eq!(float_repr(f64::NEG_INFINITY), "-inf");
        assert_eq!(float_repr(1.0), "1.0");
        assert!(parse_float("nan").unwrap().is_nan());
        assert_eq!(parse_float("inf"), Some(f64::INFINITY));
        assert_eq!(parse_float("2.5"), Some(2.5));
    }

    #[test]
    fn test_display_python_like() {
        let value = Value::Tuple {
            items: vec![Value::bool(true)],
        };
        assert_eq!(value.to_string(), "(True,)");
        assert_eq!(Value::Set { items: vec![] }.to_string(), "set()");
        assert_eq!(Value::str("hi").to_string(), "\"hi\"");
    }
}
