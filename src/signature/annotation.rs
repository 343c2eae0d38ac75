//! Type families derived from annotations and literal defaults.

use super::lexer::split_top_level;
use serde::{Deserialize, Serialize};

/// Coarse type family that drives input synthesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum TypeFamily {
    /// No usable type information.
    Unknown,
    /// `None`.
    NoneType,
    /// `bool`.
    Bool,
    /// `int`.
    Int,
    /// `float`.
    Float,
    /// `str`.
    Str,
    /// `bytes` / `bytearray`.
    Bytes,
    /// Homogeneous list-like collection.
    Sequence {
        /// Element family.
        item: Box<TypeFamily>,
    },
    /// Fixed-shape tuple.
    Tuple {
        /// Element families in order.
        items: Vec<TypeFamily>,
    },
    /// Variable-length tuple (`tuple[int, ...]` or bare `tuple`).
    VarTuple {
        /// Element family.
        item: Box<TypeFamily>,
    },
    /// Dict-like mapping.
    Mapping {
        /// Key family.
        key: Box<TypeFamily>,
        /// Value family.
        value: Box<TypeFamily>,
    },
    /// Set-like collection.
    Set {
        /// Element family.
        item: Box<TypeFamily>,
    },
    /// `Optional[T]` or `T | None`.
    Optional {
        /// Wrapped family.
        inner: Box<TypeFamily>,
    },
    /// `Union[...]` without `None`.
    Union {
        /// Member families.
        members: Vec<TypeFamily>,
    },
    /// A class name that is not a builtin.
    Custom {
        /// Class name as written.
        name: String,
    },
}

impl TypeFamily {
    /// Whether values of this family can be dict keys or set members.
    pub fn is_hashable_primitive(&self) -> bool {
        matches!(
            self,
            Self::NoneType | Self::Bool | Self::Int | Self::Float | Self::Str | Self::Bytes
        )
    }

    /// Whether this family carries any information.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    fn boxed(self) -> Box<Self> {
        Box::new(self)
    }
}

/// Parse an annotation expression into a type family.
pub fn parse_annotation(text: &str) -> TypeFamily {
    let text = text.trim();
    if text.is_empty() {
        return TypeFamily::Unknown;
    }
    if let Some(inner) = strip_quotes(text) {
        return parse_annotation(inner);
    }

    let pipe_members = split_top_level(text, '|');
    if pipe_members.len() > 1 {
        let members = pipe_members.into_iter().map(parse_annotation).collect();
        return normalize_union(members);
    }

    let (head, args) = match text.find('[') {
        Some(open) if text.ends_with(']') => (&text[..open], Some(&text[open + 1..text.len() - 1])),
        _ => (text, None),
    };
    let head = head.rsplit('.').next().unwrap_or(head).trim();
    let args: Vec<&str> = args
        .map(|a| {
            split_top_level(a, ',')
                .into_iter()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    let arg = |i: usize| args.get(i).map_or(TypeFamily::Unknown, |a| parse_annotation(a));

    match head {
        "int" => TypeFamily::Int,
        "float" | "complex" => TypeFamily::Float,
        "str" => TypeFamily::Str,
        "bool" => TypeFamily::Bool,
        "bytes" | "bytearray" => TypeFamily::Bytes,
        "None" | "NoneType" => TypeFamily::NoneType,
        "list" | "List" | "Sequence" | "MutableSequence" | "Iterable" | "Iterator"
        | "Collection" | "deque" | "Deque" => TypeFamily::Sequence { item: arg(0).boxed() },
        "tuple" | "Tuple" => {
            if args.is_empty() {
                TypeFamily::VarTuple {
                    item: TypeFamily::Unknown.boxed(),
                }
            } else if args.len() == 2 && args[1] == "..." {
                TypeFamily::VarTuple { item: arg(0).boxed() }
            } else {
                TypeFamily::Tuple {
                    items: args.iter().map(|a| parse_annotation(a)).collect(),
                }
            }
        }
        "dict" | "Dict" | "Mapping" | "MutableMapping" | "defaultdict" | "DefaultDict"
        | "OrderedDict" => TypeFamily::Mapping {
            key: arg(0).boxed(),
            value: arg(1).boxed(),
        },
        "Counter" => TypeFamily::Mapping {
            key: arg(0).boxed(),
            value: TypeFamily::Int.boxed(),
        },
        "set" | "Set" | "frozenset" | "FrozenSet" | "AbstractSet" | "MutableSet" => {
            TypeFamily::Set { item: arg(0).boxed() }
        }
        "Optional" => TypeFamily::Optional { inner: arg(0).boxed() },
        "Union" => normalize_union(args.iter().map(|a| parse_annotation(a)).collect()),
        _ if is_class_name(head) => TypeFamily::Custom {
            name: head.to_string(),
        },
        _ => TypeFamily::Unknown,
    }
}

/// Infer a family from a literal default such as `0`, `""` or `[]`.
pub fn infer_from_default(text: &str) -> TypeFamily {
    let text = text.trim();
    match text {
        "True" | "False" => return TypeFamily::Bool,
        "None" => return TypeFamily::Unknown,
        "[]" | "list()" => {
            return TypeFamily::Sequence {
                item: TypeFamily::Unknown.boxed(),
            }
        }
        "{}" | "dict()" => {
            return TypeFamily::Mapping {
                key: TypeFamily::Unknown.boxed(),
                value: TypeFamily::Unknown.boxed(),
            }
        }
        "set()" => {
            return TypeFamily::Set {
                item: TypeFamily::Unknown.boxed(),
            }
        }
        "()" | "tuple()" => {
            return TypeFamily::VarTuple {
                item: TypeFamily::Unknown.boxed(),
            }
        }
        _ => {}
    }

    let digits = text.strip_prefix('-').unwrap_or(text).replace('_', "");
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        return TypeFamily::Int;
    }
    if digits.parse::<f64>().is_ok() && digits.chars().any(|c| matches!(c, '.' | 'e' | 'E')) {
        return TypeFamily::Float;
    }
    if text.starts_with("float(") {
        return TypeFamily::Float;
    }

    let lowered = text.to_ascii_lowercase();
    let unprefixed = lowered.trim_start_matches(|c| matches!(c, 'r' | 'f' | 'u'));
    if unprefixed.starts_with('b') && unprefixed[1..].starts_with(['\'', '"']) {
        return TypeFamily::Bytes;
    }
    if unprefixed.starts_with(['\'', '"']) {
        return TypeFamily::Str;
    }
    if text.starts_with('[') {
        return TypeFamily::Sequence {
            item: TypeFamily::Unknown.boxed(),
        };
    }
    if text.starts_with('{') {
        return TypeFamily::Mapping {
            key: TypeFamily::Unknown.boxed(),
            value: TypeFamily::Unknown.boxed(),
        };
    }
    TypeFamily::Unknown
}

fn normalize_union(members: Vec<TypeFamily>) -> TypeFamily {
    let has_none = members.iter().any(|m| *m == TypeFamily::NoneType);
    let mut rest: Vec<TypeFamily> = members
        .into_iter()
        .filter(|m| *m != TypeFamily::NoneType)
        .collect();
    let core = match rest.len() {
        0 => TypeFamily::NoneType,
        1 => rest.remove(0),
        _ => TypeFamily::Union { members: rest },
    };
    if has_none && core != TypeFamily::NoneType {
        TypeFamily::Optional { inner: core.boxed() }
    } else {
        core
    }
}

fn strip_quotes(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'\'' || first == b'"') && first == last {
            return Some(&text[1..text.len() - 1]);
        }
    }
    None
}

fn is_class_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_uppercase())
        && chars.all(|c| c.is_alphanumeric() || c == '_')
        && !matches!(name, "Any" | "Callable" | "Type" | "Literal" | "Self" | "TypeVar")
}
