//! Signature extraction.
//!
//! Reads a unit's public surface from its source text without executing
//! it. The extractor is purely static: the [`lexer`] produces logical lines,
//! the [`parser`] validates block structure and collects class definitions,
//! and [`annotation`] maps annotations and literal defaults to type families.
//!
//! # Subject class
//!
//! A source file may define helper classes. The class under test is the
//! top-level class whose name matches the file stem (ignoring case and
//! underscores), falling back to the last top-level class.

pub mod annotation;
pub mod lexer;
pub mod parser;
pub mod types;

pub use annotation::{infer_from_default, parse_annotation, TypeFamily};
pub use parser::{parse_module, ClassDef, FunctionDef, Module, ParamKind, RawParam};
pub use types::{MethodDescriptor, MethodKind, ParamDescriptor, Signature};

use crate::error::{HarnessError, HarnessResult};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Maximum base-class chain followed when resolving inherited members.
const MAX_LINEAGE: usize = 8;

/// Extract the signature of the subject class in `source`.
///
/// `stem` is the file stem used to pick the subject class when the source
/// defines several.
pub fn extract(source: &str, stem: Option<&str>) -> HarnessResult<Signature> {
    let module = parse_module(source)?;
    let subject = select_class(&module, stem).ok_or_else(|| HarnessError::UnparsableSource {
        line: 1,
        message: "no top-level class definition".to_string(),
    })?;

    let local_classes = module
        .classes
        .iter()
        .map(|c| (c.name.clone(), constructor_params(&module, c)))
        .collect();

    Ok(Signature {
        class_name: subject.name.clone(),
        constructor: constructor_params(&module, subject),
        constructor_keywords: constructor_keywords(&module, subject),
        methods: public_methods(&module, subject),
        local_classes,
    })
}

fn select_class<'m>(module: &'m Module, stem: Option<&str>) -> Option<&'m ClassDef> {
    let normalize = |s: &str| {
        s.chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect::<String>()
    };
    if let Some(stem) = stem {
        let wanted = normalize(stem);
        if let Some(class) = module.classes.iter().find(|c| normalize(&c.name) == wanted) {
            return Some(class);
        }
    }
    module.classes.last()
}

/// The class followed by its same-file ancestors, nearest first.
fn lineage<'m>(module: &'m Module, class: &'m ClassDef) -> Vec<&'m ClassDef> {
    let mut chain = vec![class];
    let mut seen = HashSet::from([class.name.as_str()]);
    let mut current = class;
    while chain.len() < MAX_LINEAGE {
        let next = current
            .bases
            .iter()
            .filter_map(|b| module.class(b.rsplit('.').next().unwrap_or(b)))
            .find(|c| !seen.contains(c.name.as_str()));
        match next {
            Some(base) => {
                seen.insert(base.name.as_str());
                chain.push(base);
                current = base;
            }
            None => break,
        }
    }
    chain
}

fn constructor_params(module: &Module, class: &ClassDef) -> Vec<ParamDescriptor> {
    let chain = lineage(module, class);
    for ancestor in &chain {
        if let Some(init) = ancestor.method("__init__") {
            return positional(init, 1);
        }
    }

    if chain.iter().any(|c| c.is_dataclass()) {
        let mut fields: Vec<ParamDescriptor> = Vec::new();
        for ancestor in chain.iter().rev().filter(|c| c.is_dataclass()) {
            for field in &ancestor.fields {
                let descriptor = describe(&field.name, Some(&field.annotation), field.default.as_deref());
                match fields.iter_mut().find(|f| f.name == field.name) {
                    Some(existing) => *existing = descriptor,
                    None => fields.push(descriptor),
                }
            }
        }
        return fields;
    }
    Vec::new()
}

fn constructor_keywords(module: &Module, class: &ClassDef) -> Vec<ParamDescriptor> {
    lineage(module, class)
        .iter()
        .find_map(|c| c.method("__init__"))
        .map(required_keywords)
        .unwrap_or_default()
}

fn public_methods(module: &Module, class: &ClassDef) -> Vec<MethodDescriptor> {
    let mut seen = HashSet::new();
    let mut methods = Vec::new();
    for ancestor in lineage(module, class) {
        for func in &ancestor.methods {
            if !seen.insert(func.name.as_str()) {
                continue;
            }
            if func.name.starts_with('_') {
                continue;
            }
            if let Some(method) = describe_method(func) {
                methods.push(method);
            }
        }
    }
    methods
}

fn describe_method(func: &FunctionDef) -> Option<MethodDescriptor> {
    let has = |name: &str| {
        func.decorators
            .iter()
            .any(|d| d == name || d.ends_with(&format!(".{name}")))
    };
    if func
        .decorators
        .iter()
        .any(|d| d.ends_with(".setter") || d.ends_with(".deleter"))
    {
        return None;
    }

    let kind = if has("staticmethod") {
        MethodKind::Static
    } else if has("classmethod") {
        MethodKind::Class
    } else if has("property") || has("cached_property") {
        MethodKind::Property
    } else {
        MethodKind::Instance
    };

    let params = match kind {
        MethodKind::Static => positional(func, 0),
        MethodKind::Property => Vec::new(),
        MethodKind::Instance | MethodKind::Class => positional(func, 1),
    };
    let keywords = match kind {
        MethodKind::Property => Vec::new(),
        _ => required_keywords(func),
    };

    Some(MethodDescriptor {
        name: func.name.clone(),
        arity: params.len(),
        declared_return_type: func.returns.clone(),
        kind,
        params,
        keywords,
    })
}

/// Positional parameters of `func`, skipping the first `skip` (self/cls).
fn positional(func: &FunctionDef, skip: usize) -> Vec<ParamDescriptor> {
    func.params
        .iter()
        .filter(|p| p.kind == ParamKind::Positional)
        .skip(skip)
        .map(|p| describe(&p.name, p.annotation.as_deref(), p.default.as_deref()))
        .collect()
}

/// Keyword-only parameters of `func` that have no default.
fn required_keywords(func: &FunctionDef) -> Vec<ParamDescriptor> {
    func.params
        .iter()
        .filter(|p| p.kind == ParamKind::KeywordOnly && p.default.is_none())
        .map(|p| describe(&p.name, p.annotation.as_deref(), None))
        .collect()
}

fn describe(name: &str, annotation: Option<&str>, default: Option<&str>) -> ParamDescriptor {
    let declared = annotation.map(parse_annotation).unwrap_or(TypeFamily::Unknown);
    let family = if declared.is_known() {
        declared
    } else {
        default.map(infer_from_default).unwrap_or(TypeFamily::Unknown)
    };
    ParamDescriptor {
        name: name.to_string(),
        declared_type: annotation.map(str::to_string),
        has_default: default.is_some(),
        family,
    }
}

/// Read-only signature cache keyed by unit id.
///
/// Filled once while the corpus loads and shared by reference afterwards;
/// every candidate of a unit reuses the reference's signature.
#[derive(Debug, Default, Clone)]
pub struct SignatureCache {
    entries: BTreeMap<String, Arc<Signature>>,
}

impl SignatureCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract and store the signature for `unit_id`, returning the shared copy.
    pub fn load(&mut self, unit_id: &str, source: &str) -> HarnessResult<Arc<Signature>> {
        if let Some(existing) = self.entries.get(unit_id) {
            return Ok(Arc::clone(existing));
        }
        let signature = Arc::new(extract(source, Some(unit_id))?);
        self.entries
            .insert(unit_id.to_string(), Arc::clone(&signature));
        Ok(signature)
    }

    /// Look up a cached signature.
    pub fn get(&self, unit_id: &str) -> Option<Arc<Signature>> {
        self.entries.get(unit_id).cloned()
    }

    /// Number of cached signatures.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHAPES: &str = r#"
class Node:
    def __init__(self, value: int, next: 'Node' = None):
        self.value = value
        self.next = next

class Base:
    def __init__(self, name, size=0):
        self.name = name

    def describe(self) -> str:
        return self.name

    def _hidden(self):
        pass

class LinkedStack(Base):
    def push(self, node: Node) -> None:
        pass

    def describe(self, verbose: bool) -> str:
        return "stack"

    @staticmethod
    def make(n: int):
        return n

    @property
    def size(self) -> int:
        return 0

    @size.setter
    def size(self, value):
        pass
"#;

    #[test]
    fn test_subject_selected_by_stem() {
        let sig = extract(SHAPES, Some("linked_stack")).unwrap();
        assert_eq!(sig.class_name, "LinkedStack");
        let sig = extract(SHAPES, Some("node")).unwrap();
        assert_eq!(sig.class_name, "Node");
        let sig = extract(SHAPES, None).unwrap();
        assert_eq!(sig.class_name, "LinkedStack");
    }

    #[test]
    fn test_inherited_constructor_and_methods() {
        let sig = extract(SHAPES, Some("linked_stack")).unwrap();
        let ctor: Vec<&str> = sig.constructor.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(ctor, vec!["name", "size"]);
        assert!(sig.constructor[0].is_untyped());
        assert_eq!(sig.constructor[1].family, TypeFamily::Int);
        assert!(sig.constructor[1].has_default);

        let names: Vec<&str> = sig.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["push", "describe", "make", "size"]);

        let describe = sig.method("describe").unwrap();
        assert_eq!(describe.arity, 1, "override wins over inherited method");
        let make = sig.method("make").unwrap();
        assert_eq!(make.kind, MethodKind::Static);
        assert_eq!(make.arity, 1);
        let size = sig.method("size").unwrap();
        assert_eq!(size.kind, MethodKind::Property);
        assert_eq!(size.arity, 0);
    }

    #[test]
    fn test_local_classes_recorded() {
        let sig = extract(SHAPES, Some("linked_stack")).unwrap();
        let node = &sig.local_classes["Node"];
        assert_eq!(node.len(), 2);
        assert_eq!(
            node[1].family,
            TypeFamily::Custom {
                name: "Node".to_string()
            }
        );
    }

    #[test]
    fn test_dataclass_fields_become_constructor() {
        let src = "from dataclasses import dataclass\n\n@dataclass\nclass Point:\n    x: int\n    y: float = 0.0\n\n    def norm(self) -> float:\n        return abs(self.x) + abs(self.y)\n";
        let sig = extract(src, Some("point")).unwrap();
        assert_eq!(sig.constructor_arity(), 2);
        assert_eq!(sig.constructor[1].family, TypeFamily::Float);
        assert_eq!(sig.methods.len(), 1);
    }

    #[test]
    fn test_required_keyword_only_params() {
        let src = "class Ledger:\n    def __init__(self, *, owner: str, limit: int = 5):\n        self.owner = owner\n\n    def post(self, amount: int, *args, memo, when: int = 0, **extra) -> int:\n        return amount\n\n    @property\n    def total(self) -> int:\n        return 0\n";
        let sig = extract(src, Some("ledger")).unwrap();
        assert_eq!(sig.constructor_arity(), 0);
        let ctor: Vec<&str> = sig.constructor_keywords.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(ctor, vec!["owner"]);
        assert_eq!(sig.constructor_keywords[0].family, TypeFamily::Str);

        let post = sig.method("post").unwrap();
        assert_eq!(post.arity, 1);
        assert_eq!(post.keywords.len(), 1);
        assert_eq!(post.keywords[0].name, "memo");
        assert!(post.keywords[0].is_untyped());
        assert!(sig.has_untyped_params());
        assert!(sig.method("total").unwrap().keywords.is_empty());
    }

    #[test]
    fn test_no_class_is_unparsable() {
        let err = extract("def f():\n    return 1\n", None).unwrap_err();
        assert!(matches!(err, HarnessError::UnparsableSource { .. }));
    }

    #[test]
    fn test_missing_types_are_not_errors() {
        let sig = extract("class Stub:\n    def __init__(self, a, b):\n        raise NotImplementedError\n", None).unwrap();
        assert_eq!(sig.constructor_arity(), 2);
        assert!(sig.has_untyped_params());
    }

    #[test]
    fn test_cache_reuses_signature() {
        let mut cache = SignatureCache::new();
        let first = cache.load("node", SHAPES).unwrap();
        let second = cache.load("node", "this would not parse (").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        assert!(cache.get("missing").is_none());
    }
}
