//! Signature types: the public surface of a unit.

use super::annotation::TypeFamily;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One constructor or method parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    /// Parameter name.
    pub name: String,
    /// Annotation text as written, if present.
    pub declared_type: Option<String>,
    /// Whether the parameter has a default value.
    pub has_default: bool,
    /// Family used for synthesis (declared, else inferred from the default).
    pub family: TypeFamily,
}

impl ParamDescriptor {
    /// Whether synthesis must fall back to the untyped ladder.
    pub fn is_untyped(&self) -> bool {
        !self.family.is_known()
    }
}

/// How a method is reached on an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    /// Ordinary method taking `self`.
    Instance,
    /// `@staticmethod`.
    Static,
    /// `@classmethod`.
    Class,
    /// `@property`: read by attribute access, never called.
    Property,
}

/// One public method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    /// Method name.
    pub name: String,
    /// Number of positional arguments supplied per call.
    pub arity: usize,
    /// Return annotation text, if present.
    pub declared_return_type: Option<String>,
    /// Dispatch kind.
    pub kind: MethodKind,
    /// Positional parameters, excluding `self`/`cls`.
    pub params: Vec<ParamDescriptor>,
    /// Keyword-only parameters without a default, passed by name.
    #[serde(default)]
    pub keywords: Vec<ParamDescriptor>,
}

/// Public surface of a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Class under test.
    pub class_name: String,
    /// Constructor parameters, excluding `self`.
    pub constructor: Vec<ParamDescriptor>,
    /// Required keyword-only constructor parameters.
    #[serde(default)]
    pub constructor_keywords: Vec<ParamDescriptor>,
    /// Public methods in definition order.
    pub methods: Vec<MethodDescriptor>,
    /// Constructor parameters of the other classes in the same source.
    pub local_classes: BTreeMap<String, Vec<ParamDescriptor>>,
}

impl Signature {
    /// Constructor arity.
    pub fn constructor_arity(&self) -> usize {
        self.constructor.len()
    }

    /// Find a method by name.
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Whether any parameter, constructor or method, is untyped.
    pub fn has_untyped_params(&self) -> bool {
        self.constructor
            .iter()
            .chain(&self.constructor_keywords)
            .any(ParamDescriptor::is_untyped)
            || self
                .methods
                .iter()
                .flat_map(|m| m.params.iter().chain(&m.keywords))
                .any(ParamDescriptor::is_untyped)
    }
}
