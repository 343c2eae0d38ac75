//! Signature extraction over the fixture corpus.

use equiv_harness::error::HarnessError;
use equiv_harness::signature::{extract, MethodKind, TypeFamily};
use std::fs;
use std::path::PathBuf;

fn fixture(path: &str) -> String {
    let full = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(path);
    fs::read_to_string(&full).unwrap_or_else(|e| panic!("fixture {}: {e}", full.display()))
}

#[test]
fn counter_has_one_nullary_method() {
    let sig = extract(&fixture("corpus/counter.py"), Some("counter")).unwrap();
    assert_eq!(sig.class_name, "Counter");
    assert_eq!(sig.constructor_arity(), 0);
    assert_eq!(sig.methods.len(), 1);
    let increment = sig.method("increment").unwrap();
    assert_eq!(increment.arity, 0);
    assert_eq!(increment.kind, MethodKind::Instance);
    assert_eq!(increment.declared_return_type.as_deref(), Some("int"));
    assert!(!sig.has_untyped_params());
}

#[test]
fn ledger_surface() {
    let sig = extract(&fixture("corpus/ledger.py"), Some("ledger")).unwrap();
    let names: Vec<&str> = sig.constructor.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["owner", "limit"]);
    assert_eq!(sig.constructor[0].family, TypeFamily::Str);
    assert!(!sig.constructor[0].has_default);
    assert_eq!(sig.constructor[1].family, TypeFamily::Float);
    assert!(sig.constructor[1].has_default);

    let methods: Vec<&str> = sig.methods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(methods, vec!["record", "names", "over_limit", "size"]);
    assert_eq!(sig.method("record").unwrap().arity, 2);
    assert_eq!(sig.method("size").unwrap().kind, MethodKind::Property);
    assert_eq!(
        sig.method("names").unwrap().declared_return_type.as_deref(),
        Some("list[str]")
    );
}

#[test]
fn raising_constructor_still_has_signature() {
    let sig = extract(&fixture("corpus/stub.py"), Some("stub")).unwrap();
    assert_eq!(sig.class_name, "Stub");
    assert_eq!(sig.constructor_arity(), 1);
    assert_eq!(sig.constructor[0].family, TypeFamily::Int);
}

#[test]
fn syntax_error_is_unparsable() {
    let err = extract(&fixture("candidates/syntax/counter.py"), Some("counter")).unwrap_err();
    match err {
        HarnessError::UnparsableSource { line, .. } => assert_eq!(line, 2),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn signature_serializes_to_json() {
    let sig = extract(&fixture("corpus/ledger.py"), Some("ledger")).unwrap();
    let json = serde_json::to_value(&sig).unwrap();
    assert_eq!(json["class_name"], "Ledger");
    assert_eq!(json["methods"][3]["kind"], "property");
}
