//! Generated `unittest` modules.
//!
//! Each artifact is self-contained: it embeds the plan and the expected
//! behavior as JSON plus the same value codec the sandbox driver uses, and
//! loads the implementation from `EQUIV_UNIT_PATH` (defaulting to the
//! reference it was generated from). Running it against a candidate checks
//! the candidate the same way the harness does.

use super::case::TestCase;
use crate::config::Tolerance;
use crate::corpus::Unit;
use crate::error::{HarnessError, HarnessResult};
use crate::sandbox::{RaiseSite, CODEC};
use crate::synth::Value;
use crate::verdict::Stability;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

const TEMPLATE: &str = r#""""Equivalence test for @UNIT@ (seed @SEED@), generated by equiv @VERSION@."""
import math
import os
import sys
import types
import unittest
@CODEC@

UNIT_PATH = os.environ.get("EQUIV_UNIT_PATH", @DEFAULT_PATH@)
CLASS_NAME = @CLASS_NAME@
PLAN = json.loads(@PLAN@)
EXPECTED = json.loads(@EXPECTED@)
KIND = EXPECTED.get("raised_error_kind")
REL_TOL = @REL_TOL@
ABS_TOL = @ABS_TOL@


def load_unit():
    module = types.ModuleType("equiv_unit")
    sys.modules["equiv_unit"] = module
    with open(UNIT_PATH, encoding="utf-8") as handle:
        source = handle.read()
    exec(compile(source, UNIT_PATH, "exec"), module.__dict__)
    return module.__dict__


def same(expected, actual):
    te, ta = expected["t"], actual["t"]
    if te in ("int", "float") and ta in ("int", "float"):
        if te == "int" and ta == "int":
            return expected["v"] == actual["v"]
        a, b = float(expected["v"]), float(actual["v"])
        if math.isnan(a) or math.isnan(b):
            return math.isnan(a) and math.isnan(b)
        return math.isclose(a, b, rel_tol=REL_TOL, abs_tol=ABS_TOL)
    if te != ta:
        return False
    if te in ("list", "tuple", "set"):
        xs, ys = expected["items"], actual["items"]
        return len(xs) == len(ys) and all(same(x, y) for x, y in zip(xs, ys))
    if te == "dict":
        xs, ys = expected["items"], actual["items"]
        return len(xs) == len(ys) and all(
            same(ka, kb) and same(va, vb) for (ka, va), (kb, vb) in zip(xs, ys)
        )
    if te == "object":
        return expected["type"] == actual["type"]
    return expected.get("v") == actual.get("v")


@SKIP@class EquivalenceTest(unittest.TestCase):
    def assert_raises_kind(self, action, where):
        try:
            action()
        except BaseException as e:
            self.assertEqual(type(e).__name__, KIND, "%s raised the wrong kind" % where)
        else:
            self.fail("%s should raise %s" % (where, KIND))

    def test_matches_reference(self):
        ns = load_unit()
        cls = ns.get(CLASS_NAME)
        self.assertIsInstance(cls, type, "class %s is not defined" % CLASS_NAME)
        site = EXPECTED.get("raised_at") or {}
        if site.get("site") == "construction":
            self.assert_raises_kind(lambda: construct(cls, PLAN, ns), "construction")
            return
        raise_index = site.get("index") if site.get("site") == "call" else None
        obj = construct(cls, PLAN, ns)
        for i, call in enumerate(PLAN["calls"]):
            if i == raise_index:
                self.assert_raises_kind(lambda: invoke(obj, call, ns), "invocation %d" % i)
                return
            actual = encode(invoke(obj, call, ns))
            expected = EXPECTED["return_values"][i]
            self.assertTrue(
                same(expected, actual),
                "invocation %d (%s): expected %r, got %r" % (i, call["method"], expected, actual),
            )


if __name__ == "__main__":
    unittest.main()
"#;

/// Expected behavior as embedded in the artifact.
#[derive(Serialize)]
struct Expectation<'a> {
    status: String,
    return_values: &'a [Value],
    raised_error_kind: Option<&'a str>,
    raised_at: Option<RaiseSite>,
}

/// A rendered test module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// File name, `test_<unit>_seed_<seed>.py`.
    pub file_name: String,
    /// Python source.
    pub contents: String,
}

/// Python string literal for `text`; JSON string syntax is valid Python.
fn py_str(text: &str) -> HarnessResult<String> {
    Ok(serde_json::to_string(text)?)
}

/// Substitute `@NAME@` placeholders in one pass; substituted text is not rescanned.
fn fill(template: &str, values: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len() * 2);
    let mut rest = template;
    while let Some(start) = rest.find('@') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let found = after.find('@').and_then(|end| {
            let key = &after[..end];
            values
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (end, value))
        });
        match found {
            Some((end, value)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('@');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Render the test module for one case.
pub fn render(case: &TestCase, reference: &Unit, tolerance: &Tolerance) -> HarnessResult<Artifact> {
    let expected = &case.expected;
    let expectation = Expectation {
        status: expected.status.to_string(),
        return_values: &expected.return_values,
        raised_error_kind: expected.raised_error_kind.as_deref(),
        raised_at: expected.raised_at,
    };
    let skip = match &case.stability {
        Stability::Stable => String::new(),
        Stability::Unstable(reason) => {
            format!("@unittest.skip({})\n", py_str(reason)?)
        }
    };
    let default_path = reference.origin.to_string_lossy();

    let contents = fill(
        TEMPLATE,
        &[
            ("CODEC", CODEC.to_string()),
            ("UNIT", case.plan.unit_id.clone()),
            ("SEED", case.plan.seed.to_string()),
            ("VERSION", env!("CARGO_PKG_VERSION").to_string()),
            ("DEFAULT_PATH", py_str(&default_path)?),
            ("CLASS_NAME", py_str(&reference.class_name)?),
            ("PLAN", py_str(&serde_json::to_string(&case.plan)?)?),
            ("EXPECTED", py_str(&serde_json::to_string(&expectation)?)?),
            ("REL_TOL", format!("{:?}", tolerance.rel)),
            ("ABS_TOL", format!("{:?}", tolerance.abs)),
            ("SKIP", skip),
        ],
    );

    Ok(Artifact {
        file_name: case.artifact_name(),
        contents,
    })
}

/// Write artifacts into `dir`, creating it if needed.
pub fn write_all(dir: &Path, artifacts: &[Artifact]) -> HarnessResult<Vec<PathBuf>> {
    fs::create_dir_all(dir).map_err(|e| HarnessError::io(dir, e))?;
    artifacts
        .iter()
        .map(|artifact| {
            let path = dir.join(&artifact.file_name);
            fs::write(&path, &artifact.contents).map_err(|e| HarnessError::io(&path, e))?;
            Ok(path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::ExecutionResult;
    use crate::signature::extract;
    use crate::synth::{CallPlan, Invocation};
    use std::sync::Arc;

    fn reference() -> Unit {
        let source = "class Counter:\n    def increment(self) -> int:\n        return 1\n";
        Unit::new(
            "counter",
            source.to_string(),
            "/corpus/counter.py".into(),
            Arc::new(extract(source, Some("counter")).unwrap()),
        )
    }

    fn case(expected: ExecutionResult, stability: Stability) -> TestCase {
        let plan = CallPlan::new("counter", 11, vec![], vec![Invocation::call("increment", vec![])]);
        TestCase::new(plan, expected, stability)
    }

    #[test]
    fn test_render_embeds_plan_and_expectation() {
        let c = case(ExecutionResult::completed(vec![Value::int(1)]), Stability::Stable);
        let artifact = render(&c, &reference(), &Tolerance::default()).unwrap();
        assert_eq!(artifact.file_name, "test_counter_seed_11.py");
        let text = &artifact.contents;
        assert!(text.starts_with("\"\"\"Equivalence test for counter (seed 11)"));
        assert!(text.contains("os.environ.get(\"EQUIV_UNIT_PATH\", \"/corpus/counter.py\")"));
        assert!(text.contains("CLASS_NAME = \"Counter\""));
        assert!(text.contains("def decode(v, ns):"));
        assert!(text.contains("REL_TOL = "));
        for placeholder in ["@PLAN@", "@EXPECTED@", "@CODEC@", "@SKIP@"] {
            assert!(!text.contains(placeholder));
        }
        assert!(!text.contains("unittest.skip("));
        assert_eq!(text.matches("def invoke(").count(), 1);
    }

    #[test]
    fn test_keyword_arguments_reach_the_artifact() {
        let mut plan = CallPlan::new("counter", 11, vec![], vec![]);
        plan.constructor_kwargs = vec![("start".to_string(), Value::int(4))];
        let mut call = Invocation::call("add", vec![Value::int(1)]);
        call.kwargs = vec![("label".to_string(), Value::str("x"))];
        plan.calls.push(call);
        let c = TestCase::new(plan, ExecutionResult::completed(vec![Value::int(5)]), Stability::Stable);
        let text = render(&c, &reference(), &Tolerance::default()).unwrap().contents;
        assert!(text.contains(r#"\"constructor_kwargs\":[[\"start\","#));
        assert!(text.contains(r#"\"kwargs\":[[\"label\","#));
        assert!(text.contains("construct(cls, PLAN, ns)"));
    }

    #[test]
    fn test_unstable_case_is_skipped() {
        let c = case(ExecutionResult::timeout(), Stability::Unstable("reference timed out".to_string()));
        let artifact = render(&c, &reference(), &Tolerance::default()).unwrap();
        assert!(artifact
            .contents
            .contains("@unittest.skip(\"reference timed out\")\nclass EquivalenceTest"));
    }

    #[test]
    fn test_construction_raise_expectation() {
        let c = case(
            ExecutionResult::raised("NotImplementedError", RaiseSite::Construction, vec![]),
            Stability::Stable,
        );
        let artifact = render(&c, &reference(), &Tolerance::default()).unwrap();
        assert!(artifact.contents.contains("NotImplementedError"));
        assert!(artifact.contents.contains(r#"\"site\":\"construction\""#));
    }

    #[test]
    fn test_fill_single_pass() {
        let text = fill("a @X@ b @Y@ c@", &[("X", "@Y@".to_string()), ("Y", "y".to_string())]);
        assert_eq!(text, "a @Y@ b y c@");
    }

    #[test]
    fn test_write_all_creates_dir() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("generated");
        let c = case(ExecutionResult::completed(vec![Value::int(1)]), Stability::Stable);
        let artifact = render(&c, &reference(), &Tolerance::default()).unwrap();
        let written = write_all(&target, &[artifact]).unwrap();
        assert_eq!(written, vec![target.join("test_counter_seed_11.py")]);
        assert!(written[0].exists());
    }
}
