//! The Python driver run inside each sandbox process.
//!
//! The driver reads one JSON request from stdin, applies the resource
//! ceilings, loads the unit source into a fresh module, then constructs the
//! class and performs the planned calls. Progress is reported as one JSON
//! event per line on a private pipe whose descriptor arrives in the request;
//! everything the unit writes to stdout is its own output and never parsed.
//!
//! The value codec is shared with the generated test artifacts so both
//! decode inputs, invoke methods and encode outputs identically.

use super::executor::ExecRequest;
use crate::config::ExecLimits;
use crate::synth::CallPlan;
use serde::{Deserialize, Serialize};

/// Value codec: `Sentinel`, `decode`, `encode`, `settle`, `construct`, `invoke`.
pub const CODEC: &str = r#"
import asyncio
import inspect
import json


class Sentinel:
    def __repr__(self):
        return "<sentinel>"


MAX_DEPTH = 32


def decode(v, ns):
    t = v["t"]
    if t == "none":
        return None
    if t == "bool":
        return bool(v["v"])
    if t == "int":
        return int(v["v"])
    if t == "float":
        return float(v["v"])
    if t == "str":
        return v["v"]
    if t == "bytes":
        return bytes.fromhex(v["v"])
    if t == "list":
        return [decode(x, ns) for x in v["items"]]
    if t == "tuple":
        return tuple(decode(x, ns) for x in v["items"])
    if t == "set":
        return set(decode(x, ns) for x in v["items"])
    if t == "dict":
        return {decode(k, ns): decode(x, ns) for k, x in v["items"]}
    if t == "instance":
        cls = ns.get(v["class"])
        if not isinstance(cls, type):
            return Sentinel()
        return cls(*[decode(x, ns) for x in v["args"]])
    return Sentinel()


def _canon(e):
    return json.dumps(e, sort_keys=True)


def encode(x, depth=0):
    if depth > MAX_DEPTH:
        return {"t": "object", "type": type(x).__name__}
    if x is None:
        return {"t": "none"}
    if isinstance(x, bool):
        return {"t": "bool", "v": x}
    if isinstance(x, int):
        try:
            return {"t": "int", "v": str(int(x))}
        except ValueError:
            return {"t": "object", "type": type(x).__name__}
    if isinstance(x, float):
        return {"t": "float", "v": repr(float(x))}
    if isinstance(x, str):
        return {"t": "str", "v": str(x)}
    if isinstance(x, (bytes, bytearray)):
        return {"t": "bytes", "v": bytes(x).hex()}
    if isinstance(x, list):
        return {"t": "list", "items": [encode(i, depth + 1) for i in x]}
    if isinstance(x, tuple):
        return {"t": "tuple", "items": [encode(i, depth + 1) for i in x]}
    if isinstance(x, (set, frozenset)):
        items = [encode(i, depth + 1) for i in x]
        items.sort(key=_canon)
        return {"t": "set", "items": items}
    if isinstance(x, dict):
        items = [[encode(k, depth + 1), encode(v, depth + 1)] for k, v in x.items()]
        items.sort(key=lambda kv: _canon(kv[0]))
        return {"t": "dict", "items": items}
    return {"t": "object", "type": type(x).__name__}


def settle(result):
    if inspect.iscoroutine(result):
        return asyncio.run(result)
    return result


def keywords(pairs, ns):
    return {name: decode(v, ns) for name, v in pairs}


def construct(cls, plan, ns):
    args = [decode(a, ns) for a in plan["constructor_args"]]
    return cls(*args, **keywords(plan.get("constructor_kwargs", []), ns))


def invoke(obj, call, ns):
    if call.get("access"):
        return settle(getattr(obj, call["method"]))
    args = [decode(a, ns) for a in call["args"]]
    kwargs = keywords(call.get("kwargs", []), ns)
    return settle(getattr(obj, call["method"])(*args, **kwargs))
"#;

const MAIN: &str = r#"
import os
import sys
import traceback
import types

_out = None


def emit(event, **fields):
    fields["event"] = event
    _out.write(json.dumps(fields, separators=(",", ":")) + "\n")
    _out.flush()


def apply_limits(limits):
    try:
        import resource
    except ImportError:
        return
    cpu = limits.get("cpu_seconds")
    if cpu:
        try:
            resource.setrlimit(resource.RLIMIT_CPU, (cpu, cpu + 1))
        except (ValueError, OSError):
            pass
    mem = limits.get("memory_bytes")
    if mem:
        try:
            resource.setrlimit(resource.RLIMIT_AS, (mem, mem))
        except (ValueError, OSError):
            pass


def main():
    global _out
    req = json.loads(sys.stdin.read())
    fd = req["event_fd"]
    os.set_inheritable(fd, False)
    _out = os.fdopen(fd, "w", encoding="utf-8")
    apply_limits(req.get("limits", {}))
    plan = req["plan"]

    module = types.ModuleType("equiv_unit")
    sys.modules["equiv_unit"] = module
    ns = module.__dict__
    try:
        exec(compile(req["source"], req["filename"], "exec"), ns)
    except BaseException as e:
        emit("load_error", kind=type(e).__name__)
        traceback.print_exc()
        return
    cls = ns.get(req["class_name"])
    if not isinstance(cls, type):
        emit("load_error", kind="MissingClass")
        return
    emit("loaded")

    try:
        obj = construct(cls, plan, ns)
    except BaseException as e:
        emit("raised", index=None, kind=type(e).__name__)
        traceback.print_exc()
        return
    emit("constructed")

    for i, call in enumerate(plan["calls"]):
        try:
            value = encode(invoke(obj, call, ns))
        except BaseException as e:
            emit("raised", index=i, kind=type(e).__name__)
            traceback.print_exc()
            return
        emit("returned", index=i, value=value)
    emit("completed")


main()
"#;

/// Full driver script passed to `python -c`.
pub fn driver_script() -> String {
    [CODEC, MAIN].concat()
}

/// Resource ceilings applied by the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverLimits {
    /// RLIMIT_CPU soft limit in seconds.
    pub cpu_seconds: u64,
    /// RLIMIT_AS in bytes.
    pub memory_bytes: Option<u64>,
}

/// Request written to the driver's stdin.
#[derive(Debug, Clone, Serialize)]
pub struct DriverRequest<'a> {
    /// Unit source text.
    pub source: &'a str,
    /// Filename shown in tracebacks.
    pub filename: &'a str,
    /// Class to construct.
    pub class_name: &'a str,
    /// Calls to perform.
    pub plan: &'a CallPlan,
    /// Ceilings.
    pub limits: DriverLimits,
    /// Descriptor of the private event pipe in the sandbox process.
    pub event_fd: i32,
}

impl<'a> DriverRequest<'a> {
    /// Build a request for one execution.
    pub fn new(request: &ExecRequest<'a>, limits: &ExecLimits, event_fd: i32) -> Self {
        Self {
            source: request.source,
            filename: request.filename,
            class_name: request.class_name,
            plan: request.plan,
            limits: DriverLimits {
                cpu_seconds: limits.cpu_seconds,
                memory_bytes: limits.memory_bytes,
            },
            event_fd,
        }
    }
}

/// Event emitted by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DriverEvent {
    /// Source executed and class found.
    Loaded,
    /// Source failed to load.
    LoadError {
        /// Exception class name, or `MissingClass`.
        kind: String,
    },
    /// Constructor returned.
    Constructed,
    /// Constructor (`index` absent) or call `index` raised.
    Raised {
        /// Call index; `None` for the constructor.
        index: Option<usize>,
        /// Exception class name.
        kind: String,
    },
    /// Call `index` returned `value`.
    Returned {
        /// Call index.
        index: usize,
        /// Encoded return value.
        value: crate::synth::Value,
    },
    /// Every call returned.
    Completed,
}

impl DriverEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Loaded => "loaded",
            Self::LoadError { .. } => "load_error",
            Self::Constructed => "constructed",
            Self::Raised { .. } => "raised",
            Self::Returned { .. } => "returned",
            Self::Completed => "completed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::Value;

    #[test]
    fn test_script_shares_codec() {
        let script = driver_script();
        assert!(script.starts_with(CODEC));
        assert!(script.contains("def invoke(obj, call, ns)"));
        assert!(MAIN.contains("os.fdopen(fd"));
        assert!(CODEC.contains("return asyncio.run(result)"));
    }

    #[test]
    fn test_event_decoding() {
        let raised: DriverEvent =
            serde_json::from_str(r#"{"index":null,"kind":"ValueError","event":"raised"}"#).unwrap();
        assert_eq!(
            raised,
            DriverEvent::Raised {
                index: None,
                kind: "ValueError".to_string()
            }
        );
        let returned: DriverEvent =
            serde_json::from_str(r#"{"index":0,"value":{"t":"int","v":"1"},"event":"returned"}"#).unwrap();
        assert_eq!(
            returned,
            DriverEvent::Returned {
                index: 0,
                value: Value::int(1)
            }
        );
    }

    #[test]
    fn test_request_shape() {
        let plan = CallPlan::new("counter", 1, vec![], vec![]);
        let exec = ExecRequest {
            unit_id: "counter",
            source: "class C: pass",
            filename: "counter.py",
            class_name: "C",
            plan: &plan,
        };
        let limits = ExecLimits::standard();
        let request = DriverRequest::new(&exec, &limits, 7);
        let json: serde_json::Value = serde_json::to_value(&request).unwrap();
        assert_eq!(json["class_name"], "C");
        assert_eq!(json["limits"]["cpu_seconds"], 6);
        assert_eq!(json["plan"]["unit_id"], "counter");
        assert_eq!(json["event_fd"], 7);
    }
}
