/// Script Engine - In-Sandbox Execution of Untrusted JavaScript
///
/// **Core Responsibility:**
/// Run one submitted script in a fresh V8 isolate, invoke its `main()`
/// entry point, and separate the script's own console output from its
/// declared return value.
///
/// **Critical Properties:**
/// - Every invocation gets a brand-new isolate; no bindings survive from
///   prior runs
/// - Console output is captured in-memory and never reaches the real
///   stdout, so the result envelope stays the only thing printed there
/// - Failure classes are distinct: a script that will not load is a
///   `LoadError`, a script without a callable `main` is a
///   `ContractViolation`, a throw during `main()` is a `RuntimeFailure`,
///   and a return value the wire format cannot carry is a
///   `NonSerializableResult`
/// - Error text is a single `Class: message` line, never a stack trace
use deno_core::{JsRuntime, RuntimeOptions};
use serde_json::Value;
use thiserror::Error;

/// Installed before the user script so every `console.*` call lands in an
/// in-memory buffer instead of the process stdout.
const BOOTSTRAP: &str = r#"
globalThis.__runbox_stdout = [];
(() => {
  const fmt = (v) => {
    if (typeof v === "string") return v;
    try {
      const s = JSON.stringify(v);
      if (s !== undefined) return s;
    } catch (_) {}
    return String(v);
  };
  const write = (args) => {
    globalThis.__runbox_stdout.push(args.map(fmt).join(" "));
  };
  globalThis.console = {
    log: (...args) => write(args),
    info: (...args) => write(args),
    warn: (...args) => write(args),
    error: (...args) => write(args),
    debug: (...args) => write(args),
  };
})();
"#;

/// Explicit interface check, performed before invocation rather than
/// discovering a missing symbol mid-call. A bare `typeof main` sees both
/// `function main()` declarations and top-level `const main = ...`
/// bindings, which live in the global lexical environment rather than on
/// `globalThis`.
const CONTRACT_CHECK: &str = r#"
typeof main === "function"
  ? "ok"
  : (typeof main === "undefined" ? "missing" : "wrongtype")
"#;

const INVOKE: &str = "globalThis.__runbox_result = main();";

/// Wire-format predicate. `undefined` (no explicit return) maps to null;
/// anything the wire format cannot carry is rejected, not coerced. A bare
/// `JSON.stringify` would silently drop function-valued and
/// undefined-valued members and turn NaN/Infinity into null, so the
/// replacer throws on every value stringification would lose or rewrite.
const SERIALIZE: &str = r#"
(() => {
  const value = globalThis.__runbox_result;
  if (value === undefined) return "null";
  if (value !== null && typeof value.then === "function") {
    throw new TypeError("main() returned a Promise; async entry points are not supported");
  }
  const strict = (key, v) => {
    if (typeof v === "function" || typeof v === "symbol" || v === undefined) {
      const at = key === "" ? "return value" : "value at key '" + key + "'";
      throw new TypeError(at + " of type " + typeof v + " is not JSON-serializable");
    }
    if (typeof v === "number" && !Number.isFinite(v)) {
      const at = key === "" ? "return value" : "value at key '" + key + "'";
      throw new TypeError(at + " is a non-finite number and not JSON-serializable");
    }
    return v;
  };
  const s = JSON.stringify(value, strict);
  if (s === undefined) {
    throw new TypeError("return value of main() is not JSON-serializable");
  }
  return s;
})()
"#;

const COLLECT_STDOUT: &str = r#"
Array.isArray(globalThis.__runbox_stdout)
  ? globalThis.__runbox_stdout.join("\n")
  : ""
"#;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("LoadError: {0}")]
    Load(String),
    #[error("ContractViolation: {0}")]
    Contract(String),
    #[error("RuntimeFailure: {0}")]
    Runtime(String),
    #[error("NonSerializableResult: {0}")]
    NonSerializable(String),
}

/// Outcome of one script evaluation. `stdout` is populated even when the
/// run failed, carrying whatever the script printed before the failure.
pub struct Evaluation {
    pub outcome: Result<Value, RunError>,
    pub stdout: String,
}

/// Reduce a V8 error report to its first line and drop the "Uncaught "
/// prefix, leaving a short `Class: message` description.
fn short_error(raw: impl ToString) -> String {
    let raw = raw.to_string();
    let line = raw.lines().next().unwrap_or("").trim();
    line.strip_prefix("Uncaught ").unwrap_or(line).to_string()
}

fn eval_to_string(
    runtime: &mut JsRuntime,
    name: &'static str,
    code: &str,
) -> Result<String, String> {
    let global = runtime
        .execute_script(name, code.to_string())
        .map_err(short_error)?;
    let scope = &mut runtime.handle_scope();
    let local = deno_core::v8::Local::new(scope, global);
    Ok(local.to_rust_string_lossy(scope))
}

fn captured_stdout(runtime: &mut JsRuntime) -> String {
    eval_to_string(runtime, "<collect_stdout>", COLLECT_STDOUT).unwrap_or_default()
}

/// Evaluate one submitted script in a fresh isolate.
///
/// All four failure classes short-circuit to the same place: an
/// `Evaluation` with the error populated and partial stdout attached, so a
/// single envelope can always be emitted.
pub fn evaluate(source: String, heap_limit_mb: Option<usize>) -> Evaluation {
    let mut options = RuntimeOptions::default();

    if let Some(mb) = heap_limit_mb {
        let max_bytes = mb * 1024 * 1024;
        let initial_bytes = (max_bytes / 10).min(10 * 1024 * 1024);
        options.create_params =
            Some(deno_core::v8::CreateParams::default().heap_limits(initial_bytes, max_bytes));
    }

    let mut runtime = JsRuntime::new(options);

    if let Err(e) = runtime.execute_script("<bootstrap>", BOOTSTRAP) {
        return Evaluation {
            outcome: Err(RunError::Runtime(format!("runner bootstrap failed: {}", short_error(e)))),
            stdout: String::new(),
        };
    }

    // Loading
    if let Err(e) = runtime.execute_script("<user_script>", source) {
        let stdout = captured_stdout(&mut runtime);
        return Evaluation {
            outcome: Err(RunError::Load(short_error(e))),
            stdout,
        };
    }

    // Entry-point contract, checked before invocation
    match eval_to_string(&mut runtime, "<contract>", CONTRACT_CHECK) {
        Ok(verdict) if verdict == "ok" => {}
        Ok(verdict) => {
            let message = if verdict == "missing" {
                "script must define a main() function"
            } else {
                "main is defined but is not callable"
            };
            let stdout = captured_stdout(&mut runtime);
            return Evaluation {
                outcome: Err(RunError::Contract(message.to_string())),
                stdout,
            };
        }
        Err(e) => {
            let stdout = captured_stdout(&mut runtime);
            return Evaluation {
                outcome: Err(RunError::Runtime(e)),
                stdout,
            };
        }
    }

    // Executing
    if let Err(e) = runtime.execute_script("<invoke>", INVOKE) {
        let stdout = captured_stdout(&mut runtime);
        return Evaluation {
            outcome: Err(RunError::Runtime(short_error(e))),
            stdout,
        };
    }

    // Validating against the wire format
    let encoded = match eval_to_string(&mut runtime, "<serialize>", SERIALIZE) {
        Ok(encoded) => encoded,
        Err(e) => {
            let stdout = captured_stdout(&mut runtime);
            return Evaluation {
                outcome: Err(RunError::NonSerializable(e)),
                stdout,
            };
        }
    };

    let stdout = captured_stdout(&mut runtime);
    match serde_json::from_str::<Value>(&encoded) {
        Ok(value) => Evaluation {
            outcome: Ok(value),
            stdout,
        },
        Err(e) => Evaluation {
            outcome: Err(RunError::NonSerializable(format!(
                "serialized value is not valid JSON: {}",
                e
            ))),
            stdout,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(source: &str) -> Evaluation {
        evaluate(source.to_string(), None)
    }

    #[test]
    fn test_return_value_and_stdout_are_separated() {
        let evaluation = run(r#"
            function main() {
                console.log("hi");
                return { x: 1 };
            }
        "#);

        assert_eq!(evaluation.outcome.unwrap(), json!({"x": 1}));
        assert_eq!(evaluation.stdout, "hi");
    }

    #[test]
    fn test_scalar_and_array_results_allowed() {
        assert_eq!(run("function main() { return 42; }").outcome.unwrap(), json!(42));
        assert_eq!(
            run("function main() { return [1, 'two']; }").outcome.unwrap(),
            json!([1, "two"])
        );
    }

    #[test]
    fn test_no_explicit_return_maps_to_null() {
        let evaluation = run("function main() { console.log('only output'); }");
        assert_eq!(evaluation.outcome.unwrap(), json!(null));
        assert_eq!(evaluation.stdout, "only output");
    }

    #[test]
    fn test_syntax_error_is_load_error() {
        let evaluation = run("function main( {");
        match evaluation.outcome {
            Err(RunError::Load(_)) => {}
            other => panic!("expected LoadError, got {:?}", other.map(|_| ())),
        }
        assert_eq!(evaluation.stdout, "");
    }

    #[test]
    fn test_missing_main_is_contract_violation_not_load_error() {
        let evaluation = run("const helper = () => 1;");
        match evaluation.outcome {
            Err(RunError::Contract(msg)) => assert!(msg.contains("main()")),
            other => panic!("expected ContractViolation, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_non_callable_main_is_contract_violation() {
        let evaluation = run("const main = 42;");
        match evaluation.outcome {
            Err(RunError::Contract(msg)) => assert!(msg.contains("not callable")),
            other => panic!("expected ContractViolation, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_throw_during_main_is_runtime_failure_with_partial_stdout() {
        let evaluation = run(r#"
            function main() {
                console.log("before the crash");
                throw new RangeError("boom");
            }
        "#);

        match evaluation.outcome {
            Err(RunError::Runtime(msg)) => {
                assert!(msg.contains("RangeError"), "got: {}", msg);
                assert!(msg.contains("boom"), "got: {}", msg);
                // Short class+message only, no stack frames
                assert!(!msg.contains("\n"));
                assert!(!msg.contains("    at "));
            }
            other => panic!("expected RuntimeFailure, got {:?}", other.map(|_| ())),
        }
        assert_eq!(evaluation.stdout, "before the crash");
    }

    #[test]
    fn test_function_result_is_non_serializable() {
        let evaluation = run("function main() { return () => 1; }");
        match evaluation.outcome {
            Err(RunError::NonSerializable(_)) => {}
            other => panic!("expected NonSerializableResult, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_nested_function_member_is_rejected_not_dropped() {
        // Plain JSON.stringify would answer {"x":1} with `f` silently gone
        let evaluation = run("function main() { return { f: () => 1, x: 1 }; }");
        match evaluation.outcome {
            Err(RunError::NonSerializable(msg)) => assert!(msg.contains("'f'"), "got: {}", msg),
            other => panic!("expected NonSerializableResult, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_undefined_member_is_rejected_not_dropped() {
        let evaluation = run("function main() { return { x: undefined }; }");
        match evaluation.outcome {
            Err(RunError::NonSerializable(_)) => {}
            other => panic!("expected NonSerializableResult, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_non_finite_numbers_are_rejected_not_coerced_to_null() {
        // NaN and Infinity stringify to null without the strict replacer
        for source in [
            "function main() { return { x: 0 / 0 }; }",
            "function main() { return [1, Infinity]; }",
        ] {
            let evaluation = run(source);
            match evaluation.outcome {
                Err(RunError::NonSerializable(msg)) => {
                    assert!(msg.contains("non-finite"), "got: {}", msg)
                }
                other => panic!("expected NonSerializableResult, got {:?}", other.map(|_| ())),
            }
        }
    }

    #[test]
    fn test_cyclic_result_is_non_serializable() {
        let evaluation = run(r#"
            function main() {
                const a = {};
                a.self = a;
                return a;
            }
        "#);
        match evaluation.outcome {
            Err(RunError::NonSerializable(_)) => {}
            other => panic!("expected NonSerializableResult, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_promise_result_is_rejected() {
        let evaluation = run("async function main() { return 1; }");
        match evaluation.outcome {
            Err(RunError::NonSerializable(msg)) => assert!(msg.contains("Promise")),
            other => panic!("expected NonSerializableResult, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_multiple_console_lines_join_with_newlines() {
        let evaluation = run(r#"
            function main() {
                console.log("one");
                console.log("two", {"n": 3});
                return null;
            }
        "#);
        assert_eq!(evaluation.stdout, "one\ntwo {\"n\":3}");
    }

    #[test]
    fn test_fresh_isolate_per_evaluation() {
        let first = run("globalThis.leak = 7; function main() { return 1; }");
        assert!(first.outcome.is_ok());

        // A second run must not observe bindings from the first
        let second = run("function main() { return typeof globalThis.leak; }");
        assert_eq!(second.outcome.unwrap(), json!("undefined"));
    }

    #[test]
    fn test_error_text_names_the_class() {
        let load = run("]").outcome.unwrap_err();
        assert!(load.to_string().starts_with("LoadError: "));

        let contract = run("const x = 1;").outcome.unwrap_err();
        assert!(contract.to_string().starts_with("ContractViolation: "));

        let runtime = run("function main() { throw new Error('n'); }").outcome.unwrap_err();
        assert!(runtime.to_string().starts_with("RuntimeFailure: "));
    }
}
