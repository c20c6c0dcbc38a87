//! try/catch/finally machinery and the error taxonomy.

use pretty_assertions::assert_eq;
use rush::{ErrorKind, Runner, RushError, Value};

fn run(source: &str) -> Value {
    Runner::new(source)
        .unwrap_or_else(|errors| panic!("syntax errors in {source:?}: {errors:?}"))
        .run()
        .unwrap_or_else(|err| panic!("runtime error in {source:?}: {err}"))
}

fn run_inspect(source: &str) -> String {
    run(source).inspect()
}

fn run_err(source: &str) -> RushError {
    Runner::new(source)
        .unwrap_or_else(|errors| panic!("syntax errors in {source:?}: {errors:?}"))
        .run()
        .expect_err("expected a runtime error")
}

#[test]
fn every_kind_round_trips_through_throw_and_catch() {
    for kind in ["Error", "ValidationError", "TypeError", "IndexError", "ArgumentError", "RuntimeError"] {
        let source = format!("try {{ throw {kind}(\"m\") }} catch ({kind} e) {{ e.type == \"{kind}\" && e.message == \"m\" }}");
        assert_eq!(run_inspect(&source), "true", "round trip failed for {kind}");
    }
}

#[test]
fn typed_catch_only_matches_its_kind() {
    let source = "
        try { throw TypeError(\"t\") }
        catch (IndexError e) { \"index\" }
        catch (TypeError e) { \"type\" }
        catch (e) { \"any\" }";
    assert_eq!(run_inspect(source), "type");
}

#[test]
fn catch_all_matches_everything() {
    assert_eq!(run_inspect("try { throw IndexError(\"x\") } catch (e) { e.type }"), "IndexError");
}

#[test]
fn unmatched_exception_keeps_propagating() {
    let err = run_err("try { throw TypeError(\"t\") } catch (IndexError e) { 1 }");
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert_eq!(err.message, "t");
}

#[test]
fn throw_of_non_error_coerces() {
    let err = run_err("throw \"boom\"");
    assert_eq!(err.kind, ErrorKind::Error);
    assert_eq!(err.message, "boom");
}

#[test]
fn finally_runs_on_normal_completion() {
    assert_eq!(run_inspect("log = []; try { 1 } finally { log = push(log, \"f\") }; log"), "[f]");
}

#[test]
fn finally_runs_on_catch() {
    let source = "
        log = []
        try { throw Error(\"x\") }
        catch (e) { log = push(log, \"c\") }
        finally { log = push(log, \"f\") }
        log";
    assert_eq!(run_inspect(source), "[c, f]");
}

#[test]
fn finally_runs_on_uncaught_exception() {
    let source = "log = []; try { throw ValidationError(\"x\") } finally { log = push(log, \"f\") }";
    let err = run_err(source);
    assert_eq!(err.kind, ErrorKind::ValidationError);
    assert_eq!(err.message, "x");
}

#[test]
fn finally_runs_on_return() {
    let source = "
        log = []
        f = fn() {
            try { return \"early\" } finally { log = push(log, \"f\") }
        }
        [f(), log]";
    assert_eq!(run_inspect(source), "[early, [f]]");
}

#[test]
fn finally_runs_exactly_once_per_entry() {
    let source = "
        count = 0
        f = fn(n) {
            try {
                if (n == 0) { throw Error(\"zero\") }
                n
            } finally { count = count + 1 }
        }
        try { f(0) } catch (e) { }
        f(1)
        count";
    assert_eq!(run_inspect(source), "2");
}

#[test]
fn rethrow_from_catch_skips_sibling_catches() {
    let source = "
        try {
            try { throw TypeError(\"inner\") }
            catch (TypeError e) { throw IndexError(\"outer\") }
            catch (IndexError e) { \"sibling should not see this\" }
        } catch (IndexError e) { e.message }";
    assert_eq!(run_inspect(source), "outer");
}

#[test]
fn exceptions_cross_function_boundaries() {
    let source = "
        inner = fn() { throw ArgumentError(\"deep\") }
        middle = fn() { inner() }
        try { middle() } catch (ArgumentError e) { e.message }";
    assert_eq!(run_inspect(source), "deep");
}

#[test]
fn stack_trace_is_captured_at_throw_time() {
    let source = "
        boom = fn() { throw Error(\"b\") }
        try { boom() } catch (e) { e.stack }";
    let trace = run_inspect(source);
    assert!(trace.contains("at boom"), "missing frame in trace: {trace:?}");
}

#[test]
fn error_carries_line_and_column() {
    let err = run_err("x = 1\nthrow Error(\"here\")");
    assert_eq!(err.line, 2);
}

#[test]
fn builtin_failures_are_catchable() {
    assert_eq!(run_inspect("try { pop([]) } catch (IndexError e) { e.message }"), "pop from empty array");
    assert_eq!(
        run_inspect("arr=[1,2,3]; try { arr[10] } catch (IndexError e) { e.type }"),
        "IndexError"
    );
    assert_eq!(
        run_inspect("try { 1 % 0 } catch (RuntimeError e) { e.message }"),
        "division by zero"
    );
}

#[test]
fn bare_errors_are_not_catchable() {
    // Unknown identifier is a static failure and must bypass catch.
    let err = run_err("try { missing_name } catch (e) { \"caught\" }");
    assert_eq!(err.message, "identifier not found: missing_name");
    // Arity mismatch likewise.
    let err = run_err("f = fn(a) { a }; try { f() } catch (e) { \"caught\" }");
    assert_eq!(err.message, "wrong number of arguments: want=1, got=0");
}

#[test]
fn catch_variable_shadows_outer_binding() {
    let source = "e = \"outer\"; try { throw Error(\"x\") } catch (e) { }; e";
    assert_eq!(run_inspect(source), "outer");
}

#[test]
fn error_constructors_build_error_values() {
    assert_eq!(run_inspect("type(TypeError(\"m\"))"), "ERROR");
    assert_eq!(run_inspect("TypeError(\"m\").message"), "m");
    assert_eq!(run_inspect("Error()"), "ERROR: ");
}
