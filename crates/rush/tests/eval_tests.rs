//! Core evaluator semantics: literals, operators, control flow, closures,
//! hashes, arrays, strings, builtins.

use pretty_assertions::assert_eq;
use rush::{Runner, SharedBufferPrint, Value};

fn run(source: &str) -> Value {
    Runner::new(source)
        .unwrap_or_else(|errors| panic!("syntax errors in {source:?}: {errors:?}"))
        .run()
        .unwrap_or_else(|err| panic!("runtime error in {source:?}: {err}"))
}

fn run_inspect(source: &str) -> String {
    run(source).inspect()
}

fn run_err(source: &str) -> rush::RushError {
    Runner::new(source)
        .unwrap_or_else(|errors| panic!("syntax errors in {source:?}: {errors:?}"))
        .run()
        .expect_err("expected a runtime error")
}

#[test]
fn integer_arithmetic() {
    assert_eq!(run_inspect("1 + 2 * 3"), "7");
    assert_eq!(run_inspect("(1 + 2) * 3"), "9");
    assert_eq!(run_inspect("7 % 3"), "1");
    assert_eq!(run_inspect("-5 + 10"), "5");
}

#[test]
fn integer_division_produces_float() {
    assert_eq!(run_inspect("5 / 2"), "2.5");
    assert_eq!(run_inspect("6 / 2"), "3");
    assert_eq!(run_inspect("type(6 / 2)"), "FLOAT");
}

#[test]
fn float_promotion() {
    assert_eq!(run_inspect("1 + 0.5"), "1.5");
    assert_eq!(run_inspect("2.5 * 2"), "5");
    assert_eq!(run_inspect("1 == 1.0"), "true");
}

#[test]
fn division_identity_for_positive_operands() {
    // a == floor(a/b)*b + a%b for a >= 0, b > 0
    for (a, b) in [(17, 5), (0, 3), (9, 9), (100, 7)] {
        let source = format!("{a} == floor({a}/{b})*{b} + {a}%{b}");
        assert_eq!(run_inspect(&source), "true", "identity failed for {a}/{b}");
    }
}

#[test]
fn truthiness() {
    assert_eq!(run_inspect("!0"), "false");
    assert_eq!(run_inspect("![]"), "false");
    assert_eq!(run_inspect("!{}"), "false");
    assert_eq!(run_inspect("!\"\""), "false");
    assert_eq!(run_inspect("!null"), "true");
    assert_eq!(run_inspect("!false"), "true");
    assert_eq!(run_inspect("if (0) { 1 } else { 2 }"), "1");
}

#[test]
fn logical_operators_short_circuit() {
    assert_eq!(run_inspect("true && false"), "false");
    assert_eq!(run_inspect("false || true"), "true");
    // The right side must not run when the left decides the result.
    assert_eq!(run_inspect("x = 1; bump = fn() { x = x + 1 }; false && bump(); x"), "1");
    assert_eq!(run_inspect("x = 1; bump = fn() { x = x + 1 }; true || bump(); x"), "1");
    assert_eq!(run_inspect("x = 1; bump = fn() { x = x + 1 }; true && bump(); x"), "2");
}

#[test]
fn comparisons() {
    assert_eq!(run_inspect("1 < 2"), "true");
    assert_eq!(run_inspect("2 <= 2"), "true");
    assert_eq!(run_inspect("3 > 2.5"), "true");
    assert_eq!(run_inspect("2 >= 3"), "false");
    assert_eq!(run_inspect("\"a\" == \"a\""), "true");
    assert_eq!(run_inspect("\"a\" != \"b\""), "true");
    assert_eq!(run_inspect("1 == \"1\""), "false");
}

#[test]
fn unknown_operator_is_bare_error() {
    let err = run_err("1 + \"x\"");
    assert_eq!(err.message, "unknown operator: INTEGER + STRING");
    let err = run_err("\"a\" - \"b\"");
    assert_eq!(err.message, "unknown operator: STRING - STRING");
}

#[test]
fn if_is_an_expression() {
    assert_eq!(run_inspect("x = if (true) { 10 } else { 20 }; x"), "10");
    assert_eq!(run_inspect("if (false) { 10 }"), "null");
    assert_eq!(run_inspect("if (false) { 1 } else if (true) { 2 } else { 3 }"), "2");
}

#[test]
fn while_loop_with_break_and_continue() {
    let source = "
        sum = 0
        i = 0
        while (true) {
            i = i + 1
            if (i > 10) { break }
            if (i % 2 == 0) { continue }
            sum = sum + i
        }
        sum";
    assert_eq!(run_inspect(source), "25");
}

#[test]
fn for_loop_sums() {
    assert_eq!(run_inspect("sum = 0; for (i=0; i<5; i=i+1) { sum = sum+i }; sum"), "10");
}

#[test]
fn for_loop_continue_still_updates() {
    let source = "sum = 0; for (i = 0; i < 5; i = i + 1) { if (i == 2) { continue } sum = sum + i }; sum";
    assert_eq!(run_inspect(source), "8");
}

#[test]
fn switch_first_match_wins() {
    assert_eq!(
        run_inspect("switch (\"B\") { case \"A\": 1; case \"B\",\"C\": 2; default: 3 }"),
        "2"
    );
    assert_eq!(run_inspect("switch (9) { case 1: 1 default: 42 }"), "42");
    assert_eq!(run_inspect("switch (9) { case 1: 1 }"), "null");
    // The discriminant is evaluated once.
    assert_eq!(
        run_inspect("n = 0; bump = fn() { n = n + 1; n }; switch (bump()) { case 1: \"one\" case 2: \"two\" }"),
        "one"
    );
}

#[test]
fn functions_and_returns() {
    assert_eq!(run_inspect("add = fn(a, b) { a + b }; add(2, 3)"), "5");
    assert_eq!(run_inspect("f = fn() { return 9; 10 }; f()"), "9");
    assert_eq!(run_inspect("f = fn() { }; f()"), "null");
    assert_eq!(
        run_inspect("fact = fn(n) { if (n < 2) { return 1 }; n * fact(n - 1) }; fact(5)"),
        "120"
    );
}

#[test]
fn arity_mismatch_is_bare_error() {
    let err = run_err("f = fn(a) { a }; f(1, 2)");
    assert_eq!(err.message, "wrong number of arguments: want=1, got=2");
}

#[test]
fn closures_capture_by_reference() {
    assert_eq!(
        run_inspect("make = fn(n){ fn(){ n = n+1; n } }; c = make(10); c(); c(); c()"),
        "13"
    );
    // Two closures over the same variable see each other's writes.
    let source = "
        n = 0
        inc = fn() { n = n + 1 }
        get = fn() { n }
        inc(); inc()
        get()";
    assert_eq!(run_inspect(source), "2");
}

#[test]
fn arrays_index_and_mutate() {
    assert_eq!(run_inspect("a = [1, 2, 3]; a[1]"), "2");
    assert_eq!(run_inspect("a = [1, 2, 3]; a[0] = 9; a"), "[9, 2, 3]");
    assert_eq!(run_inspect("[1, 2] == [1, 2]"), "true");
}

#[test]
fn array_builtins_are_functional() {
    assert_eq!(run_inspect("a = [1]; push(a, 2); a"), "[1]");
    assert_eq!(run_inspect("push([1], 2)"), "[1, 2]");
    assert_eq!(run_inspect("pop([1, 2])"), "[1]");
    assert_eq!(run_inspect("slice([1, 2, 3, 4], 1, 3)"), "[2, 3]");
    assert_eq!(run_inspect("slice([1, 2], 10, 20)"), "[]");
    assert_eq!(run_inspect("first([7, 8])"), "7");
    assert_eq!(run_inspect("last([7, 8])"), "8");
    assert_eq!(run_inspect("rest([7, 8, 9])"), "[8, 9]");
}

#[test]
fn array_methods() {
    assert_eq!(run_inspect("[3, 1, 2].sort()"), "[1, 2, 3]");
    assert_eq!(run_inspect("[1, 2, 3].reverse()"), "[3, 2, 1]");
    assert_eq!(run_inspect("[\"a\", \"b\"].join(\"-\")"), "a-b");
    assert_eq!(run_inspect("[1, 2].contains(2)"), "true");
    assert_eq!(run_inspect("[1, 2].index_of(5)"), "-1");
    assert_eq!(run_inspect("[1, 2].length()"), "2");
}

#[test]
fn hash_insertion_order_is_stable() {
    assert_eq!(run_inspect("h = {\"a\":1,\"b\":2}; h[\"a\"] = 3; keys(h)"), "[a, b]");
    assert_eq!(run_inspect("h = {\"b\":1,\"a\":2}; keys(h)"), "[b, a]");
    assert_eq!(run_inspect("h = {\"a\":1}; h[\"z\"] = 2; h[\"a\"] = 9; h"), "{a: 9, z: 2}");
}

#[test]
fn hash_builtins_and_methods() {
    assert_eq!(run_inspect("values({\"a\": 1, \"b\": 2})"), "[1, 2]");
    assert_eq!(run_inspect("has_key({\"a\": 1}, \"a\")"), "true");
    assert_eq!(run_inspect("h = {\"a\": 1}; delete(h, \"a\")"), "{}");
    assert_eq!(run_inspect("h = {\"a\": 1}; delete(h, \"a\"); h"), "{a: 1}");
    assert_eq!(run_inspect("merge({\"a\": 1}, {\"b\": 2})"), "{a: 1, b: 2}");
    assert_eq!(run_inspect("{\"a\": 1}.get(\"a\")"), "1");
    assert_eq!(run_inspect("{\"a\": 1}.get(\"z\")"), "null");
    assert_eq!(run_inspect("{\"a\": 1}.set(\"b\", 2)"), "{a: 1, b: 2}");
}

#[test]
fn hash_keys_canonicalize() {
    assert_eq!(run_inspect("h = {1: \"int\", 1.0: \"float\", true: \"bool\"}; h[1]"), "int");
    assert_eq!(run_inspect("h = {1: \"int\", 1.0: \"float\"}; h[1.0]"), "float");
}

#[test]
fn unhashable_key_is_catchable_type_error() {
    let source = "try { h = {[1]: 2} } catch (TypeError e) { e.message }";
    assert_eq!(run_inspect(source), "unusable as hash key: ARRAY");
}

#[test]
fn string_indexing_is_byte_oriented() {
    assert_eq!(run_inspect("\"hello\"[1]"), "e");
    assert_eq!(run_inspect("len(\"hello\")"), "5");
    let source = "try { \"abc\"[5] } catch (IndexError e) { e.type }";
    assert_eq!(run_inspect(source), "IndexError");
}

#[test]
fn string_methods() {
    assert_eq!(run_inspect("\"Hello\".upper()"), "HELLO");
    assert_eq!(run_inspect("\"Hello\".lower()"), "hello");
    assert_eq!(run_inspect("\"hello\".index_of(\"ll\")"), "2");
    assert_eq!(run_inspect("\"hello\".slice(1, 3)"), "el");
    assert_eq!(run_inspect("\"a,b\".split(\",\")"), "[a, b]");
    assert_eq!(run_inspect("\"  x \".trim()"), "x");
    assert_eq!(run_inspect("\"hello\".contains(\"ell\")"), "true");
    assert_eq!(run_inspect("\"42\".to_int() + 1"), "43");
}

#[test]
fn number_methods() {
    assert_eq!(run_inspect("(-3).abs()"), "3");
    assert_eq!(run_inspect("2.7.floor()"), "2");
    assert_eq!(run_inspect("2.2.ceil()"), "3");
    assert_eq!(run_inspect("2.5.round()"), "3");
    assert_eq!(run_inspect("3.to_string()"), "3");
    assert_eq!(run_inspect("9.sqrt()"), "3");
    assert_eq!(run_inspect("2.pow(10)"), "1024");
}

#[test]
fn type_builtin() {
    assert_eq!(run_inspect("type(1)"), "INTEGER");
    assert_eq!(run_inspect("type(1.5)"), "FLOAT");
    assert_eq!(run_inspect("type(\"s\")"), "STRING");
    assert_eq!(run_inspect("type(true)"), "BOOLEAN");
    assert_eq!(run_inspect("type([])"), "ARRAY");
    assert_eq!(run_inspect("type({})"), "HASH");
    assert_eq!(run_inspect("type(fn() {})"), "FUNCTION");
    assert_eq!(run_inspect("type(if (false) {})"), "NULL");
}

#[test]
fn identifier_not_found_is_bare_error() {
    let err = run_err("nope");
    assert_eq!(err.message, "identifier not found: nope");
}

#[test]
fn print_writes_through_the_sink() {
    let print = SharedBufferPrint::new();
    let buffer = print.handle();
    let runner = Runner::new("print(\"a\", 1, [2, 3])\nprint(\"next\")").unwrap();
    runner
        .run_with(Box::new(print), Box::new(rush::NoopTracer))
        .unwrap();
    assert_eq!(&*buffer.borrow(), "a 1 [2, 3]\nnext\n");
}

#[test]
fn recursion_depth_guard_is_catchable() {
    let runner = Runner::new("f = fn() { f() }; try { f() } catch (RuntimeError e) { e.message }").unwrap();
    let value = runner.with_max_call_depth(64).run().unwrap();
    assert_eq!(value.inspect(), "maximum call depth exceeded");
}

#[test]
fn comments_are_ignored() {
    assert_eq!(run_inspect("# leading comment\n1 + 1 // trailing\n"), "2");
}

#[test]
fn inspect_is_stable_across_runs() {
    let source = "{\"k\": [1, 2.5, \"s\", true, null]}";
    let a = run_inspect(source);
    let b = run_inspect(source);
    assert_eq!(a, b);
    assert_eq!(a, "{k: [1, 2.5, s, true, null]}");
}

#[test]
fn top_level_return_ends_the_program() {
    assert_eq!(run_inspect("return 5; 99"), "5");
}

#[test]
fn methods_are_first_class() {
    assert_eq!(run_inspect("m = [1, 2, 3].length; m()"), "3");
    let value = run("push");
    assert!(matches!(value, Value::Builtin(_)));
}
