//! Persistent REPL session behavior.

use std::rc::Rc;

use pretty_assertions::assert_eq;
use rush::{CollectStringPrint, ReplSession, StaticResolver};

fn session() -> ReplSession {
    ReplSession::with_parts(Box::new(CollectStringPrint::new()), Rc::new(StaticResolver::new()), Some(1))
}

#[test]
fn state_persists_across_lines() {
    let mut repl = session();
    assert_eq!(repl.eval("x = 5"), "null");
    assert_eq!(repl.eval("x + 1"), "6");
    assert_eq!(repl.eval("double = fn(n) { n * 2 }"), "null");
    assert_eq!(repl.eval("double(x)"), "10");
}

#[test]
fn classes_persist() {
    let mut repl = session();
    repl.eval("class Point { fn initialize(x, y) { @x = x; @y = y } fn sum() { @x + @y } }");
    assert_eq!(repl.eval("Point.new(2, 3).sum()"), "5");
}

#[test]
fn errors_render_with_prefix() {
    let mut repl = session();
    assert_eq!(repl.eval("nope"), "ERROR: identifier not found: nope");
    assert_eq!(repl.eval("throw ValidationError(\"x\")"), "ERROR: x");
}

#[test]
fn an_error_does_not_poison_the_session() {
    let mut repl = session();
    repl.eval("x = 1");
    repl.eval("boom");
    assert_eq!(repl.eval("x"), "1");
}

#[test]
fn inspect_rendering() {
    let mut repl = session();
    assert_eq!(repl.eval("{\"a\": [1, 2.5]}"), "{a: [1, 2.5]}");
    assert_eq!(repl.eval("\"text\""), "text");
    assert_eq!(repl.eval("true"), "true");
    assert_eq!(repl.eval("if (false) { 1 }"), "null");
}

#[test]
fn syntax_errors_are_reported_inline() {
    let mut repl = session();
    let out = repl.eval("x = * 2");
    assert!(out.starts_with("ERROR: "), "unexpected output: {out}");
}

#[test]
fn modules_are_importable_from_the_repl() {
    let resolver = StaticResolver::new().with_module("m", "export one = 1\n");
    let mut repl = ReplSession::with_parts(Box::new(CollectStringPrint::new()), Rc::new(resolver), None);
    repl.eval("import { one } from \"m\"");
    assert_eq!(repl.eval("one + 1"), "2");
}
