//! Syntax-error surface: the parser accumulates errors instead of
//! panicking, and positions point at the offending token.

use rush::parser;

fn errors_of(source: &str) -> Vec<rush::SyntaxError> {
    let (_, errors) = parser::parse(source);
    errors
}

#[test]
fn unknown_prefix_token() {
    let errors = errors_of("x = * 2");
    assert!(errors.iter().any(|e| e.message == "no prefix parse function for *"));
}

#[test]
fn illegal_byte_surfaces_as_syntax_error() {
    let errors = errors_of("a $ b");
    assert!(!errors.is_empty());
}

#[test]
fn multiple_errors_accumulate() {
    let errors = errors_of("x = * 2\ny = ^ 3");
    assert!(errors.len() >= 2, "expected at least two errors, got {errors:?}");
}

#[test]
fn error_positions_are_one_based() {
    let errors = errors_of("y = 1\nx = * 2");
    let first = &errors[0];
    assert_eq!(first.line, 2);
    assert_eq!(first.column, 5);
}

#[test]
fn missing_closing_brace() {
    let errors = errors_of("if (true) { 1 ");
    assert!(errors.iter().any(|e| e.message.contains("expected } to close block")));
}

#[test]
fn invalid_assignment_target() {
    let errors = errors_of("a.b = 1");
    assert!(errors.iter().any(|e| e.message.contains("invalid assignment target")));
}

#[test]
fn try_without_catch_or_finally() {
    let errors = errors_of("try { 1 }");
    assert!(errors.iter().any(|e| e.message.contains("requires at least one catch or finally")));
}

#[test]
fn integer_overflow_is_reported() {
    let errors = errors_of("99999999999999999999999999");
    assert!(errors.iter().any(|e| e.message.contains("could not parse")));
}

#[test]
fn keywords_cannot_be_identifiers() {
    let errors = errors_of("class = 5");
    assert!(!errors.is_empty());
}

#[test]
fn parse_never_panics_on_garbage() {
    for source in ["{{{{", "((((", "fn(", "class {", "switch", "import {", "@", "a.b.c(", "1 +"] {
        let _ = parser::parse(source);
    }
}
