//! Method table for ARRAY receivers.
//!
//! Arrays mutate only through index assignment; every method here returns a
//! new array (or a scalar) and leaves the receiver untouched.

use crate::{
    error::{RunError, RunResult},
    value::{ArrayRef, Value},
};

use super::expect_arity;

pub const METHODS: &[&str] = &[
    "length", "push", "pop", "slice", "first", "last", "rest", "reverse", "join", "contains", "index_of", "sort",
];

pub fn call(values: &ArrayRef, name: &str, args: &[Value]) -> RunResult<Value> {
    match name {
        "length" => {
            expect_arity(args, 0)?;
            Ok(Value::Integer(values.borrow().len() as i64))
        }
        "push" => {
            expect_arity(args, 1)?;
            push(values, &args[0])
        }
        "pop" => {
            expect_arity(args, 0)?;
            pop(values)
        }
        "slice" => {
            expect_arity(args, 2)?;
            let (start, end) = match (&args[0], &args[1]) {
                (Value::Integer(start), Value::Integer(end)) => (*start, *end),
                _ => return Err(RunError::type_error("slice bounds must be INTEGER")),
            };
            Ok(slice(&values.borrow(), start, end))
        }
        "first" => {
            expect_arity(args, 0)?;
            first(values)
        }
        "last" => {
            expect_arity(args, 0)?;
            last(values)
        }
        "rest" => {
            expect_arity(args, 0)?;
            rest(values)
        }
        "reverse" => {
            expect_arity(args, 0)?;
            let mut out: Vec<Value> = values.borrow().clone();
            out.reverse();
            Ok(Value::array(out))
        }
        "join" => {
            expect_arity(args, 1)?;
            let Value::Str(separator) = &args[0] else {
                return Err(RunError::type_error("join separator must be STRING"));
            };
            let parts: Vec<String> = values.borrow().iter().map(Value::inspect).collect();
            Ok(Value::string(parts.join(separator)))
        }
        "contains" => {
            expect_arity(args, 1)?;
            Ok(Value::Boolean(values.borrow().iter().any(|v| v.value_eq(&args[0]))))
        }
        "index_of" => {
            expect_arity(args, 1)?;
            let index = values.borrow().iter().position(|v| v.value_eq(&args[0]));
            Ok(Value::Integer(index.map_or(-1, |i| i as i64)))
        }
        "sort" => {
            expect_arity(args, 0)?;
            sort(&values.borrow())
        }
        other => Err(RunError::fatal(format!("undefined method {other} for ARRAY"))),
    }
}

pub fn push(values: &ArrayRef, value: &Value) -> RunResult<Value> {
    let mut out = values.borrow().clone();
    out.push(value.clone());
    Ok(Value::array(out))
}

/// Returns a new array without the last element; popping an empty array is a
/// catchable IndexError.
pub fn pop(values: &ArrayRef) -> RunResult<Value> {
    let mut out = values.borrow().clone();
    if out.pop().is_none() {
        return Err(RunError::index_error("pop from empty array"));
    }
    Ok(Value::array(out))
}

pub fn first(values: &ArrayRef) -> RunResult<Value> {
    Ok(values.borrow().first().cloned().unwrap_or(Value::Null))
}

pub fn last(values: &ArrayRef) -> RunResult<Value> {
    Ok(values.borrow().last().cloned().unwrap_or(Value::Null))
}

pub fn rest(values: &ArrayRef) -> RunResult<Value> {
    let borrowed = values.borrow();
    if borrowed.is_empty() {
        return Ok(Value::array(vec![]));
    }
    Ok(Value::array(borrowed[1..].to_vec()))
}

/// Out-of-range bounds clamp instead of throwing; a start past the end (or
/// past the clamped end) yields an empty array.
#[must_use]
pub fn slice(values: &[Value], start: i64, end: i64) -> Value {
    let len = values.len() as i64;
    let start = start.clamp(0, len);
    let end = end.clamp(start, len);
    Value::array(values[start as usize..end as usize].to_vec())
}

/// Sorts a homogeneous array of integers, floats or strings into a new
/// array. Mixed or unsupported element types are a TypeError.
fn sort(values: &[Value]) -> RunResult<Value> {
    #[derive(PartialEq)]
    enum Kind {
        Number,
        Str,
    }

    let mut kind = None;
    for value in values {
        let this = match value {
            Value::Integer(_) | Value::Float(_) => Kind::Number,
            Value::Str(_) => Kind::Str,
            other => {
                return Err(RunError::type_error(format!(
                    "cannot sort array containing {}",
                    other.type_name()
                )));
            }
        };
        match &kind {
            None => kind = Some(this),
            Some(seen) if *seen != this => {
                return Err(RunError::type_error("cannot sort array of mixed types"));
            }
            Some(_) => {}
        }
    }

    let mut out = values.to_vec();
    match kind {
        Some(Kind::Number) => out.sort_by(|a, b| {
            let a = numeric(a);
            let b = numeric(b);
            a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
        }),
        Some(Kind::Str) => out.sort_by(|a, b| match (a, b) {
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }),
        None => {}
    }
    Ok(Value::array(out))
}

fn numeric(value: &Value) -> f64 {
    match value {
        Value::Integer(n) => *n as f64,
        Value::Float(f) => *f,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arr(values: Vec<Value>) -> ArrayRef {
        match Value::array(values) {
            Value::Array(r) => r,
            _ => unreachable!(),
        }
    }

    #[test]
    fn push_and_pop_return_new_arrays() {
        let a = arr(vec![Value::Integer(1)]);
        let pushed = push(&a, &Value::Integer(2)).unwrap();
        assert_eq!(pushed.inspect(), "[1, 2]");
        assert_eq!(a.borrow().len(), 1);
        let popped = pop(&a).unwrap();
        assert_eq!(popped.inspect(), "[]");
        assert_eq!(a.borrow().len(), 1);
    }

    #[test]
    fn pop_empty_throws_index_error() {
        let a = arr(vec![]);
        match pop(&a).unwrap_err() {
            RunError::Exc(e) => assert_eq!(e.message, "pop from empty array"),
            other => panic!("expected exception, got {other:?}"),
        }
    }

    #[test]
    fn slice_clamps_out_of_range() {
        let values = vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)];
        assert_eq!(slice(&values, 1, 3).inspect(), "[2, 3]");
        assert_eq!(slice(&values, 10, 20).inspect(), "[]");
        assert_eq!(slice(&values, -5, 2).inspect(), "[1, 2]");
        assert_eq!(slice(&values, 2, 1).inspect(), "[]");
    }

    #[test]
    fn sort_homogeneous_only() {
        let a = arr(vec![Value::Integer(3), Value::Integer(1), Value::Integer(2)]);
        assert_eq!(call(&a, "sort", &[]).unwrap().inspect(), "[1, 2, 3]");
        let mixed = arr(vec![Value::Integer(1), Value::string("a")]);
        assert!(call(&mixed, "sort", &[]).is_err());
    }
}
