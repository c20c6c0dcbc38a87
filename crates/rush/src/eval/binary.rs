//! Infix/prefix operator resolution, shared by the evaluator and the VM.
//!
//! Specialization is selected by operand tags: int-int stays int except `/`
//! which produces a float; a float operand promotes the other side;
//! string-string supports `+`, `==`, `!=`; equality never errors and follows
//! structural semantics with numeric promotion. Every other combination is
//! the bare error `unknown operator: L OP R`.

use crate::{
    ast::{InfixOp, PrefixOp},
    error::{RunError, RunResult},
    value::Value,
};

pub fn eval_prefix(op: PrefixOp, value: &Value) -> RunResult<Value> {
    match op {
        PrefixOp::Bang => Ok(Value::Boolean(!value.is_truthy())),
        PrefixOp::Minus => match value {
            Value::Integer(n) => Ok(Value::Integer(n.wrapping_neg())),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(RunError::fatal(format!("unknown operator: -{}", other.type_name()))),
        },
    }
}

pub fn eval_infix(op: InfixOp, left: &Value, right: &Value) -> RunResult<Value> {
    // Equality is defined for every tag pairing and never errors.
    match op {
        InfixOp::Eq => return Ok(Value::Boolean(left.value_eq(right))),
        InfixOp::NotEq => return Ok(Value::Boolean(!left.value_eq(right))),
        _ => {}
    }

    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => integer_infix(op, *a, *b),
        (Value::Float(a), Value::Float(b)) => float_infix(op, *a, *b),
        (Value::Integer(a), Value::Float(b)) => float_infix(op, *a as f64, *b),
        (Value::Float(a), Value::Integer(b)) => float_infix(op, *a, *b as f64),
        (Value::Str(a), Value::Str(b)) if op == InfixOp::Plus => {
            let mut out = String::with_capacity(a.len() + b.len());
            out.push_str(a);
            out.push_str(b);
            Ok(Value::string(out))
        }
        _ => Err(unknown_operator(op, left, right)),
    }
}

fn integer_infix(op: InfixOp, a: i64, b: i64) -> RunResult<Value> {
    match op {
        InfixOp::Plus => Ok(Value::Integer(a.wrapping_add(b))),
        InfixOp::Minus => Ok(Value::Integer(a.wrapping_sub(b))),
        InfixOp::Asterisk => Ok(Value::Integer(a.wrapping_mul(b))),
        // Integer division always produces a float.
        InfixOp::Slash => {
            if b == 0 {
                return Err(RunError::runtime_error("division by zero"));
            }
            Ok(Value::Float(a as f64 / b as f64))
        }
        InfixOp::Percent => {
            if b == 0 {
                return Err(RunError::runtime_error("division by zero"));
            }
            Ok(Value::Integer(a.wrapping_rem(b)))
        }
        InfixOp::Lt => Ok(Value::Boolean(a < b)),
        InfixOp::LtEq => Ok(Value::Boolean(a <= b)),
        InfixOp::Gt => Ok(Value::Boolean(a > b)),
        InfixOp::GtEq => Ok(Value::Boolean(a >= b)),
        _ => Err(unknown_operator(op, &Value::Integer(a), &Value::Integer(b))),
    }
}

fn float_infix(op: InfixOp, a: f64, b: f64) -> RunResult<Value> {
    match op {
        InfixOp::Plus => Ok(Value::Float(a + b)),
        InfixOp::Minus => Ok(Value::Float(a - b)),
        InfixOp::Asterisk => Ok(Value::Float(a * b)),
        InfixOp::Slash => {
            if b == 0.0 {
                return Err(RunError::runtime_error("division by zero"));
            }
            Ok(Value::Float(a / b))
        }
        InfixOp::Percent => Ok(Value::Float(a % b)),
        InfixOp::Lt => Ok(Value::Boolean(a < b)),
        InfixOp::LtEq => Ok(Value::Boolean(a <= b)),
        InfixOp::Gt => Ok(Value::Boolean(a > b)),
        InfixOp::GtEq => Ok(Value::Boolean(a >= b)),
        _ => Err(unknown_operator(op, &Value::Float(a), &Value::Float(b))),
    }
}

fn unknown_operator(op: InfixOp, left: &Value, right: &Value) -> RunError {
    RunError::fatal(format!(
        "unknown operator: {} {op} {}",
        left.type_name(),
        right.type_name()
    ))
}
