//! Method table for INTEGER and FLOAT receivers.

use crate::{
    error::{RunError, RunResult},
    value::Value,
};

use super::expect_arity;

pub const METHODS: &[&str] = &["abs", "floor", "ceil", "round", "to_string", "sqrt", "pow"];

pub fn call(receiver: &Value, name: &str, args: &[Value]) -> RunResult<Value> {
    match name {
        "abs" => {
            expect_arity(args, 0)?;
            abs(receiver)
        }
        "floor" => {
            expect_arity(args, 0)?;
            floor(receiver)
        }
        "ceil" => {
            expect_arity(args, 0)?;
            ceil(receiver)
        }
        "round" => {
            expect_arity(args, 0)?;
            round(receiver)
        }
        "to_string" => {
            expect_arity(args, 0)?;
            Ok(Value::string(receiver.inspect()))
        }
        "sqrt" => {
            expect_arity(args, 0)?;
            let x = as_f64(receiver)?;
            if x < 0.0 {
                return Err(RunError::argument_error(format!(
                    "cannot take square root of negative number: {}",
                    receiver.inspect()
                )));
            }
            Ok(Value::Float(x.sqrt()))
        }
        "pow" => {
            expect_arity(args, 1)?;
            // Integer base and non-negative integer exponent stay integral,
            // computed exactly by integer multiplication; everything else
            // promotes to float.
            match (receiver, &args[0]) {
                (Value::Integer(base), Value::Integer(exponent)) if *exponent >= 0 => {
                    Ok(Value::Integer(integer_pow(*base, *exponent)))
                }
                _ => {
                    let base = as_f64(receiver)?;
                    let exponent = as_f64(&args[0])?;
                    Ok(Value::Float(base.powf(exponent)))
                }
            }
        }
        other => Err(RunError::fatal(format!(
            "undefined method {other} for {}",
            receiver.type_name()
        ))),
    }
}

fn as_f64(value: &Value) -> RunResult<f64> {
    match value {
        Value::Integer(n) => Ok(*n as f64),
        Value::Float(f) => Ok(*f),
        other => Err(RunError::type_error(format!(
            "expected INTEGER or FLOAT, got {}",
            other.type_name()
        ))),
    }
}

pub fn abs(value: &Value) -> RunResult<Value> {
    match value {
        Value::Integer(n) => Ok(Value::Integer(n.saturating_abs())),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(not_a_number("abs", other)),
    }
}

pub fn floor(value: &Value) -> RunResult<Value> {
    match value {
        Value::Integer(n) => Ok(Value::Integer(*n)),
        Value::Float(f) => Ok(Value::Integer(f.floor() as i64)),
        other => Err(not_a_number("floor", other)),
    }
}

pub fn ceil(value: &Value) -> RunResult<Value> {
    match value {
        Value::Integer(n) => Ok(Value::Integer(*n)),
        Value::Float(f) => Ok(Value::Integer(f.ceil() as i64)),
        other => Err(not_a_number("ceil", other)),
    }
}

pub fn round(value: &Value) -> RunResult<Value> {
    match value {
        Value::Integer(n) => Ok(Value::Integer(*n)),
        Value::Float(f) => Ok(Value::Integer(f.round() as i64)),
        other => Err(not_a_number("round", other)),
    }
}

fn not_a_number(name: &str, value: &Value) -> RunError {
    RunError::type_error(format!("argument to {name} not supported, got {}", value.type_name()))
}

/// Exponentiation by squaring with wrapping multiplication, matching the
/// wrapping semantics of the infix arithmetic operators.
fn integer_pow(base: i64, exponent: i64) -> i64 {
    let mut result: i64 = 1;
    let mut base = base;
    let mut exponent = exponent;
    while exponent > 0 {
        if exponent & 1 == 1 {
            result = result.wrapping_mul(base);
        }
        base = base.wrapping_mul(base);
        exponent >>= 1;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_family() {
        assert_eq!(floor(&Value::Float(2.7)).unwrap().inspect(), "2");
        assert_eq!(floor(&Value::Float(-2.1)).unwrap().inspect(), "-3");
        assert_eq!(ceil(&Value::Float(2.1)).unwrap().inspect(), "3");
        assert_eq!(round(&Value::Float(2.5)).unwrap().inspect(), "3");
        assert_eq!(floor(&Value::Integer(4)).unwrap().inspect(), "4");
    }

    #[test]
    fn pow_keeps_integers_integral() {
        let squared = call(&Value::Integer(3), "pow", &[Value::Integer(2)]).unwrap();
        assert_eq!(squared.inspect(), "9");
        let root = call(&Value::Integer(2), "pow", &[Value::Float(0.5)]).unwrap();
        assert!(matches!(root, Value::Float(_)));
    }

    #[test]
    fn pow_is_exact_beyond_float_precision() {
        // 3^34 does not round-trip through f64.
        let big = call(&Value::Integer(3), "pow", &[Value::Integer(34)]).unwrap();
        assert_eq!(big.inspect(), "16677181699666569");
        let zero = call(&Value::Integer(5), "pow", &[Value::Integer(0)]).unwrap();
        assert_eq!(zero.inspect(), "1");
    }
}
