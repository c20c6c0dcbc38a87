//! Method table for STRING receivers. Strings are immutable; indexing and
//! slicing are byte-oriented, matching the language's string model.

use crate::{
    error::{RunError, RunResult},
    value::Value,
};

use super::expect_arity;

pub const METHODS: &[&str] = &[
    "length",
    "upper",
    "lower",
    "index_of",
    "slice",
    "split",
    "trim",
    "contains",
    "starts_with",
    "ends_with",
    "reverse",
    "to_int",
    "to_float",
];

pub fn call(s: &str, name: &str, args: &[Value]) -> RunResult<Value> {
    match name {
        "length" => {
            expect_arity(args, 0)?;
            Ok(Value::Integer(s.len() as i64))
        }
        "upper" => {
            expect_arity(args, 0)?;
            Ok(Value::string(s.to_uppercase()))
        }
        "lower" => {
            expect_arity(args, 0)?;
            Ok(Value::string(s.to_lowercase()))
        }
        "index_of" => {
            expect_arity(args, 1)?;
            let needle = str_arg(args, 0)?;
            Ok(Value::Integer(s.find(needle).map_or(-1, |i| i as i64)))
        }
        "slice" => {
            expect_arity(args, 2)?;
            let (start, end) = match (&args[0], &args[1]) {
                (Value::Integer(start), Value::Integer(end)) => (*start, *end),
                _ => return Err(RunError::type_error("slice bounds must be INTEGER")),
            };
            Ok(slice(s, start, end))
        }
        "split" => {
            expect_arity(args, 1)?;
            let separator = str_arg(args, 0)?;
            let parts: Vec<Value> = if separator.is_empty() {
                // Splitting on "" yields one single-byte string per byte.
                s.as_bytes()
                    .iter()
                    .map(|b| Value::string(String::from_utf8_lossy(&[*b])))
                    .collect()
            } else {
                s.split(separator).map(Value::string).collect()
            };
            Ok(Value::array(parts))
        }
        "trim" => {
            expect_arity(args, 0)?;
            Ok(Value::string(s.trim()))
        }
        "contains" => {
            expect_arity(args, 1)?;
            Ok(Value::Boolean(s.contains(str_arg(args, 0)?)))
        }
        "starts_with" => {
            expect_arity(args, 1)?;
            Ok(Value::Boolean(s.starts_with(str_arg(args, 0)?)))
        }
        "ends_with" => {
            expect_arity(args, 1)?;
            Ok(Value::Boolean(s.ends_with(str_arg(args, 0)?)))
        }
        "reverse" => {
            expect_arity(args, 0)?;
            let mut bytes = s.as_bytes().to_vec();
            bytes.reverse();
            Ok(Value::string(String::from_utf8_lossy(&bytes)))
        }
        "to_int" => {
            expect_arity(args, 0)?;
            s.trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| RunError::validation_error(format!("cannot convert to INTEGER: {s}")))
        }
        "to_float" => {
            expect_arity(args, 0)?;
            s.trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| RunError::validation_error(format!("cannot convert to FLOAT: {s}")))
        }
        other => Err(RunError::fatal(format!("undefined method {other} for STRING"))),
    }
}

fn str_arg<'a>(args: &'a [Value], index: usize) -> RunResult<&'a str> {
    match &args[index] {
        Value::Str(s) => Ok(s),
        other => Err(RunError::type_error(format!(
            "argument must be STRING, got {}",
            other.type_name()
        ))),
    }
}

/// Byte-oriented slice with clamping bounds; out-of-range starts yield "".
#[must_use]
pub fn slice(s: &str, start: i64, end: i64) -> Value {
    let len = s.len() as i64;
    let start = start.clamp(0, len);
    let end = end.clamp(start, len);
    Value::string(String::from_utf8_lossy(&s.as_bytes()[start as usize..end as usize]))
}

/// Byte-oriented indexing: a single-character string, or an IndexError when
/// out of range.
pub fn index(s: &str, index: i64) -> RunResult<Value> {
    if index < 0 || index >= s.len() as i64 {
        return Err(RunError::index_error(format!("index out of range: {index}")));
    }
    let byte = s.as_bytes()[index as usize];
    Ok(Value::string(String::from_utf8_lossy(&[byte])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_oriented_indexing() {
        assert_eq!(index("abc", 1).unwrap().inspect(), "b");
        assert!(index("abc", 3).is_err());
        assert!(index("abc", -1).is_err());
    }

    #[test]
    fn slice_clamps() {
        assert_eq!(slice("hello", 1, 3).inspect(), "el");
        assert_eq!(slice("hello", 10, 20).inspect(), "");
        assert_eq!(slice("hello", -2, 2).inspect(), "he");
    }

    #[test]
    fn split_and_join_shapes() {
        let parts = call("a,b,c", "split", &[Value::string(",")]).unwrap();
        assert_eq!(parts.inspect(), "[a, b, c]");
        let chars = call("ab", "split", &[Value::string("")]).unwrap();
        assert_eq!(chars.inspect(), "[a, b]");
    }

    #[test]
    fn conversions() {
        assert_eq!(call(" 42 ", "to_int", &[]).unwrap().inspect(), "42");
        assert!(call("x", "to_int", &[]).is_err());
        assert_eq!(call("2.5", "to_float", &[]).unwrap().inspect(), "2.5");
    }
}
