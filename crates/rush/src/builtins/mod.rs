//! Builtin functions and method-on-receiver dispatch.
//!
//! [`Builtin`] is the compile-time registry: the enum discriminant order *is*
//! the id space used by the bytecode `GetBuiltin` opcode, and the strum
//! `EnumString` derive makes the snake_case variant name the single source of
//! truth for name lookup in the evaluator, the compiler's symbol table and
//! the VM.

pub mod array_methods;
pub mod hash_methods;
pub mod number_methods;
pub mod string_methods;

use std::rc::Rc;

use rand::Rng as _;
use rand_chacha::ChaCha8Rng;
use strum::{Display, EnumIter, EnumString, FromRepr};

use crate::{
    error::{RunError, RunResult},
    io::PrintWriter,
    modules::{self, FileValue},
    value::Value,
};

/// Host facilities builtins may need: the process RNG and the print sink.
pub struct BuiltinCtx<'a> {
    pub rng: &'a mut ChaCha8Rng,
    pub print: &'a mut dyn PrintWriter,
}

/// Every named builtin function, in id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, FromRepr)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum Builtin {
    Len,
    Print,
    Type,
    Push,
    Pop,
    First,
    Last,
    Rest,
    Slice,
    Keys,
    Values,
    HasKey,
    Delete,
    Merge,
    Abs,
    Floor,
    Ceil,
    Round,
    ToString,
    Random,
    RandomInt,
    File,
    Directory,
    Path,
}

impl Builtin {
    /// Id used by the bytecode `GetBuiltin` opcode.
    #[must_use]
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Calls the builtin. Argument counts are checked here; type mismatches
    /// surface as catchable `TypeError`s, "normal" failures (pop on empty,
    /// unhashable key) as their specific catchable kinds.
    pub fn call(self, args: &[Value], ctx: &mut BuiltinCtx<'_>) -> RunResult<Value> {
        match self {
            Self::Len => {
                expect_arity(args, 1)?;
                builtin_len(&args[0])
            }
            Self::Print => {
                for (i, value) in args.iter().enumerate() {
                    if i > 0 {
                        ctx.print.push_char(' ')?;
                    }
                    ctx.print.write(&value.inspect())?;
                }
                ctx.print.push_char('\n')?;
                Ok(Value::Null)
            }
            Self::Type => {
                expect_arity(args, 1)?;
                Ok(Value::string(args[0].type_name()))
            }
            Self::Push => {
                expect_arity(args, 2)?;
                let array = array_arg(self, args, 0)?;
                array_methods::push(&array, &args[1])
            }
            Self::Pop => {
                expect_arity(args, 1)?;
                let array = array_arg(self, args, 0)?;
                array_methods::pop(&array)
            }
            Self::First => {
                expect_arity(args, 1)?;
                let array = array_arg(self, args, 0)?;
                array_methods::first(&array)
            }
            Self::Last => {
                expect_arity(args, 1)?;
                let array = array_arg(self, args, 0)?;
                array_methods::last(&array)
            }
            Self::Rest => {
                expect_arity(args, 1)?;
                let array = array_arg(self, args, 0)?;
                array_methods::rest(&array)
            }
            Self::Slice => {
                expect_arity(args, 3)?;
                let start = int_arg(self, args, 1)?;
                let end = int_arg(self, args, 2)?;
                match &args[0] {
                    Value::Array(values) => Ok(array_methods::slice(&values.borrow(), start, end)),
                    Value::Str(s) => Ok(string_methods::slice(s, start, end)),
                    other => Err(unsupported(self, other)),
                }
            }
            Self::Keys => {
                expect_arity(args, 1)?;
                let hash = hash_arg(self, args, 0)?;
                Ok(hash_methods::keys(&hash.borrow()))
            }
            Self::Values => {
                expect_arity(args, 1)?;
                let hash = hash_arg(self, args, 0)?;
                Ok(hash_methods::values(&hash.borrow()))
            }
            Self::HasKey => {
                expect_arity(args, 2)?;
                let hash = hash_arg(self, args, 0)?;
                hash_methods::has_key(&hash.borrow(), &args[1])
            }
            Self::Delete => {
                expect_arity(args, 2)?;
                let hash = hash_arg(self, args, 0)?;
                hash_methods::delete(&hash.borrow(), &args[1])
            }
            Self::Merge => {
                expect_arity(args, 2)?;
                let left = hash_arg(self, args, 0)?;
                let right = hash_arg(self, args, 1)?;
                Ok(hash_methods::merge(&left.borrow(), &right.borrow()))
            }
            Self::Abs => {
                expect_arity(args, 1)?;
                number_methods::abs(&args[0])
            }
            Self::Floor => {
                expect_arity(args, 1)?;
                number_methods::floor(&args[0])
            }
            Self::Ceil => {
                expect_arity(args, 1)?;
                number_methods::ceil(&args[0])
            }
            Self::Round => {
                expect_arity(args, 1)?;
                number_methods::round(&args[0])
            }
            Self::ToString => {
                expect_arity(args, 1)?;
                Ok(Value::string(args[0].inspect()))
            }
            Self::Random => {
                expect_arity(args, 0)?;
                Ok(Value::Float(ctx.rng.r#gen::<f64>()))
            }
            Self::RandomInt => {
                expect_arity(args, 1)?;
                let max = int_arg(self, args, 0)?;
                if max <= 0 {
                    return Err(RunError::argument_error(format!(
                        "random_int max must be positive, got {max}"
                    )));
                }
                Ok(Value::Integer(ctx.rng.gen_range(0..max)))
            }
            Self::File => {
                expect_arity(args, 1)?;
                let path = str_arg(self, args, 0)?;
                modules::fs_mod::check_path(&path)?;
                Ok(Value::File(Rc::new(FileValue::new(&*path))))
            }
            Self::Directory => {
                expect_arity(args, 1)?;
                let path = str_arg(self, args, 0)?;
                modules::fs_mod::check_path(&path)?;
                Ok(Value::Directory(path))
            }
            Self::Path => {
                expect_arity(args, 1)?;
                let path = str_arg(self, args, 0)?;
                modules::fs_mod::check_path(&path)?;
                Ok(Value::Path(path))
            }
        }
    }
}

fn builtin_len(value: &Value) -> RunResult<Value> {
    match value {
        Value::Str(s) => Ok(Value::Integer(s.len() as i64)),
        Value::Array(values) => Ok(Value::Integer(values.borrow().len() as i64)),
        Value::Hash(map) => Ok(Value::Integer(map.borrow().len() as i64)),
        other => Err(RunError::type_error(format!(
            "argument to len not supported, got {}",
            other.type_name()
        ))),
    }
}

// ----- shared argument helpers -----

pub(crate) fn expect_arity(args: &[Value], want: usize) -> RunResult<()> {
    if args.len() == want {
        Ok(())
    } else {
        Err(RunError::wrong_arity(want, args.len()))
    }
}

fn unsupported(builtin: Builtin, value: &Value) -> RunError {
    RunError::type_error(format!(
        "argument to {builtin} not supported, got {}",
        value.type_name()
    ))
}

fn array_arg(builtin: Builtin, args: &[Value], index: usize) -> RunResult<crate::value::ArrayRef> {
    match &args[index] {
        Value::Array(values) => Ok(Rc::clone(values)),
        other => Err(unsupported(builtin, other)),
    }
}

fn hash_arg(builtin: Builtin, args: &[Value], index: usize) -> RunResult<crate::value::HashRef> {
    match &args[index] {
        Value::Hash(map) => Ok(Rc::clone(map)),
        other => Err(unsupported(builtin, other)),
    }
}

fn int_arg(builtin: Builtin, args: &[Value], index: usize) -> RunResult<i64> {
    match &args[index] {
        Value::Integer(n) => Ok(*n),
        other => Err(unsupported(builtin, other)),
    }
}

fn str_arg(builtin: Builtin, args: &[Value], index: usize) -> RunResult<Rc<str>> {
    match &args[index] {
        Value::Str(s) => Ok(Rc::clone(s)),
        other => Err(unsupported(builtin, other)),
    }
}

// ----- method-on-receiver dispatch -----

/// Whether `receiver.name` resolves to a typed builtin method.
#[must_use]
pub fn has_method(receiver: &Value, name: &str) -> bool {
    match receiver {
        Value::Str(_) => string_methods::METHODS.contains(&name),
        Value::Array(_) => array_methods::METHODS.contains(&name),
        Value::Hash(_) => hash_methods::METHODS.contains(&name),
        Value::Integer(_) | Value::Float(_) => number_methods::METHODS.contains(&name),
        Value::Error(_) => matches!(name, "type" | "message" | "stack" | "line" | "column"),
        _ => modules::has_domain_method(receiver, name),
    }
}

/// Calls `receiver.name(args)` through the per-tag method tables.
pub fn call_method(receiver: &Value, name: &str, args: &[Value]) -> RunResult<Value> {
    match receiver {
        Value::Str(s) => string_methods::call(s, name, args),
        Value::Array(values) => array_methods::call(values, name, args),
        Value::Hash(map) => hash_methods::call(map, name, args),
        Value::Integer(_) | Value::Float(_) => number_methods::call(receiver, name, args),
        Value::Error(err) => {
            expect_arity(args, 0)?;
            error_property(err, name)
        }
        _ => modules::call_domain_method(receiver, name, args),
    }
}

/// Receiver dispatch for `expr.name`, shared by the evaluator and the VM:
/// user class method, then the typed builtin method table, then field access
/// (hashes), then the undefined-method error.
pub fn resolve_property(receiver: Value, name: &str) -> RunResult<Value> {
    use crate::value::{BoundMethod, BuiltinMethod, Class, HashKey};

    match &receiver {
        Value::Object(object) => {
            if let Some((defining_class, method)) = Class::resolve_method(&object.class, name) {
                return Ok(Value::BoundMethod(Rc::new(BoundMethod {
                    receiver: Rc::clone(object),
                    defining_class,
                    name: name.to_string(),
                    method,
                })));
            }
            Err(RunError::fatal(format!(
                "undefined method {name} for {}",
                object.class.name
            )))
        }
        Value::Class(_) if name == "new" => Ok(Value::BuiltinMethod(Rc::new(BuiltinMethod {
            receiver,
            name: name.to_string(),
        }))),
        Value::Namespace(ns) => {
            if ns.has_method(name) {
                Ok(Value::BuiltinMethod(Rc::new(BuiltinMethod {
                    receiver,
                    name: name.to_string(),
                })))
            } else {
                Err(RunError::fatal(format!("undefined method {name} for {ns}")))
            }
        }
        Value::Error(err) => error_property(err, name),
        Value::Hash(map) => {
            if has_method(&receiver, name) {
                return Ok(Value::BuiltinMethod(Rc::new(BuiltinMethod {
                    receiver,
                    name: name.to_string(),
                })));
            }
            // Field navigation on parsed JSON trees and plain hashes.
            let key = HashKey::Str(Rc::from(name));
            Ok(map.borrow().get(&key).cloned().unwrap_or(Value::Null))
        }
        _ => {
            if has_method(&receiver, name) {
                Ok(Value::BuiltinMethod(Rc::new(BuiltinMethod {
                    receiver,
                    name: name.to_string(),
                })))
            } else {
                Err(RunError::fatal(format!(
                    "undefined method {name} for {}",
                    receiver.type_name()
                )))
            }
        }
    }
}

/// `type` / `message` / `stack` / `line` / `column` on an error value. These
/// are exposed both as zero-argument methods and as plain property reads.
pub fn error_property(err: &crate::error::RushError, name: &str) -> RunResult<Value> {
    match name {
        "type" => Ok(Value::string(err.kind.to_string())),
        "message" => Ok(Value::string(&err.message)),
        "stack" => Ok(Value::string(&err.stack_trace)),
        "line" => Ok(Value::Integer(i64::from(err.line))),
        "column" => Ok(Value::Integer(i64::from(err.column))),
        other => Err(RunError::fatal(format!("undefined method {other} for ERROR"))),
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn names_round_trip_through_ids() {
        for builtin in Builtin::iter() {
            let name = builtin.to_string();
            assert_eq!(Builtin::from_str(&name).unwrap(), builtin);
            assert_eq!(Builtin::from_repr(builtin.id()).unwrap(), builtin);
        }
    }

    #[test]
    fn snake_case_names() {
        assert_eq!(Builtin::HasKey.to_string(), "has_key");
        assert_eq!(Builtin::RandomInt.to_string(), "random_int");
        assert_eq!(Builtin::Type.to_string(), "type");
    }
}
