//! Error taxonomy and the evaluator signal channel.
//!
//! Two failure shapes exist at runtime:
//!
//! - a *bare error* ([`RunError::Fatal`]): a static/eager failure (unknown
//!   identifier, unknown operator, arity mismatch). It halts the current
//!   program and is never visible to `catch`.
//! - an *exception* ([`RunError::Exc`]): an error wrapped by `throw` or by a
//!   builtin that represents a normal, recoverable failure (pop on empty,
//!   index out of range). It unwinds to the nearest matching `catch`.
//!
//! `Return`/`Break`/`Continue` ride the same `Err` channel so the `Value` sum
//! stays closed; each is intercepted by the construct it belongs to.

use std::fmt;

use strum::{Display, EnumString, IntoStaticStr};

use crate::value::Value;

/// Result alias used throughout evaluation and VM execution.
pub type RunResult<T> = Result<T, RunError>;

/// The closed set of error kinds surfaced to the language.
///
/// The strum derives make the variant name itself the string used by
/// `err.type`, `catch (TypeError e)` matching, and `Kind("msg")` constructor
/// lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum ErrorKind {
    Error,
    ValidationError,
    TypeError,
    IndexError,
    ArgumentError,
    RuntimeError,
}

impl ErrorKind {
    /// Whether an error of this kind is caught by a `catch` clause naming
    /// `handler`. An empty handler type is a catch-all.
    #[must_use]
    pub fn matches(self, handler: Option<ErrorKind>) -> bool {
        handler.is_none_or(|h| h == self)
    }

    /// The constructor call `Kind(message)`: builds an error value carrying
    /// this kind. The message defaults to empty and non-string arguments use
    /// their printable form.
    pub fn construct(self, args: &[Value]) -> Result<Value, RunError> {
        let message = match args {
            [] => String::new(),
            [Value::Str(s)] => s.to_string(),
            [other] => other.inspect(),
            _ => return Err(RunError::wrong_arity(1, args.len())),
        };
        Ok(Value::Error(std::rc::Rc::new(RushError::new(self, message))))
    }
}

/// A runtime error value: kind, message, source position and the call stack
/// captured where the error was raised.
#[derive(Debug, Clone, PartialEq)]
pub struct RushError {
    pub kind: ErrorKind,
    pub message: String,
    pub line: u32,
    pub column: u32,
    /// Stack trace formatted top frame first; empty when raised outside any
    /// call.
    pub stack_trace: String,
}

impl RushError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: 0,
            column: 0,
            stack_trace: String::new(),
        }
    }

    #[must_use]
    pub fn with_pos(mut self, line: u32, column: u32) -> Self {
        self.line = line;
        self.column = column;
        self
    }
}

impl fmt::Display for RushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Non-local control flow carried through `Result::Err`.
#[derive(Debug)]
pub enum RunError {
    /// A catchable exception wrapping an error raised by `throw` or by a
    /// builtin that wraps explicitly.
    Exc(Box<RushError>),
    /// A bare error: surfaced directly, never passes through `catch`.
    Fatal(Box<RushError>),
    /// `return` unwinding to the enclosing call.
    Return(Value),
    /// `break` unwinding to the enclosing loop.
    Break,
    /// `continue` unwinding to the enclosing loop.
    Continue,
}

impl RunError {
    /// Catchable exception of the given kind.
    #[must_use]
    pub fn exc(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Exc(Box::new(RushError::new(kind, message)))
    }

    /// Bare, uncatchable error (always [`ErrorKind::Error`]).
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(Box::new(RushError::new(ErrorKind::Error, message)))
    }

    #[must_use]
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::exc(ErrorKind::TypeError, message)
    }

    #[must_use]
    pub fn index_error(message: impl Into<String>) -> Self {
        Self::exc(ErrorKind::IndexError, message)
    }

    #[must_use]
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::exc(ErrorKind::ValidationError, message)
    }

    #[must_use]
    pub fn runtime_error(message: impl Into<String>) -> Self {
        Self::exc(ErrorKind::RuntimeError, message)
    }

    #[must_use]
    pub fn argument_error(message: impl Into<String>) -> Self {
        Self::exc(ErrorKind::ArgumentError, message)
    }

    /// Arity-mismatch bare error with the canonical message.
    #[must_use]
    pub fn wrong_arity(want: usize, got: usize) -> Self {
        Self::fatal(format!("wrong number of arguments: want={want}, got={got}"))
    }

    /// Attaches a source position to the underlying error, if any and not
    /// already set.
    #[must_use]
    pub fn at(self, line: u32, column: u32) -> Self {
        match self {
            Self::Exc(mut e) => {
                if e.line == 0 {
                    e.line = line;
                    e.column = column;
                }
                Self::Exc(e)
            }
            Self::Fatal(mut e) => {
                if e.line == 0 {
                    e.line = line;
                    e.column = column;
                }
                Self::Fatal(e)
            }
            other => other,
        }
    }
}

/// A syntax error accumulated by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "syntax error at {}:{}: {}", self.line, self.column, self.message)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn kind_names_round_trip() {
        for kind in [
            ErrorKind::Error,
            ErrorKind::ValidationError,
            ErrorKind::TypeError,
            ErrorKind::IndexError,
            ErrorKind::ArgumentError,
            ErrorKind::RuntimeError,
        ] {
            let name = kind.to_string();
            assert_eq!(ErrorKind::from_str(&name).unwrap(), kind);
        }
    }

    #[test]
    fn catch_matching() {
        assert!(ErrorKind::TypeError.matches(None));
        assert!(ErrorKind::TypeError.matches(Some(ErrorKind::TypeError)));
        assert!(!ErrorKind::TypeError.matches(Some(ErrorKind::IndexError)));
    }
}
