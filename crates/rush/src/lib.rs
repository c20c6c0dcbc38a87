//! Rush: an interpreted, dynamically-typed scripting language.
//!
//! Source text flows through the [`lexer`] and the Pratt [`parser`] into an
//! [`ast`], then executes either on the tree-walking [`eval`]uator or on the
//! [`bytecode`] compiler + stack VM. Both engines share the [`value`] model,
//! the [`builtins`] registry, the domain [`modules`] (JSON, Time, files) and
//! the [`error`] taxonomy, so switching engines is transparent to programs.
//!
//! Hosts embed the language through [`Runner`] (run one source string) or
//! [`ReplSession`] (persistent interactive state).

#![expect(clippy::cast_possible_truncation, reason = "numeric narrowing is range-checked at use sites")]
#![expect(clippy::cast_sign_loss, reason = "sign-changing casts are intentional")]
#![expect(clippy::cast_possible_wrap, reason = "wrap behavior is intentional")]

pub mod ast;
pub mod builtins;
pub mod bytecode;
pub mod env;
pub mod error;
pub mod eval;
pub mod io;
pub mod lexer;
pub mod modules;
pub mod parser;
pub mod repl;
pub mod resolver;
pub mod run;
pub mod token;
pub mod tracer;
pub mod value;

pub use crate::{
    error::{ErrorKind, RunError, RunResult, RushError, SyntaxError},
    io::{CollectStringPrint, NoPrint, PrintWriter, SharedBufferPrint, StdPrint},
    repl::ReplSession,
    resolver::{FsResolver, ModuleResolver, StaticResolver},
    run::{Engine, Runner},
    tracer::{ExecTracer, NoopTracer, StderrTracer},
    value::Value,
};
