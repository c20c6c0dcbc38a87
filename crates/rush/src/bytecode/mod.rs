//! Bytecode compiler and virtual machine.
//!
//! The alternative execution path: AST → [`Compiler`] → [`Bytecode`] →
//! [`VM`]. It shares the value model, builtin registry and error taxonomy
//! with the tree-walking evaluator, so switching engines is transparent to
//! programs.
//!
//! - `op` — opcode definitions and instruction encoding
//! - `symbols` — compile-time symbol table (Global/Local/Builtin/Free)
//! - `compiler` — AST to bytecode translation
//! - `vm` — stack machine with frames and try/catch unwinding

pub use compiler::{Bytecode, CompileError, Compiler};
pub use op::{Opcode, disassemble, make};
pub use vm::VM;

mod compiler;
mod op;
mod symbols;
mod vm;

/// A function lowered to bytecode: its instructions plus the frame layout.
#[derive(Debug)]
pub struct CompiledFunction {
    pub instructions: Vec<u8>,
    pub num_locals: usize,
    pub num_parameters: usize,
    pub name: Option<String>,
}
