//! AST → bytecode compiler.
//!
//! One [`CompilationScope`] per function being compiled; jumps are emitted
//! with a placeholder target and patched once the destination is known.
//! `finally` blocks are inlined at every exit edge of their protected region
//! (fall-through, `return`, `break`/`continue`, exception rethrow), so the VM
//! needs no runtime finalization stack.

use std::{fmt, rc::Rc, str::FromStr};

use strum::IntoEnumIterator;

use crate::{
    ast::{Block, CatchClause, ClassDecl, Expr, ExprKind, ImportItem, InfixOp, PrefixOp, Program, Stmt, StmtKind,
        SwitchCase},
    builtins::Builtin,
    bytecode::{
        CompiledFunction,
        op::{Opcode, make},
        symbols::{Symbol, SymbolScope, SymbolTable},
    },
    error::ErrorKind,
    value::Value,
};

/// Placeholder for jump targets patched later.
const PENDING: usize = 0xFFFF;

/// The compiler's output: a main instruction stream plus the constant pool.
#[derive(Debug)]
pub struct Bytecode {
    pub instructions: Vec<u8>,
    pub constants: Vec<Value>,
}

/// A compile-time failure (unknown identifier, bad assignment target, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub message: String,
}

impl CompileError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

type CompileResult<T> = Result<T, CompileError>;

/// An enclosing loop being compiled: where `break`/`continue` jumps collect,
/// and how deep the try-context stack was at loop entry.
#[derive(Debug, Default)]
struct LoopContext {
    break_jumps: Vec<usize>,
    continue_jumps: Vec<usize>,
    try_depth: usize,
}

/// An active `try` region: how many exception records protect the code being
/// compiled right now, and the finally block to inline on exit edges.
#[derive(Debug, Clone)]
struct TryContext {
    records_active: usize,
    finally: Option<Block>,
}

/// Per-function compilation state.
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Vec<u8>,
    last_op: Option<Opcode>,
    last_pos: usize,
    loops: Vec<LoopContext>,
    try_stack: Vec<TryContext>,
    /// Name of the method being compiled; enables `@ivar` and `super`.
    method_name: Option<String>,
}

/// Compiles a parsed program into [`Bytecode`].
pub struct Compiler {
    constants: Vec<Value>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    #[must_use]
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new_global();
        for builtin in Builtin::iter() {
            symbol_table.define_builtin(builtin.id() as usize, &builtin.to_string());
        }
        Self {
            constants: vec![],
            symbol_table,
            scopes: vec![CompilationScope::default()],
        }
    }

    pub fn compile(mut self, program: &Program) -> CompileResult<Bytecode> {
        for stmt in &program.statements {
            self.compile_stmt(stmt)?;
        }
        let main = self.scopes.pop().expect("main scope always exists");
        Ok(Bytecode {
            instructions: main.instructions,
            constants: self.constants,
        })
    }

    // ----- emission plumbing -----

    fn scope(&self) -> &CompilationScope {
        self.scopes.last().expect("at least one scope")
    }

    fn scope_mut(&mut self) -> &mut CompilationScope {
        self.scopes.last_mut().expect("at least one scope")
    }

    fn emit(&mut self, op: Opcode, operands: &[usize]) -> usize {
        let instruction = make(op, operands);
        let scope = self.scope_mut();
        let pos = scope.instructions.len();
        scope.instructions.extend(instruction);
        scope.last_op = Some(op);
        scope.last_pos = pos;
        pos
    }

    /// Points the u16 operand of the jump-family instruction at `pos` to the
    /// current end of the stream.
    fn patch_jump(&mut self, pos: usize) {
        let target = self.scope().instructions.len() as u16;
        self.patch_jump_to(pos, target as usize);
    }

    fn patch_jump_to(&mut self, pos: usize, target: usize) {
        let bytes = (target as u16).to_be_bytes();
        let scope = self.scope_mut();
        scope.instructions[pos + 1] = bytes[0];
        scope.instructions[pos + 2] = bytes[1];
    }

    fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    fn string_constant(&mut self, s: &str) -> usize {
        self.add_constant(Value::string(s))
    }

    fn last_op_is(&self, op: Opcode) -> bool {
        self.scope().last_op == Some(op)
    }

    // ----- statements -----

    fn compile_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.compile_expr(expr)?;
                self.emit(Opcode::Pop, &[]);
                Ok(())
            }
            StmtKind::Assignment { name, value } => self.compile_assignment(name, value),
            StmtKind::InstanceAssignment { name, value } => {
                if self.scope().method_name.is_none() {
                    return Err(CompileError::new(format!(
                        "instance variable @{name} used outside of object context"
                    )));
                }
                self.compile_expr(value)?;
                let name_const = self.string_constant(name);
                self.emit(Opcode::SetInstance, &[name_const]);
                Ok(())
            }
            StmtKind::IndexAssignment { target, index, value } => {
                self.compile_expr(target)?;
                self.compile_expr(index)?;
                self.compile_expr(value)?;
                self.emit(Opcode::SetIndex, &[]);
                Ok(())
            }
            StmtKind::Return(value) => {
                match value {
                    Some(expr) => self.compile_expr(expr)?,
                    None => {
                        self.emit(Opcode::Null, &[]);
                    }
                }
                self.emit_exit_cleanup(0)?;
                self.emit(Opcode::Return, &[]);
                Ok(())
            }
            StmtKind::Break => self.compile_loop_jump(true),
            StmtKind::Continue => self.compile_loop_jump(false),
            StmtKind::While { condition, body } => self.compile_while(condition, body),
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => self.compile_for(init.as_deref(), condition.as_ref(), update.as_deref(), body),
            StmtKind::Switch { value, cases, default } => self.compile_switch(value, cases, default.as_ref()),
            StmtKind::Try { body, catches, finally } => self.compile_try(body, catches, finally.as_ref()),
            StmtKind::Throw(expr) => {
                self.compile_expr(expr)?;
                self.emit(Opcode::Throw, &[]);
                Ok(())
            }
            StmtKind::Import { module, items } => self.compile_import(module, items),
            StmtKind::Export { name, value } => self.compile_export(name, value.as_ref()),
            StmtKind::Class(decl) => self.compile_class(decl),
        }
    }

    /// Walk-up assignment semantics: an existing binding (global or local)
    /// is updated, otherwise the name is defined in the current scope.
    /// Assigning through a closure capture is not expressible in the opcode
    /// set and is rejected at compile time.
    fn compile_assignment(&mut self, name: &str, value: &Expr) -> CompileResult<()> {
        let symbol = match self.symbol_table.resolve(name) {
            Some(symbol) => match symbol.scope {
                SymbolScope::Global | SymbolScope::Local => symbol,
                SymbolScope::Free => {
                    return Err(CompileError::new(format!(
                        "cannot assign to captured variable {name} in compiled code"
                    )));
                }
                // Shadow builtins and function self-references.
                SymbolScope::Builtin | SymbolScope::Function => self.symbol_table.define(name),
            },
            None => self.symbol_table.define(name),
        };
        self.compile_expr(value)?;
        self.emit_store(&symbol);
        Ok(())
    }

    fn emit_store(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Opcode::SetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Opcode::SetLocal, &[symbol.index]),
            _ => unreachable!("stores only target globals and locals"),
        };
    }

    fn emit_load(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Opcode::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Opcode::GetLocal, &[symbol.index]),
            SymbolScope::Builtin => self.emit(Opcode::GetBuiltin, &[symbol.index]),
            SymbolScope::Free => self.emit(Opcode::GetFree, &[symbol.index]),
            SymbolScope::Function => self.emit(Opcode::CurrentClosure, &[]),
        };
    }

    fn compile_loop_jump(&mut self, is_break: bool) -> CompileResult<()> {
        let what = if is_break { "break" } else { "continue" };
        let Some(loop_ctx) = self.scope().loops.last() else {
            return Err(CompileError::new(format!("{what} outside of loop")));
        };
        let try_depth = loop_ctx.try_depth;
        self.emit_exit_cleanup(try_depth)?;
        let pos = self.emit(Opcode::Jump, &[PENDING]);
        let loop_ctx = self.scope_mut().loops.last_mut().expect("loop context still present");
        if is_break {
            loop_ctx.break_jumps.push(pos);
        } else {
            loop_ctx.continue_jumps.push(pos);
        }
        Ok(())
    }

    fn compile_while(&mut self, condition: &Expr, body: &Block) -> CompileResult<()> {
        let cond_start = self.scope().instructions.len();
        self.compile_expr(condition)?;
        let exit = self.emit(Opcode::JumpNotTruthy, &[PENDING]);

        let try_depth = self.scope().try_stack.len();
        self.scope_mut().loops.push(LoopContext {
            try_depth,
            ..LoopContext::default()
        });
        self.compile_block_stmts(body)?;
        let loop_ctx = self.scope_mut().loops.pop().expect("loop context");

        self.emit(Opcode::Jump, &[cond_start]);
        self.patch_jump(exit);
        for pos in loop_ctx.break_jumps {
            self.patch_jump(pos);
        }
        for pos in loop_ctx.continue_jumps {
            self.patch_jump_to(pos, cond_start);
        }
        Ok(())
    }

    fn compile_for(
        &mut self,
        init: Option<&Stmt>,
        condition: Option<&Expr>,
        update: Option<&Stmt>,
        body: &Block,
    ) -> CompileResult<()> {
        if let Some(init) = init {
            self.compile_stmt(init)?;
        }
        let cond_start = self.scope().instructions.len();
        match condition {
            Some(condition) => self.compile_expr(condition)?,
            None => {
                self.emit(Opcode::True, &[]);
            }
        }
        let exit = self.emit(Opcode::JumpNotTruthy, &[PENDING]);

        let try_depth = self.scope().try_stack.len();
        self.scope_mut().loops.push(LoopContext {
            try_depth,
            ..LoopContext::default()
        });
        self.compile_block_stmts(body)?;
        let loop_ctx = self.scope_mut().loops.pop().expect("loop context");

        // `continue` lands on the update expression.
        let continue_target = self.scope().instructions.len();
        for pos in loop_ctx.continue_jumps {
            self.patch_jump_to(pos, continue_target);
        }
        if let Some(update) = update {
            self.compile_stmt(update)?;
        }
        self.emit(Opcode::Jump, &[cond_start]);
        self.patch_jump(exit);
        for pos in loop_ctx.break_jumps {
            self.patch_jump(pos);
        }
        Ok(())
    }

    /// The discriminant is evaluated once and `Dup`ed for each candidate
    /// comparison; the compare/jump chain preserves first-match-wins.
    fn compile_switch(&mut self, value: &Expr, cases: &[SwitchCase], default: Option<&Block>) -> CompileResult<()> {
        self.compile_expr(value)?;

        let mut case_jumps: Vec<Vec<usize>> = Vec::with_capacity(cases.len());
        for case in cases {
            let mut jumps = vec![];
            for candidate in &case.values {
                self.emit(Opcode::Dup, &[]);
                self.compile_expr(candidate)?;
                self.emit(Opcode::Equal, &[]);
                jumps.push(self.emit(Opcode::JumpTruthy, &[PENDING]));
            }
            case_jumps.push(jumps);
        }
        let to_default = self.emit(Opcode::Jump, &[PENDING]);

        let mut end_jumps = vec![];
        for (case, jumps) in cases.iter().zip(case_jumps) {
            for pos in jumps {
                self.patch_jump(pos);
            }
            self.emit(Opcode::Pop, &[]); // drop the discriminant
            self.compile_block_stmts(&case.body)?;
            end_jumps.push(self.emit(Opcode::Jump, &[PENDING]));
        }

        self.patch_jump(to_default);
        self.emit(Opcode::Pop, &[]);
        if let Some(default) = default {
            self.compile_block_stmts(default)?;
        }
        for pos in end_jumps {
            self.patch_jump(pos);
        }
        Ok(())
    }

    fn compile_try(&mut self, body: &Block, catches: &[CatchClause], finally: Option<&Block>) -> CompileResult<()> {
        let has_finally = finally.is_some();

        let try_begin = self.emit(Opcode::TryBegin, &[PENDING]);
        self.scope_mut().try_stack.push(TryContext {
            records_active: 1,
            finally: finally.cloned(),
        });
        self.compile_block_stmts(body)?;
        self.scope_mut().try_stack.pop();
        self.emit(Opcode::TryEnd, &[]);
        if let Some(finally) = finally {
            self.emit(Opcode::Finally, &[]);
            self.compile_block_stmts(finally)?;
        }
        let mut end_jumps = vec![self.emit(Opcode::Jump, &[PENDING])];

        // Handler: the caught error value is on the stack. Catch bodies are
        // themselves protected when a finally exists, so a re-throw still
        // runs it.
        self.patch_jump(try_begin);
        let rethrow_begin = has_finally.then(|| self.emit(Opcode::TryBegin, &[PENDING]));
        self.scope_mut().try_stack.push(TryContext {
            records_active: usize::from(has_finally),
            finally: finally.cloned(),
        });

        for clause in catches {
            let skip = match &clause.error_type {
                Some(type_name) => {
                    if ErrorKind::from_str(type_name).is_err() {
                        return Err(CompileError::new(format!("unknown error type: {type_name}")));
                    }
                    self.emit(Opcode::Dup, &[]);
                    let type_prop = self.string_constant("type");
                    self.emit(Opcode::GetProperty, &[type_prop]);
                    let wanted = self.string_constant(type_name);
                    self.emit(Opcode::Constant, &[wanted]);
                    self.emit(Opcode::Equal, &[]);
                    Some(self.emit(Opcode::JumpNotTruthy, &[PENDING]))
                }
                None => None,
            };

            // Bind the error: catch variables shadow like set_local.
            let symbol = self.symbol_table.define(&clause.variable);
            match symbol.scope {
                SymbolScope::Global => self.emit(Opcode::SetGlobal, &[symbol.index]),
                SymbolScope::Local => self.emit(Opcode::Catch, &[symbol.index]),
                _ => unreachable!("catch variables bind as globals or locals"),
            };

            self.compile_block_stmts(&clause.body)?;
            if let Some(finally) = finally {
                self.emit(Opcode::TryEnd, &[]);
                self.emit(Opcode::Finally, &[]);
                self.compile_block_stmts(finally)?;
            }
            end_jumps.push(self.emit(Opcode::Jump, &[PENDING]));

            if let Some(skip) = skip {
                self.patch_jump(skip);
            }
        }

        // No clause matched: the original error continues propagating.
        if let Some(finally) = finally {
            self.emit(Opcode::TryEnd, &[]);
            self.emit(Opcode::Finally, &[]);
            self.compile_block_stmts(finally)?;
        }
        self.emit(Opcode::Throw, &[]);
        self.scope_mut().try_stack.pop();

        if let Some(pos) = rethrow_begin {
            self.patch_jump(pos);
            self.emit(Opcode::Finally, &[]);
            if let Some(finally) = finally {
                self.compile_block_stmts(finally)?;
            }
            self.emit(Opcode::Throw, &[]);
        }

        for pos in end_jumps {
            self.patch_jump(pos);
        }
        Ok(())
    }

    /// Emits `TryEnd`s and inlined finally blocks for every try context
    /// deeper than `down_to`, without disturbing the compile-time stack for
    /// the code that follows the early exit.
    fn emit_exit_cleanup(&mut self, down_to: usize) -> CompileResult<()> {
        let saved = self.scope().try_stack.clone();
        while self.scope().try_stack.len() > down_to {
            let ctx = self.scope_mut().try_stack.pop().expect("non-empty try stack");
            for _ in 0..ctx.records_active {
                self.emit(Opcode::TryEnd, &[]);
            }
            if let Some(finally) = &ctx.finally {
                self.emit(Opcode::Finally, &[]);
                self.compile_block_stmts(finally)?;
            }
        }
        self.scope_mut().try_stack = saved;
        Ok(())
    }

    fn compile_import(&mut self, module: &str, items: &[ImportItem]) -> CompileResult<()> {
        for item in items {
            let module_const = self.string_constant(module);
            self.emit(Opcode::Constant, &[module_const]);
            let member_const = self.string_constant(&item.name);
            self.emit(Opcode::Constant, &[member_const]);
            self.emit(Opcode::Import, &[]);
            let binding = item.alias.as_ref().unwrap_or(&item.name);
            let symbol = self.symbol_table.define(binding);
            self.emit_store(&symbol);
        }
        Ok(())
    }

    fn compile_export(&mut self, name: &str, value: Option<&Expr>) -> CompileResult<()> {
        match value {
            Some(expr) => {
                let symbol = match self.symbol_table.resolve(name) {
                    Some(symbol) if matches!(symbol.scope, SymbolScope::Global | SymbolScope::Local) => symbol,
                    _ => self.symbol_table.define(name),
                };
                self.compile_expr(expr)?;
                self.emit(Opcode::Dup, &[]);
                self.emit_store(&symbol);
            }
            None => {
                let Some(symbol) = self.symbol_table.resolve(name) else {
                    return Err(CompileError::new(format!("identifier not found: {name}")));
                };
                self.emit_load(&symbol);
            }
        }
        let name_const = self.string_constant(name);
        self.emit(Opcode::Export, &[name_const]);
        Ok(())
    }

    fn compile_class(&mut self, decl: &ClassDecl) -> CompileResult<()> {
        let name_const = self.string_constant(&decl.name);
        self.emit(Opcode::Class, &[name_const]);

        if let Some(superclass) = &decl.superclass {
            let Some(symbol) = self.symbol_table.resolve(superclass) else {
                return Err(CompileError::new(format!("identifier not found: {superclass}")));
            };
            self.emit_load(&symbol);
            self.emit(Opcode::Inherit, &[]);
        }

        for method in &decl.methods {
            self.compile_function(&method.params, &method.body, Some(&method.name), Some(method.name.clone()))?;
            let method_const = self.string_constant(&method.name);
            self.emit(Opcode::Method, &[method_const]);
        }

        let symbol = match self.symbol_table.resolve(&decl.name) {
            Some(symbol) if matches!(symbol.scope, SymbolScope::Global | SymbolScope::Local) => symbol,
            _ => self.symbol_table.define(&decl.name),
        };
        self.emit_store(&symbol);
        Ok(())
    }

    // ----- expressions -----

    fn compile_expr(&mut self, expr: &Expr) -> CompileResult<()> {
        match &expr.kind {
            ExprKind::Integer(n) => {
                let idx = self.add_constant(Value::Integer(*n));
                self.emit(Opcode::Constant, &[idx]);
                Ok(())
            }
            ExprKind::Float(f) => {
                let idx = self.add_constant(Value::Float(*f));
                self.emit(Opcode::Constant, &[idx]);
                Ok(())
            }
            ExprKind::Str(s) => {
                let idx = self.string_constant(s);
                self.emit(Opcode::Constant, &[idx]);
                Ok(())
            }
            ExprKind::Boolean(true) => {
                self.emit(Opcode::True, &[]);
                Ok(())
            }
            ExprKind::Boolean(false) => {
                self.emit(Opcode::False, &[]);
                Ok(())
            }
            ExprKind::Identifier(name) => {
                if let Some(symbol) = self.symbol_table.resolve(name) {
                    self.emit_load(&symbol);
                    return Ok(());
                }
                // Error constructors resolve as constants.
                if let Ok(kind) = ErrorKind::from_str(name) {
                    let idx = self.add_constant(Value::ErrorCtor(kind));
                    self.emit(Opcode::Constant, &[idx]);
                    return Ok(());
                }
                Err(CompileError::new(format!("identifier not found: {name}")))
            }
            ExprKind::InstanceVar(name) => {
                if self.scope().method_name.is_none() {
                    return Err(CompileError::new(format!(
                        "instance variable @{name} used outside of object context"
                    )));
                }
                let name_const = self.string_constant(name);
                self.emit(Opcode::GetInstance, &[name_const]);
                Ok(())
            }
            ExprKind::Prefix { op, right } => {
                self.compile_expr(right)?;
                match op {
                    PrefixOp::Bang => self.emit(Opcode::Not, &[]),
                    PrefixOp::Minus => self.emit(Opcode::Minus, &[]),
                };
                Ok(())
            }
            ExprKind::Infix { op, left, right } => self.compile_infix(*op, left, right),
            ExprKind::If {
                condition,
                consequence,
                alternative,
            } => {
                self.compile_expr(condition)?;
                let jump_else = self.emit(Opcode::JumpNotTruthy, &[PENDING]);
                self.compile_block_value(consequence)?;
                let jump_end = self.emit(Opcode::Jump, &[PENDING]);
                self.patch_jump(jump_else);
                match alternative {
                    Some(alternative) => self.compile_block_value(alternative)?,
                    None => {
                        self.emit(Opcode::Null, &[]);
                    }
                }
                self.patch_jump(jump_end);
                Ok(())
            }
            ExprKind::Array(elements) => {
                for element in elements {
                    self.compile_expr(element)?;
                }
                self.emit(Opcode::Array, &[elements.len()]);
                Ok(())
            }
            ExprKind::Hash(pairs) => {
                for (key, value) in pairs {
                    self.compile_expr(key)?;
                    self.compile_expr(value)?;
                }
                self.emit(Opcode::Hash, &[pairs.len()]);
                Ok(())
            }
            ExprKind::Index { receiver, index } => {
                self.compile_expr(receiver)?;
                self.compile_expr(index)?;
                self.emit(Opcode::Index, &[]);
                Ok(())
            }
            ExprKind::Property { receiver, name } => {
                self.compile_expr(receiver)?;
                let name_const = self.string_constant(name);
                self.emit(Opcode::GetProperty, &[name_const]);
                Ok(())
            }
            ExprKind::Call { function, args } => {
                self.compile_expr(function)?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.emit(Opcode::Call, &[args.len()]);
                Ok(())
            }
            ExprKind::Super(args) => {
                let Some(method_name) = self.scope().method_name.clone() else {
                    return Err(CompileError::new("super used outside of method context"));
                };
                let name_const = self.string_constant(&method_name);
                self.emit(Opcode::GetSuper, &[name_const]);
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.emit(Opcode::Call, &[args.len()]);
                Ok(())
            }
            ExprKind::Function { params, body, name } => {
                self.compile_function(params, body, name.as_deref(), None)
            }
        }
    }

    fn compile_infix(&mut self, op: InfixOp, left: &Expr, right: &Expr) -> CompileResult<()> {
        // Short-circuit lowering for the logical operators.
        match op {
            InfixOp::And => {
                self.compile_expr(left)?;
                let first = self.emit(Opcode::JumpNotTruthy, &[PENDING]);
                self.compile_expr(right)?;
                let second = self.emit(Opcode::JumpNotTruthy, &[PENDING]);
                self.emit(Opcode::True, &[]);
                let end = self.emit(Opcode::Jump, &[PENDING]);
                self.patch_jump(first);
                self.patch_jump(second);
                self.emit(Opcode::False, &[]);
                self.patch_jump(end);
                return Ok(());
            }
            InfixOp::Or => {
                self.compile_expr(left)?;
                let first = self.emit(Opcode::JumpTruthy, &[PENDING]);
                self.compile_expr(right)?;
                let second = self.emit(Opcode::JumpTruthy, &[PENDING]);
                self.emit(Opcode::False, &[]);
                let end = self.emit(Opcode::Jump, &[PENDING]);
                self.patch_jump(first);
                self.patch_jump(second);
                self.emit(Opcode::True, &[]);
                self.patch_jump(end);
                return Ok(());
            }
            _ => {}
        }

        self.compile_expr(left)?;
        self.compile_expr(right)?;
        match op {
            InfixOp::Plus => self.emit(Opcode::Add, &[]),
            InfixOp::Minus => self.emit(Opcode::Sub, &[]),
            InfixOp::Asterisk => self.emit(Opcode::Mul, &[]),
            InfixOp::Slash => self.emit(Opcode::Div, &[]),
            InfixOp::Percent => self.emit(Opcode::Mod, &[]),
            InfixOp::Eq => self.emit(Opcode::Equal, &[]),
            InfixOp::NotEq => self.emit(Opcode::NotEqual, &[]),
            InfixOp::Gt => self.emit(Opcode::GreaterThan, &[]),
            InfixOp::GtEq => self.emit(Opcode::GreaterEqual, &[]),
            // `<`/`<=` lower to a swap plus the mirrored comparison, keeping
            // left-to-right operand evaluation.
            InfixOp::Lt => {
                self.emit(Opcode::Swap, &[]);
                self.emit(Opcode::GreaterThan, &[])
            }
            InfixOp::LtEq => {
                self.emit(Opcode::Swap, &[]);
                self.emit(Opcode::GreaterEqual, &[])
            }
            InfixOp::And | InfixOp::Or => unreachable!("lowered above"),
        };
        Ok(())
    }

    fn compile_block_stmts(&mut self, block: &Block) -> CompileResult<()> {
        for stmt in &block.statements {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    /// Compiles a block as an expression: the last expression statement's
    /// value stays on the stack; any other shape yields null.
    fn compile_block_value(&mut self, block: &Block) -> CompileResult<()> {
        match block.statements.split_last() {
            None => {
                self.emit(Opcode::Null, &[]);
                Ok(())
            }
            Some((last, rest)) => {
                for stmt in rest {
                    self.compile_stmt(stmt)?;
                }
                if let StmtKind::Expression(expr) = &last.kind {
                    self.compile_expr(expr)
                } else {
                    self.compile_stmt(last)?;
                    self.emit(Opcode::Null, &[]);
                    Ok(())
                }
            }
        }
    }

    /// Compiles a function literal or method body into a constant and emits
    /// the `Closure` instruction that captures its free variables.
    fn compile_function(
        &mut self,
        params: &[String],
        body: &Block,
        fn_name: Option<&str>,
        method_name: Option<String>,
    ) -> CompileResult<()> {
        // Plain literals inside a method keep instance-variable access;
        // whether a receiver exists is checked at run time.
        let method_ctx = method_name.or_else(|| self.scope().method_name.clone());
        self.enter_scope(method_ctx);

        if let Some(name) = fn_name {
            self.symbol_table.define_function_name(name);
        }
        for param in params {
            self.symbol_table.define(param);
        }

        self.compile_block_stmts(body)?;
        if self.last_op_is(Opcode::Pop) {
            self.replace_last_pop_with_return();
        }
        if !self.last_op_is(Opcode::Return) {
            self.emit(Opcode::ReturnVoid, &[]);
        }

        let (instructions, free_symbols, num_locals) = self.leave_scope();
        for symbol in &free_symbols {
            self.emit_load(symbol);
        }
        let func = CompiledFunction {
            instructions,
            num_locals,
            num_parameters: params.len(),
            name: fn_name.map(String::from),
        };
        let fn_const = self.add_constant(Value::CompiledFunction(Rc::new(func)));
        self.emit(Opcode::Closure, &[fn_const, free_symbols.len()]);
        Ok(())
    }

    /// The implicit return: a body ending in an expression statement returns
    /// that expression's value.
    fn replace_last_pop_with_return(&mut self) {
        let scope = self.scope_mut();
        let pos = scope.last_pos;
        scope.instructions[pos] = Opcode::Return as u8;
        scope.last_op = Some(Opcode::Return);
    }

    fn enter_scope(&mut self, method_name: Option<String>) {
        self.scopes.push(CompilationScope {
            method_name,
            ..CompilationScope::default()
        });
        let outer = std::mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::enclosed(Box::new(outer));
    }

    fn leave_scope(&mut self) -> (Vec<u8>, Vec<Symbol>, usize) {
        let scope = self.scopes.pop().expect("nested scope");
        let table = std::mem::take(&mut self.symbol_table);
        let (outer, free_symbols, num_locals) = table.into_parts();
        self.symbol_table = *outer.expect("nested symbol table has an outer");
        (scope.instructions, free_symbols, num_locals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bytecode::op::disassemble, parser};

    fn compile_source(source: &str) -> Bytecode {
        let (program, errors) = parser::parse(source);
        assert!(errors.is_empty(), "syntax errors: {errors:?}");
        Compiler::new().compile(&program).expect("compiles")
    }

    fn compile_err(source: &str) -> CompileError {
        let (program, errors) = parser::parse(source);
        assert!(errors.is_empty(), "syntax errors: {errors:?}");
        Compiler::new().compile(&program).expect_err("should not compile")
    }

    #[test]
    fn arithmetic_with_constants() {
        let bytecode = compile_source("1 + 2");
        let text = disassemble(&bytecode.instructions);
        assert_eq!(text, "0000 Constant 0\n0003 Constant 1\n0006 Add\n0007 Pop\n");
        assert_eq!(bytecode.constants.len(), 2);
    }

    #[test]
    fn less_than_lowers_to_swap_greater() {
        let bytecode = compile_source("1 < 2");
        let text = disassemble(&bytecode.instructions);
        assert!(text.contains("Swap"), "expected swap lowering:\n{text}");
        assert!(text.contains("GreaterThan"));
        let bytecode = compile_source("1 <= 2");
        assert!(disassemble(&bytecode.instructions).contains("GreaterEqual"));
    }

    #[test]
    fn global_assignment_uses_slots_after_prelude() {
        let bytecode = compile_source("x = 1; x");
        let text = disassemble(&bytecode.instructions);
        // Namespace prelude occupies the first global slots.
        let slot = crate::modules::Namespace::ALL.len();
        assert!(text.contains(&format!("SetGlobal {slot}")));
        assert!(text.contains(&format!("GetGlobal {slot}")));
    }

    #[test]
    fn builtin_resolution() {
        let bytecode = compile_source("len([1])");
        let text = disassemble(&bytecode.instructions);
        assert!(text.contains(&format!("GetBuiltin {}", Builtin::Len.id())));
    }

    #[test]
    fn closures_capture_free_variables() {
        let bytecode = compile_source("make = fn(n) { fn() { n } }");
        // The inner function loads its free variable.
        let Value::CompiledFunction(inner) = &bytecode.constants[0] else {
            panic!("expected inner function constant");
        };
        assert!(disassemble(&inner.instructions).contains("GetFree 0"));
    }

    #[test]
    fn assigning_to_capture_is_rejected() {
        let err = compile_err("make = fn(n) { fn() { n = n + 1 } }");
        assert!(err.message.contains("cannot assign to captured variable"));
    }

    #[test]
    fn break_outside_loop_is_rejected() {
        let err = compile_err("break");
        assert_eq!(err.message, "break outside of loop");
    }

    #[test]
    fn instance_var_outside_class_is_rejected() {
        let err = compile_err("@x");
        assert!(err.message.contains("used outside of object context"));
    }

    #[test]
    fn try_emits_handler_and_cleanup() {
        let bytecode = compile_source("try { 1 } catch (e) { 2 } finally { 3 }");
        let text = disassemble(&bytecode.instructions);
        assert!(text.contains("TryBegin"));
        assert!(text.contains("TryEnd"));
        assert!(text.contains("Finally"));
        assert!(text.contains("Throw"));
    }

    #[test]
    fn switch_compiles_to_compare_jump_chain() {
        let bytecode = compile_source("switch (2) { case 1, 2: 10 default: 20 }");
        let text = disassemble(&bytecode.instructions);
        assert!(text.matches("Dup").count() >= 2);
        assert!(text.matches("JumpTruthy").count() >= 2);
    }

    #[test]
    fn implicit_return_of_last_expression() {
        let bytecode = compile_source("f = fn() { 42 }");
        let Value::CompiledFunction(func) = &bytecode.constants[1] else {
            panic!("expected function constant");
        };
        let text = disassemble(&func.instructions);
        assert!(text.ends_with("Return\n"), "expected implicit return:\n{text}");
    }
}
