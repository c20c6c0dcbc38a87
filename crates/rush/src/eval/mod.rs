//! Tree-walking evaluator.
//!
//! Every node evaluates to a [`Value`]; non-local control flow (`return`,
//! `break`, `continue`, exceptions, bare errors) travels through the `Err`
//! side of [`RunResult`] and is intercepted by the construct it belongs to:
//! `Return` at call boundaries, `Break`/`Continue` at loops, exceptions at
//! the nearest matching `catch`.

pub mod binary;

use std::{cell::RefCell, rc::Rc, str::FromStr};

use ahash::AHashMap;
use indexmap::IndexMap;
use rand_chacha::ChaCha8Rng;

use crate::{
    ast::{Block, CatchClause, ClassDecl, Expr, ExprKind, ImportItem, InfixOp, Pos, Program, Stmt, StmtKind},
    builtins::{self, Builtin, BuiltinCtx},
    env::{CallStack, Environment},
    error::{ErrorKind, RunError, RunResult, RushError},
    io::PrintWriter,
    parser,
    resolver::ModuleResolver,
    tracer::ExecTracer,
    value::{BoundMethod, BuiltinMethod, Class, Function, MethodBody, Object, Value},
};

/// Default ceiling on user-function call depth.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1000;

/// The tree-walking interpreter. Owns the host facilities (RNG, print sink,
/// module resolver, tracer) shared by everything a program can reach.
pub struct Evaluator {
    call_stack: CallStack,
    rng: ChaCha8Rng,
    print: Box<dyn PrintWriter>,
    resolver: Rc<dyn ModuleResolver>,
    tracer: Box<dyn ExecTracer>,
    max_call_depth: usize,
    module_cache: AHashMap<String, Rc<IndexMap<String, Value>>>,
    /// Export frames; the top frame collects `export` statements of the unit
    /// currently being evaluated.
    exports: Vec<IndexMap<String, Value>>,
    /// Receiver of the currently executing method, for `@ivar` access.
    receiver: Option<Rc<Object>>,
    /// Defining class and name of the currently executing method, for
    /// `super` dispatch.
    current_method: Option<(Rc<Class>, String)>,
}

impl Evaluator {
    #[must_use]
    pub fn new(
        rng: ChaCha8Rng,
        print: Box<dyn PrintWriter>,
        resolver: Rc<dyn ModuleResolver>,
        tracer: Box<dyn ExecTracer>,
    ) -> Self {
        Self {
            call_stack: CallStack::new(),
            rng,
            print,
            resolver,
            tracer,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            module_cache: AHashMap::new(),
            exports: vec![IndexMap::new()],
            receiver: None,
            current_method: None,
        }
    }

    pub fn set_max_call_depth(&mut self, depth: usize) {
        self.max_call_depth = depth;
    }

    /// Swaps the print sink, returning the old one.
    pub fn replace_print(&mut self, print: Box<dyn PrintWriter>) -> Box<dyn PrintWriter> {
        std::mem::replace(&mut self.print, print)
    }

    /// Evaluates a program in `env`. The result is the last statement's
    /// value; a top-level `return` ends the program early with its value.
    pub fn eval_program(&mut self, program: &Program, env: &Rc<RefCell<Environment>>) -> RunResult<Value> {
        let mut result = Value::Null;
        for stmt in &program.statements {
            match self.eval_stmt(stmt, env) {
                Ok(value) => result = value,
                Err(RunError::Return(value)) => return Ok(value),
                Err(RunError::Break) => return Err(loop_signal_error("break", stmt.pos)),
                Err(RunError::Continue) => return Err(loop_signal_error("continue", stmt.pos)),
                Err(err) => return Err(err),
            }
        }
        Ok(result)
    }

    fn eval_block(&mut self, block: &Block, env: &Rc<RefCell<Environment>>) -> RunResult<Value> {
        let mut result = Value::Null;
        for stmt in &block.statements {
            result = self.eval_stmt(stmt, env)?;
        }
        Ok(result)
    }

    fn eval_stmt(&mut self, stmt: &Stmt, env: &Rc<RefCell<Environment>>) -> RunResult<Value> {
        match &stmt.kind {
            StmtKind::Expression(expr) => self.eval_expr(expr, env),
            StmtKind::Assignment { name, value } => {
                let value = self.eval_expr(value, env)?;
                Environment::set(env, name, value);
                Ok(Value::Null)
            }
            StmtKind::InstanceAssignment { name, value } => {
                let value = self.eval_expr(value, env)?;
                let Some(receiver) = self.receiver.clone() else {
                    return Err(RunError::fatal(format!(
                        "instance variable @{name} used outside of object context"
                    ))
                    .at(stmt.pos.line, stmt.pos.column));
                };
                receiver.ivars.borrow_mut().insert(name.clone(), value);
                Ok(Value::Null)
            }
            StmtKind::IndexAssignment { target, index, value } => {
                let target_value = self.eval_expr(target, env)?;
                let index_value = self.eval_expr(index, env)?;
                let value = self.eval_expr(value, env)?;
                self.assign_index(&target_value, &index_value, value, stmt.pos)?;
                Ok(Value::Null)
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr, env)?,
                    None => Value::Null,
                };
                Err(RunError::Return(value))
            }
            StmtKind::Break => Err(RunError::Break),
            StmtKind::Continue => Err(RunError::Continue),
            StmtKind::While { condition, body } => {
                while self.eval_expr(condition, env)?.is_truthy() {
                    match self.eval_block(body, env) {
                        Ok(_) | Err(RunError::Continue) => {}
                        Err(RunError::Break) => break,
                        Err(err) => return Err(err),
                    }
                }
                Ok(Value::Null)
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                if let Some(init) = init {
                    self.eval_stmt(init, env)?;
                }
                loop {
                    if let Some(condition) = condition {
                        if !self.eval_expr(condition, env)?.is_truthy() {
                            break;
                        }
                    }
                    match self.eval_block(body, env) {
                        Ok(_) | Err(RunError::Continue) => {}
                        Err(RunError::Break) => break,
                        Err(err) => return Err(err),
                    }
                    if let Some(update) = update {
                        self.eval_stmt(update, env)?;
                    }
                }
                Ok(Value::Null)
            }
            StmtKind::Switch { value, cases, default } => {
                let discriminant = self.eval_expr(value, env)?;
                for case in cases {
                    for candidate in &case.values {
                        let candidate = self.eval_expr(candidate, env)?;
                        if discriminant.value_eq(&candidate) {
                            return self.eval_block(&case.body, env);
                        }
                    }
                }
                match default {
                    Some(body) => self.eval_block(body, env),
                    None => Ok(Value::Null),
                }
            }
            StmtKind::Try { body, catches, finally } => self.eval_try(body, catches, finally.as_ref(), env),
            StmtKind::Throw(expr) => {
                let value = self.eval_expr(expr, env)?;
                Err(self.raise(value, stmt.pos))
            }
            StmtKind::Import { module, items } => self.eval_import(module, items, env, stmt.pos),
            StmtKind::Export { name, value } => {
                let value = match value {
                    Some(expr) => {
                        let value = self.eval_expr(expr, env)?;
                        Environment::set(env, name, value.clone());
                        value
                    }
                    None => Environment::get(env, name).ok_or_else(|| {
                        RunError::fatal(format!("identifier not found: {name}")).at(stmt.pos.line, stmt.pos.column)
                    })?,
                };
                if let Some(frame) = self.exports.last_mut() {
                    frame.insert(name.clone(), value);
                }
                Ok(Value::Null)
            }
            StmtKind::Class(decl) => {
                self.eval_class_decl(decl, env, stmt.pos)?;
                Ok(Value::Null)
            }
        }
    }

    fn eval_expr(&mut self, expr: &Expr, env: &Rc<RefCell<Environment>>) -> RunResult<Value> {
        match &expr.kind {
            ExprKind::Integer(n) => Ok(Value::Integer(*n)),
            ExprKind::Float(f) => Ok(Value::Float(*f)),
            ExprKind::Boolean(b) => Ok(Value::Boolean(*b)),
            ExprKind::Str(s) => Ok(Value::string(s)),
            ExprKind::Identifier(name) => self.lookup_identifier(name, env, expr.pos),
            ExprKind::InstanceVar(name) => {
                let Some(receiver) = &self.receiver else {
                    return Err(RunError::fatal(format!(
                        "instance variable @{name} used outside of object context"
                    ))
                    .at(expr.pos.line, expr.pos.column));
                };
                Ok(receiver.ivars.borrow().get(name).cloned().unwrap_or(Value::Null))
            }
            ExprKind::Prefix { op, right } => {
                let value = self.eval_expr(right, env)?;
                binary::eval_prefix(*op, &value).map_err(|err| self.decorate(err, expr.pos))
            }
            ExprKind::Infix { op, left, right } => {
                let left_value = self.eval_expr(left, env)?;
                // Short-circuit logical operators before the right side runs.
                match op {
                    InfixOp::And => {
                        if !left_value.is_truthy() {
                            return Ok(Value::Boolean(false));
                        }
                        let right_value = self.eval_expr(right, env)?;
                        return Ok(Value::Boolean(right_value.is_truthy()));
                    }
                    InfixOp::Or => {
                        if left_value.is_truthy() {
                            return Ok(Value::Boolean(true));
                        }
                        let right_value = self.eval_expr(right, env)?;
                        return Ok(Value::Boolean(right_value.is_truthy()));
                    }
                    _ => {}
                }
                let right_value = self.eval_expr(right, env)?;
                binary::eval_infix(*op, &left_value, &right_value).map_err(|err| self.decorate(err, expr.pos))
            }
            ExprKind::If {
                condition,
                consequence,
                alternative,
            } => {
                if self.eval_expr(condition, env)?.is_truthy() {
                    self.eval_block(consequence, env)
                } else if let Some(alternative) = alternative {
                    self.eval_block(alternative, env)
                } else {
                    Ok(Value::Null)
                }
            }
            ExprKind::Array(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.eval_expr(element, env)?);
                }
                Ok(Value::array(values))
            }
            ExprKind::Hash(pairs) => {
                let mut map = IndexMap::with_capacity(pairs.len());
                for (key_expr, value_expr) in pairs {
                    let key = self.eval_expr(key_expr, env)?;
                    let key = builtins::hash_methods::hashable(&key).map_err(|err| self.decorate(err, key_expr.pos))?;
                    let value = self.eval_expr(value_expr, env)?;
                    map.insert(key, value);
                }
                Ok(Value::hash(map))
            }
            ExprKind::Index { receiver, index } => {
                let receiver_value = self.eval_expr(receiver, env)?;
                let index_value = self.eval_expr(index, env)?;
                self.eval_index(&receiver_value, &index_value, expr.pos)
            }
            ExprKind::Property { receiver, name } => {
                let receiver_value = self.eval_expr(receiver, env)?;
                self.eval_property(receiver_value, name, expr.pos)
            }
            ExprKind::Call { function, args } => {
                let callee = self.eval_expr(function, env)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval_expr(arg, env)?);
                }
                self.call_value(callee, values, expr.pos)
            }
            ExprKind::Super(args) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval_expr(arg, env)?);
                }
                self.call_super(values, expr.pos)
            }
            ExprKind::Function { params, body, name } => Ok(Value::Function(Rc::new(Function {
                name: name.clone(),
                params: params.clone(),
                body: body.clone(),
                env: Rc::clone(env),
            }))),
        }
    }

    // ----- identifiers, indexing, properties -----

    fn lookup_identifier(&mut self, name: &str, env: &Rc<RefCell<Environment>>, pos: Pos) -> RunResult<Value> {
        if let Some(value) = Environment::get(env, name) {
            return Ok(value);
        }
        if let Ok(builtin) = Builtin::from_str(name) {
            return Ok(Value::Builtin(builtin));
        }
        if let Ok(kind) = ErrorKind::from_str(name) {
            return Ok(Value::ErrorCtor(kind));
        }
        Err(RunError::fatal(format!("identifier not found: {name}")).at(pos.line, pos.column))
    }

    fn eval_index(&mut self, receiver: &Value, index: &Value, pos: Pos) -> RunResult<Value> {
        index_value(receiver, index).map_err(|err| self.decorate(err, pos))
    }

    fn assign_index(&mut self, target: &Value, index: &Value, value: Value, pos: Pos) -> RunResult<()> {
        index_assign(target, index, value).map_err(|err| self.decorate(err, pos))
    }

    fn eval_property(&mut self, receiver: Value, name: &str, pos: Pos) -> RunResult<Value> {
        builtins::resolve_property(receiver, name).map_err(|err| self.decorate(err, pos))
    }

    // ----- calls -----

    /// Calls any callable value with already-evaluated arguments.
    pub fn call_value(&mut self, callee: Value, args: Vec<Value>, pos: Pos) -> RunResult<Value> {
        match callee {
            Value::Function(func) => self.call_function(&func, args, pos),
            Value::BoundMethod(bound) => self.call_bound_method(&bound, args, pos),
            Value::BuiltinMethod(method) => self.call_builtin_method(&method, args, pos),
            Value::Builtin(builtin) => {
                let mut ctx = BuiltinCtx {
                    rng: &mut self.rng,
                    print: &mut *self.print,
                };
                builtin.call(&args, &mut ctx).map_err(|err| {
                    let err = err.at(pos.line, pos.column);
                    decorate_with_stack(err, &self.call_stack)
                })
            }
            Value::ErrorCtor(kind) => kind.construct(&args).map_err(|err| self.decorate(err, pos)),
            other => Err(RunError::fatal(format!("not a function: {}", other.type_name())).at(pos.line, pos.column)),
        }
    }

    fn call_function(&mut self, func: &Rc<Function>, args: Vec<Value>, pos: Pos) -> RunResult<Value> {
        if args.len() != func.params.len() {
            return Err(RunError::wrong_arity(func.params.len(), args.len()).at(pos.line, pos.column));
        }
        self.check_depth(pos)?;

        let scope = Environment::new_enclosed(&func.env);
        for (param, arg) in func.params.iter().zip(args) {
            Environment::set_local(&scope, param, arg);
        }

        let name = func.name.clone().unwrap_or_else(|| "<anonymous>".to_string());
        self.tracer.on_call(&name, self.call_stack.depth());
        self.call_stack.push_call(name, pos.line, pos.column);
        let result = self.eval_block(&func.body, &scope);
        self.call_stack.pop_call();

        unwind_call_result(result)
    }

    fn call_bound_method(&mut self, bound: &BoundMethod, args: Vec<Value>, pos: Pos) -> RunResult<Value> {
        let MethodBody::Ast(method) = &bound.method else {
            return Err(
                RunError::fatal(format!("method {} was compiled for the bytecode VM", bound.name))
                    .at(pos.line, pos.column),
            );
        };
        self.invoke_method(
            Rc::clone(&bound.receiver),
            Rc::clone(&bound.defining_class),
            &bound.name,
            &method.params,
            &method.body,
            args,
            pos,
        )
    }

    /// Runs a method body with the receiver bound to `@` and the defining
    /// class's scope as the lexical parent.
    #[expect(clippy::too_many_arguments, reason = "method invocation carries the full dispatch context")]
    fn invoke_method(
        &mut self,
        receiver: Rc<Object>,
        defining_class: Rc<Class>,
        name: &str,
        params: &[String],
        body: &Block,
        args: Vec<Value>,
        pos: Pos,
    ) -> RunResult<Value> {
        if args.len() != params.len() {
            return Err(RunError::wrong_arity(params.len(), args.len()).at(pos.line, pos.column));
        }
        self.check_depth(pos)?;

        let parent = defining_class.env.upgrade().unwrap_or_else(Environment::new_global);
        let scope = Environment::new_enclosed(&parent);
        for (param, arg) in params.iter().zip(args) {
            Environment::set_local(&scope, param, arg);
        }

        let label = format!("{}.{name}", defining_class.name);
        self.tracer.on_call(&label, self.call_stack.depth());
        self.call_stack.push_call(label, pos.line, pos.column);
        let saved_receiver = self.receiver.replace(receiver);
        let saved_method = self.current_method.replace((defining_class, name.to_string()));

        let result = self.eval_block(body, &scope);

        self.receiver = saved_receiver;
        self.current_method = saved_method;
        self.call_stack.pop_call();

        unwind_call_result(result)
    }

    fn call_builtin_method(&mut self, method: &BuiltinMethod, args: Vec<Value>, pos: Pos) -> RunResult<Value> {
        let result = match &method.receiver {
            Value::Class(class) if method.name == "new" => {
                return self.instantiate(class, args, pos);
            }
            Value::Namespace(ns) => ns.call_method(&method.name, &args),
            receiver => builtins::call_method(receiver, &method.name, &args),
        };
        result.map_err(|err| {
            let err = err.at(pos.line, pos.column);
            decorate_with_stack(err, &self.call_stack)
        })
    }

    /// `Class.new(args)`: allocate the object and run `initialize` if the
    /// class chain defines one.
    fn instantiate(&mut self, class: &Rc<Class>, args: Vec<Value>, pos: Pos) -> RunResult<Value> {
        let object = Rc::new(Object {
            class: Rc::clone(class),
            ivars: RefCell::new(AHashMap::new()),
        });

        if let Some((defining_class, MethodBody::Ast(init))) = Class::resolve_method(class, "initialize") {
            self.invoke_method(
                Rc::clone(&object),
                defining_class,
                "initialize",
                &init.params,
                &init.body,
                args,
                pos,
            )?;
        } else if !args.is_empty() {
            return Err(RunError::wrong_arity(0, args.len()).at(pos.line, pos.column));
        }

        Ok(Value::Object(object))
    }

    /// `super(args)`: same-named method on the parent of the defining class,
    /// same receiver.
    fn call_super(&mut self, args: Vec<Value>, pos: Pos) -> RunResult<Value> {
        let Some(receiver) = self.receiver.clone() else {
            return Err(RunError::fatal("super used outside of method context").at(pos.line, pos.column));
        };
        let Some((defining_class, method_name)) = self.current_method.clone() else {
            return Err(RunError::fatal("super used outside of method context").at(pos.line, pos.column));
        };
        let superclass = defining_class.superclass.borrow().clone();
        let Some(superclass) = superclass else {
            return Err(RunError::fatal(format!(
                "no superclass method {method_name} for {}",
                defining_class.name
            ))
            .at(pos.line, pos.column));
        };
        let Some((found_class, MethodBody::Ast(method))) = Class::resolve_method(&superclass, &method_name) else {
            return Err(RunError::fatal(format!(
                "no superclass method {method_name} for {}",
                defining_class.name
            ))
            .at(pos.line, pos.column));
        };
        self.invoke_method(receiver, found_class, &method_name, &method.params, &method.body, args, pos)
    }

    fn check_depth(&self, pos: Pos) -> RunResult<()> {
        if self.call_stack.depth() >= self.max_call_depth {
            Err(self.decorate(RunError::runtime_error("maximum call depth exceeded"), pos))
        } else {
            Ok(())
        }
    }

    // ----- exceptions -----

    /// Converts a thrown value into an exception signal: errors are wrapped
    /// as-is (with the stack re-captured at the throw site), everything else
    /// is coerced into a generic Error.
    fn raise(&self, value: Value, pos: Pos) -> RunError {
        let mut err = match value {
            Value::Error(err) => (*err).clone(),
            other => RushError::new(ErrorKind::Error, other.inspect()),
        };
        err.line = pos.line;
        err.column = pos.column;
        err.stack_trace = self.call_stack.format_trace();
        RunError::Exc(Box::new(err))
    }

    /// Attaches position and the current stack trace to a freshly raised
    /// error signal.
    fn decorate(&self, err: RunError, pos: Pos) -> RunError {
        decorate_with_stack(err.at(pos.line, pos.column), &self.call_stack)
    }

    fn eval_try(
        &mut self,
        body: &Block,
        catches: &[CatchClause],
        finally: Option<&Block>,
        env: &Rc<RefCell<Environment>>,
    ) -> RunResult<Value> {
        let outcome = match self.eval_block(body, env) {
            Err(RunError::Exc(err)) => self.run_catches(err, catches, env),
            other => other,
        };

        // `finally` runs on every exit path; its own signal, if any, wins.
        if let Some(finally) = finally {
            match self.eval_block(finally, env) {
                Ok(_) => {}
                Err(signal) => return Err(signal),
            }
        }

        outcome
    }

    fn run_catches(
        &mut self,
        err: Box<RushError>,
        catches: &[CatchClause],
        env: &Rc<RefCell<Environment>>,
    ) -> RunResult<Value> {
        for clause in catches {
            let handler_kind = match &clause.error_type {
                None => None,
                Some(name) => match ErrorKind::from_str(name) {
                    Ok(kind) => Some(kind),
                    Err(_) => {
                        return Err(RunError::fatal(format!("unknown error type: {name}"))
                            .at(clause.pos.line, clause.pos.column));
                    }
                },
            };
            if err.kind.matches(handler_kind) {
                let scope = Environment::new_enclosed(env);
                Environment::set_local(&scope, &clause.variable, Value::Error(Rc::new(*err)));
                return self.eval_block(&clause.body, &scope);
            }
        }
        // No clause matched: keep propagating.
        Err(RunError::Exc(err))
    }

    // ----- modules -----

    fn eval_import(
        &mut self,
        module: &str,
        items: &[ImportItem],
        env: &Rc<RefCell<Environment>>,
        pos: Pos,
    ) -> RunResult<Value> {
        let exports = self.load_module(module, pos)?;
        for item in items {
            let Some(value) = exports.get(&item.name) else {
                return Err(RunError::fatal(format!("module {module} has no export {}", item.name))
                    .at(pos.line, pos.column));
            };
            let binding = item.alias.as_ref().unwrap_or(&item.name);
            Environment::set_local(env, binding, value.clone());
        }
        Ok(Value::Null)
    }

    /// Resolves, evaluates and caches a module; later imports reuse the
    /// exports map.
    pub fn load_module(&mut self, name: &str, pos: Pos) -> RunResult<Rc<IndexMap<String, Value>>> {
        if let Some(exports) = self.module_cache.get(name) {
            return Ok(Rc::clone(exports));
        }
        let Some(source) = self.resolver.resolve(name) else {
            return Err(RunError::fatal(format!("module not found: {name}")).at(pos.line, pos.column));
        };
        let (program, errors) = parser::parse(&source);
        if let Some(first) = errors.first() {
            return Err(RunError::fatal(format!("syntax error in module {name}: {first}")).at(pos.line, pos.column));
        }

        let module_env = Environment::new_global();
        self.exports.push(IndexMap::new());
        let result = self.eval_program(&program, &module_env);
        let exports = Rc::new(self.exports.pop().unwrap_or_default());
        result?;

        self.module_cache.insert(name.to_string(), Rc::clone(&exports));
        Ok(exports)
    }

    /// Exports collected from the most recent top-level evaluation.
    #[must_use]
    pub fn top_level_exports(&self) -> &IndexMap<String, Value> {
        self.exports.first().expect("base export frame always exists")
    }

    // ----- classes -----

    fn eval_class_decl(&mut self, decl: &ClassDecl, env: &Rc<RefCell<Environment>>, pos: Pos) -> RunResult<()> {
        let superclass = match &decl.superclass {
            None => None,
            Some(name) => match Environment::get(env, name) {
                Some(Value::Class(class)) => Some(class),
                Some(other) => {
                    return Err(RunError::fatal(format!("superclass {name} is not a class, got {}", other.type_name()))
                        .at(pos.line, pos.column));
                }
                None => {
                    return Err(RunError::fatal(format!("identifier not found: {name}")).at(pos.line, pos.column));
                }
            },
        };

        let methods = decl
            .methods
            .iter()
            .map(|method| (method.name.clone(), MethodBody::Ast(Rc::new(method.clone()))))
            .collect();

        let class = Class {
            name: decl.name.clone(),
            superclass: RefCell::new(superclass),
            methods: RefCell::new(methods),
            env: Rc::downgrade(env),
        };
        Environment::set(env, &decl.name, Value::Class(Rc::new(class)));
        Ok(())
    }
}

fn loop_signal_error(signal: &str, pos: Pos) -> RunError {
    RunError::fatal(format!("{signal} outside of loop")).at(pos.line, pos.column)
}

/// Resolves a finished call: `return` becomes the call's value, and loop
/// signals must not cross the function boundary.
fn unwind_call_result(result: RunResult<Value>) -> RunResult<Value> {
    match result {
        Err(RunError::Return(value)) => Ok(value),
        Err(RunError::Break) => Err(RunError::fatal("break outside of loop")),
        Err(RunError::Continue) => Err(RunError::fatal("continue outside of loop")),
        other => other,
    }
}

/// `receiver[index]`, shared by both engines. Arrays take integer indexes
/// (out of range is a catchable IndexError); hash lookups canonicalize the
/// key and yield null when absent; string indexing is byte-oriented.
pub(crate) fn index_value(receiver: &Value, index: &Value) -> RunResult<Value> {
    match (receiver, index) {
        (Value::Array(values), Value::Integer(i)) => {
            let values = values.borrow();
            if *i < 0 || *i >= values.len() as i64 {
                return Err(RunError::index_error(format!("index out of range: {i}")));
            }
            Ok(values[*i as usize].clone())
        }
        (Value::Array(_), other) => Err(RunError::fatal(format!(
            "array index must be INTEGER, got {}",
            other.type_name()
        ))),
        (Value::Hash(map), key) => {
            let key = builtins::hash_methods::hashable(key)?;
            Ok(map.borrow().get(&key).cloned().unwrap_or(Value::Null))
        }
        (Value::Str(s), Value::Integer(i)) => builtins::string_methods::index(s, *i),
        (other, _) => Err(RunError::fatal(format!(
            "index operator not supported: {}",
            other.type_name()
        ))),
    }
}

/// `target[index] = value`: arrays mutate in place, hashes insert or
/// overwrite.
pub(crate) fn index_assign(target: &Value, index: &Value, value: Value) -> RunResult<()> {
    match (target, index) {
        (Value::Array(values), Value::Integer(i)) => {
            let mut values = values.borrow_mut();
            if *i < 0 || *i >= values.len() as i64 {
                return Err(RunError::index_error(format!("index out of range: {i}")));
            }
            values[*i as usize] = value;
            Ok(())
        }
        (Value::Array(_), other) => Err(RunError::fatal(format!(
            "array index must be INTEGER, got {}",
            other.type_name()
        ))),
        (Value::Hash(map), key) => {
            let key = builtins::hash_methods::hashable(key)?;
            map.borrow_mut().insert(key, value);
            Ok(())
        }
        (other, _) => Err(RunError::fatal(format!(
            "index assignment not supported: {}",
            other.type_name()
        ))),
    }
}

/// Fills in the stack trace of a freshly created exception signal.
fn decorate_with_stack(err: RunError, stack: &CallStack) -> RunError {
    match err {
        RunError::Exc(mut e) => {
            if e.stack_trace.is_empty() {
                e.stack_trace = stack.format_trace();
            }
            RunError::Exc(e)
        }
        other => other,
    }
}
