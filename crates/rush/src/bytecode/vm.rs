//! Stack-based virtual machine.
//!
//! Frames hold the executing closure, its instruction pointer and a base
//! pointer into the shared value stack; locals live in stack slots above the
//! base pointer. Exception handlers are registered by `TryBegin` as
//! (frame, handler ip, stack height) records; `Throw` and catchable runtime
//! failures unwind frames to the innermost record, bind the error and resume
//! at the handler.
//!
//! `import` delegates module evaluation to an embedded tree-walking
//! evaluator; the shared value model makes the result indistinguishable.

use std::{cell::RefCell, rc::Rc};

use ahash::AHashMap;
use indexmap::IndexMap;
use rand_chacha::ChaCha8Rng;

use crate::{
    ast::{InfixOp, Pos, PrefixOp},
    builtins::{self, Builtin, BuiltinCtx},
    bytecode::{
        CompiledFunction,
        compiler::Bytecode,
        op::Opcode,
    },
    error::{ErrorKind, RunError, RunResult, RushError},
    eval::{self, Evaluator, binary},
    io::{PrintWriter, SharedBufferPrint},
    modules::Namespace,
    resolver::ModuleResolver,
    tracer::ExecTracer,
    value::{Class, Closure, HashKey, MethodBody, Object, Value},
};

/// One call record: the closure being executed plus its frame layout and
/// method context.
#[derive(Debug)]
struct Frame {
    closure: Rc<Closure>,
    ip: usize,
    bp: usize,
    receiver: Option<Rc<Object>>,
    defining_class: Option<Rc<Class>>,
    /// When set, a `Return` from this frame pushes this value instead of the
    /// returned one (constructor frames return the new object).
    ctor_result: Option<Value>,
    name: String,
}

/// An active exception handler.
#[derive(Debug, Clone, Copy)]
struct TryRecord {
    handler_ip: usize,
    frame_index: usize,
    stack_len: usize,
}

/// The virtual machine. Globals persist across `run` calls so a host can
/// feed it successive compilation units.
pub struct VM {
    globals: Vec<Value>,
    constants: Vec<Value>,
    stack: Vec<Value>,
    frames: Vec<Frame>,
    try_records: Vec<TryRecord>,
    last_popped: Value,
    exports: IndexMap<String, Value>,

    rng: ChaCha8Rng,
    print: Box<dyn PrintWriter>,
    tracer: Box<dyn ExecTracer>,
    max_call_depth: usize,
    /// Evaluates imported modules; shares the resolver, not the globals.
    module_loader: Evaluator,
    module_print: Rc<RefCell<String>>,
}

impl VM {
    #[must_use]
    pub fn new(
        rng: ChaCha8Rng,
        print: Box<dyn PrintWriter>,
        resolver: Rc<dyn ModuleResolver>,
        tracer: Box<dyn ExecTracer>,
    ) -> Self {
        use rand::{Rng as _, SeedableRng as _};

        let mut rng = rng;
        let loader_rng = ChaCha8Rng::seed_from_u64(rng.r#gen());
        let loader_print = SharedBufferPrint::new();
        let module_print = loader_print.handle();
        let module_loader = Evaluator::new(
            loader_rng,
            Box::new(loader_print),
            resolver,
            Box::new(crate::tracer::NoopTracer),
        );

        let mut globals = Vec::new();
        for ns in Namespace::ALL {
            globals.push(Value::Namespace(ns));
        }

        Self {
            globals,
            constants: vec![],
            stack: vec![],
            frames: vec![],
            try_records: vec![],
            last_popped: Value::Null,
            exports: IndexMap::new(),
            rng,
            print,
            tracer,
            max_call_depth: eval::DEFAULT_MAX_CALL_DEPTH,
            module_loader,
            module_print,
        }
    }

    pub fn set_max_call_depth(&mut self, depth: usize) {
        self.max_call_depth = depth;
    }

    /// Bindings exported by `export` statements in the last run.
    #[must_use]
    pub fn exports(&self) -> &IndexMap<String, Value> {
        &self.exports
    }

    /// Executes a compiled program. The result is the last popped expression
    /// value, or the value of a top-level `return`.
    pub fn run(&mut self, bytecode: Bytecode) -> RunResult<Value> {
        self.constants = bytecode.constants;
        self.stack.clear();
        self.frames.clear();
        self.try_records.clear();
        self.last_popped = Value::Null;

        let main = Rc::new(Closure {
            func: Rc::new(CompiledFunction {
                instructions: bytecode.instructions,
                num_locals: 0,
                num_parameters: 0,
                name: None,
            }),
            free: vec![],
        });
        self.frames.push(Frame {
            closure: main,
            ip: 0,
            bp: 0,
            receiver: None,
            defining_class: None,
            ctor_result: None,
            name: "<main>".to_string(),
        });

        self.run_loop()
    }

    fn run_loop(&mut self) -> RunResult<Value> {
        loop {
            let frame = self.frames.last().expect("at least the main frame");
            if frame.ip >= frame.closure.func.instructions.len() {
                if self.frames.len() == 1 {
                    return Ok(std::mem::replace(&mut self.last_popped, Value::Null));
                }
                // Bodies always end in Return/ReturnVoid; treat a fall-off
                // defensively as a void return.
                if let Some(result) = self.do_return(Value::Null) {
                    return Ok(result);
                }
                continue;
            }

            let op_byte = self.fetch_u8();
            let Some(op) = Opcode::from_repr(op_byte) else {
                return Err(RunError::fatal(format!("unknown opcode {op_byte}")));
            };
            self.tracer.on_op(&op.to_string());

            match op {
                Opcode::Constant => {
                    let idx = self.fetch_u16();
                    self.stack.push(self.constants[idx].clone());
                }
                Opcode::Pop => {
                    self.last_popped = self.pop();
                }
                Opcode::Dup => {
                    let top = self.stack.last().expect("dup on non-empty stack").clone();
                    self.stack.push(top);
                }
                Opcode::Swap => {
                    let len = self.stack.len();
                    self.stack.swap(len - 1, len - 2);
                }

                Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod => {
                    let right = self.pop();
                    let left = self.pop();
                    let infix = match op {
                        Opcode::Add => InfixOp::Plus,
                        Opcode::Sub => InfixOp::Minus,
                        Opcode::Mul => InfixOp::Asterisk,
                        Opcode::Div => InfixOp::Slash,
                        _ => InfixOp::Percent,
                    };
                    match binary::eval_infix(infix, &left, &right) {
                        Ok(value) => self.stack.push(value),
                        Err(err) => self.handle(err)?,
                    }
                }
                Opcode::Minus => {
                    let value = self.pop();
                    match binary::eval_prefix(PrefixOp::Minus, &value) {
                        Ok(value) => self.stack.push(value),
                        Err(err) => self.handle(err)?,
                    }
                }
                Opcode::Not => {
                    let value = self.pop();
                    self.stack.push(Value::Boolean(!value.is_truthy()));
                }
                Opcode::And => {
                    let right = self.pop();
                    let left = self.pop();
                    self.stack.push(Value::Boolean(left.is_truthy() && right.is_truthy()));
                }
                Opcode::Or => {
                    let right = self.pop();
                    let left = self.pop();
                    self.stack.push(Value::Boolean(left.is_truthy() || right.is_truthy()));
                }

                Opcode::Equal | Opcode::NotEqual | Opcode::GreaterThan | Opcode::GreaterEqual => {
                    let right = self.pop();
                    let left = self.pop();
                    let infix = match op {
                        Opcode::Equal => InfixOp::Eq,
                        Opcode::NotEqual => InfixOp::NotEq,
                        Opcode::GreaterThan => InfixOp::Gt,
                        _ => InfixOp::GtEq,
                    };
                    match binary::eval_infix(infix, &left, &right) {
                        Ok(value) => self.stack.push(value),
                        Err(err) => self.handle(err)?,
                    }
                }

                Opcode::True => self.stack.push(Value::Boolean(true)),
                Opcode::False => self.stack.push(Value::Boolean(false)),
                Opcode::Null => self.stack.push(Value::Null),

                Opcode::Jump => {
                    let target = self.fetch_u16();
                    self.frame_mut().ip = target;
                }
                Opcode::JumpNotTruthy => {
                    let target = self.fetch_u16();
                    let condition = self.pop();
                    if !condition.is_truthy() {
                        self.frame_mut().ip = target;
                    }
                }
                Opcode::JumpTruthy => {
                    let target = self.fetch_u16();
                    let condition = self.pop();
                    if condition.is_truthy() {
                        self.frame_mut().ip = target;
                    }
                }

                Opcode::GetGlobal => {
                    let idx = self.fetch_u16();
                    let value = self.globals.get(idx).cloned().unwrap_or(Value::Null);
                    self.stack.push(value);
                }
                Opcode::SetGlobal => {
                    let idx = self.fetch_u16();
                    let value = self.pop();
                    if idx >= self.globals.len() {
                        self.globals.resize(idx + 1, Value::Null);
                    }
                    self.globals[idx] = value;
                }
                Opcode::GetLocal => {
                    let slot = self.fetch_u8() as usize;
                    let bp = self.frame().bp;
                    let value = self.stack[bp + slot].clone();
                    self.stack.push(value);
                }
                Opcode::SetLocal => {
                    let slot = self.fetch_u8() as usize;
                    let value = self.pop();
                    let bp = self.frame().bp;
                    self.stack[bp + slot] = value;
                }
                Opcode::GetBuiltin => {
                    let id = self.fetch_u8();
                    let Some(builtin) = Builtin::from_repr(id) else {
                        return Err(RunError::fatal(format!("unknown builtin id {id}")));
                    };
                    self.stack.push(Value::Builtin(builtin));
                }
                Opcode::GetFree => {
                    let idx = self.fetch_u8() as usize;
                    let value = self.frame().closure.free[idx].clone();
                    self.stack.push(value);
                }

                Opcode::Array => {
                    let count = self.fetch_u16();
                    let start = self.stack.len() - count;
                    let values = self.stack.split_off(start);
                    self.stack.push(Value::array(values));
                }
                Opcode::Hash => {
                    let count = self.fetch_u16();
                    let start = self.stack.len() - count * 2;
                    let flat = self.stack.split_off(start);
                    let mut map = IndexMap::with_capacity(count);
                    let mut failed = None;
                    let mut items = flat.into_iter();
                    while let (Some(key), Some(value)) = (items.next(), items.next()) {
                        match builtins::hash_methods::hashable(&key) {
                            Ok(key) => {
                                map.insert(key, value);
                            }
                            Err(err) => {
                                failed = Some(err);
                                break;
                            }
                        }
                    }
                    match failed {
                        None => self.stack.push(Value::hash(map)),
                        Some(err) => self.handle(err)?,
                    }
                }
                Opcode::Index => {
                    let index = self.pop();
                    let receiver = self.pop();
                    match eval::index_value(&receiver, &index) {
                        Ok(value) => self.stack.push(value),
                        Err(err) => self.handle(err)?,
                    }
                }
                Opcode::SetIndex => {
                    let value = self.pop();
                    let index = self.pop();
                    let target = self.pop();
                    if let Err(err) = eval::index_assign(&target, &index, value) {
                        self.handle(err)?;
                    }
                }

                Opcode::GetProperty => {
                    let name = self.constant_string()?;
                    let receiver = self.pop();
                    match builtins::resolve_property(receiver, &name) {
                        Ok(value) => self.stack.push(value),
                        Err(err) => self.handle(err)?,
                    }
                }
                Opcode::SetProperty => {
                    let name = self.constant_string()?;
                    let value = self.pop();
                    let receiver = self.pop();
                    match receiver {
                        Value::Hash(map) => {
                            map.borrow_mut().insert(HashKey::Str(Rc::from(&*name)), value);
                        }
                        other => {
                            return Err(RunError::fatal(format!(
                                "property assignment not supported: {}",
                                other.type_name()
                            )));
                        }
                    }
                }

                Opcode::Class => {
                    let name = self.constant_string()?;
                    self.stack.push(Value::Class(Rc::new(Class {
                        name: name.to_string(),
                        superclass: RefCell::new(None),
                        methods: RefCell::new(AHashMap::new()),
                        env: std::rc::Weak::new(),
                    })));
                }
                Opcode::Inherit => {
                    let superclass = self.pop();
                    let Value::Class(superclass) = superclass else {
                        return Err(RunError::fatal(format!(
                            "superclass is not a class, got {}",
                            superclass.type_name()
                        )));
                    };
                    let Some(Value::Class(class)) = self.stack.last() else {
                        return Err(RunError::fatal("Inherit expects a class under construction"));
                    };
                    *class.superclass.borrow_mut() = Some(superclass);
                }
                Opcode::Method => {
                    let name = self.constant_string()?;
                    let method = self.pop();
                    let Value::Closure(closure) = method else {
                        return Err(RunError::fatal("Method expects a closure"));
                    };
                    let Some(Value::Class(class)) = self.stack.last() else {
                        return Err(RunError::fatal("Method expects a class under construction"));
                    };
                    class
                        .methods
                        .borrow_mut()
                        .insert(name.to_string(), MethodBody::Compiled(closure));
                }
                Opcode::GetInstance => {
                    let name = self.constant_string()?;
                    let Some(receiver) = self.frame().receiver.clone() else {
                        return Err(RunError::fatal(format!(
                            "instance variable @{name} used outside of object context"
                        )));
                    };
                    let value = receiver.ivars.borrow().get(&*name).cloned().unwrap_or(Value::Null);
                    self.stack.push(value);
                }
                Opcode::SetInstance => {
                    let name = self.constant_string()?;
                    let value = self.pop();
                    let Some(receiver) = self.frame().receiver.clone() else {
                        return Err(RunError::fatal(format!(
                            "instance variable @{name} used outside of object context"
                        )));
                    };
                    receiver.ivars.borrow_mut().insert(name.to_string(), value);
                }
                Opcode::GetSuper => {
                    let name = self.constant_string()?;
                    self.exec_get_super(&name)?;
                }

                Opcode::Closure => {
                    let fn_idx = self.fetch_u16();
                    let free_count = self.fetch_u8() as usize;
                    let Value::CompiledFunction(func) = &self.constants[fn_idx] else {
                        return Err(RunError::fatal("Closure expects a function constant"));
                    };
                    let func = Rc::clone(func);
                    let start = self.stack.len() - free_count;
                    let free = self.stack.split_off(start);
                    self.stack.push(Value::Closure(Rc::new(Closure { func, free })));
                }
                Opcode::CurrentClosure => {
                    let closure = Rc::clone(&self.frame().closure);
                    self.stack.push(Value::Closure(closure));
                }

                Opcode::Call => {
                    let argc = self.fetch_u8() as usize;
                    self.exec_call(argc)?;
                }
                Opcode::Return => {
                    let value = self.pop();
                    if let Some(result) = self.do_return(value) {
                        return Ok(result);
                    }
                }
                Opcode::ReturnVoid => {
                    if let Some(result) = self.do_return(Value::Null) {
                        return Ok(result);
                    }
                }

                Opcode::Throw => {
                    let value = self.pop();
                    let err = self.coerce_throw(value);
                    self.unwind(err)?;
                }
                Opcode::TryBegin => {
                    let handler_ip = self.fetch_u16();
                    self.try_records.push(TryRecord {
                        handler_ip,
                        frame_index: self.frames.len() - 1,
                        stack_len: self.stack.len(),
                    });
                }
                Opcode::TryEnd => {
                    self.try_records.pop();
                }
                Opcode::Catch => {
                    let slot = self.fetch_u8() as usize;
                    let value = self.pop();
                    let bp = self.frame().bp;
                    self.stack[bp + slot] = value;
                }
                Opcode::Finally => {}

                Opcode::Import => {
                    let member = self.pop();
                    let module = self.pop();
                    let (Value::Str(module), Value::Str(member)) = (module, member) else {
                        return Err(RunError::fatal("Import expects module and member names"));
                    };
                    self.exec_import(&module, &member)?;
                }
                Opcode::Export => {
                    let name = self.constant_string()?;
                    let value = self.pop();
                    self.exports.insert(name.to_string(), value);
                }
            }
        }
    }

    // ----- fetch/stack plumbing -----

    fn frame(&self) -> &Frame {
        self.frames.last().expect("active frame")
    }

    fn frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("active frame")
    }

    fn fetch_u8(&mut self) -> u8 {
        let frame = self.frames.last_mut().expect("active frame");
        let byte = frame.closure.func.instructions[frame.ip];
        frame.ip += 1;
        byte
    }

    fn fetch_u16(&mut self) -> usize {
        let frame = self.frames.last_mut().expect("active frame");
        let hi = frame.closure.func.instructions[frame.ip];
        let lo = frame.closure.func.instructions[frame.ip + 1];
        frame.ip += 2;
        u16::from_be_bytes([hi, lo]) as usize
    }

    /// Fetches a u16 constant-pool operand that must be a string.
    fn constant_string(&mut self) -> RunResult<Rc<str>> {
        let idx = self.fetch_u16();
        match &self.constants[idx] {
            Value::Str(s) => Ok(Rc::clone(s)),
            other => Err(RunError::fatal(format!(
                "expected string constant, got {}",
                other.type_name()
            ))),
        }
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("stack underflow")
    }

    // ----- calls and frames -----

    fn exec_call(&mut self, argc: usize) -> RunResult<()> {
        let callee_idx = self.stack.len() - 1 - argc;
        let callee = self.stack[callee_idx].clone();
        match callee {
            Value::Closure(closure) => self.push_frame(closure, argc, None, None, None),
            Value::BoundMethod(bound) => match &bound.method {
                MethodBody::Compiled(closure) => self.push_frame(
                    Rc::clone(closure),
                    argc,
                    Some(Rc::clone(&bound.receiver)),
                    Some(Rc::clone(&bound.defining_class)),
                    None,
                ),
                // Methods of classes defined in imported modules live as AST;
                // they run on the embedded evaluator.
                MethodBody::Ast(_) => self.delegate_call(Value::BoundMethod(bound), callee_idx),
            },
            Value::BuiltinMethod(method) => {
                if let Value::Class(class) = &method.receiver {
                    if method.name == "new" {
                        let class = Rc::clone(class);
                        match Class::resolve_method(&class, "initialize") {
                            Some((_, MethodBody::Ast(_))) => {
                                return self.delegate_call(Value::BuiltinMethod(method), callee_idx);
                            }
                            _ => return self.exec_instantiate(&class, argc),
                        }
                    }
                }
                let args = self.stack.split_off(callee_idx + 1);
                self.pop();
                let result = match &method.receiver {
                    Value::Namespace(ns) => ns.call_method(&method.name, &args),
                    receiver => builtins::call_method(receiver, &method.name, &args),
                };
                match result {
                    Ok(value) => {
                        self.stack.push(value);
                        Ok(())
                    }
                    Err(err) => self.handle(err),
                }
            }
            // Functions imported from modules are AST values; they run on
            // the embedded evaluator, sharing the value model.
            Value::Function(_) => self.delegate_call(callee, callee_idx),
            Value::Builtin(builtin) => {
                let args = self.stack.split_off(callee_idx + 1);
                self.pop();
                let mut ctx = BuiltinCtx {
                    rng: &mut self.rng,
                    print: &mut *self.print,
                };
                match builtin.call(&args, &mut ctx) {
                    Ok(value) => {
                        self.stack.push(value);
                        Ok(())
                    }
                    Err(err) => self.handle(err),
                }
            }
            Value::ErrorCtor(kind) => {
                let args = self.stack.split_off(callee_idx + 1);
                self.pop();
                match kind.construct(&args) {
                    Ok(value) => {
                        self.stack.push(value);
                        Ok(())
                    }
                    Err(err) => self.handle(err),
                }
            }
            other => Err(RunError::fatal(format!("not a function: {}", other.type_name()))),
        }
    }

    /// Runs a tree-walking callable (imported function, AST-backed method)
    /// on the embedded evaluator and pushes its result.
    fn delegate_call(&mut self, callee: Value, callee_idx: usize) -> RunResult<()> {
        let args = self.stack.split_off(callee_idx + 1);
        self.pop();
        let result = self.module_loader.call_value(callee, args, Pos::default());
        let printed = std::mem::take(&mut *self.module_print.borrow_mut());
        if !printed.is_empty() {
            self.print.write(&printed)?;
        }
        match result {
            Ok(value) => {
                self.stack.push(value);
                Ok(())
            }
            Err(err) => self.handle(err),
        }
    }

    fn push_frame(
        &mut self,
        closure: Rc<Closure>,
        argc: usize,
        receiver: Option<Rc<Object>>,
        defining_class: Option<Rc<Class>>,
        ctor_result: Option<Value>,
    ) -> RunResult<()> {
        if argc != closure.func.num_parameters {
            return Err(RunError::wrong_arity(closure.func.num_parameters, argc));
        }
        if self.frames.len() >= self.max_call_depth {
            // Drop the callee and arguments before unwinding to a handler.
            let callee_idx = self.stack.len() - 1 - argc;
            self.stack.truncate(callee_idx);
            return self.handle(RunError::runtime_error("maximum call depth exceeded"));
        }

        let bp = self.stack.len() - argc;
        self.stack.resize(bp + closure.func.num_locals, Value::Null);
        let name = closure.func.name.clone().unwrap_or_else(|| "<anonymous>".to_string());
        self.tracer.on_call(&name, self.frames.len());
        self.frames.push(Frame {
            closure,
            ip: 0,
            bp,
            receiver,
            defining_class,
            ctor_result,
            name,
        });
        Ok(())
    }

    /// Pops the current frame. Returns `Some(result)` when the main frame
    /// returned, ending the program.
    fn do_return(&mut self, value: Value) -> Option<Value> {
        let frame = self.frames.pop().expect("active frame");
        if self.frames.is_empty() {
            return Some(frame.ctor_result.unwrap_or(value));
        }
        self.try_records.retain(|record| record.frame_index < self.frames.len());
        self.stack.truncate(frame.bp - 1); // also drops the callee
        self.stack.push(frame.ctor_result.unwrap_or(value));
        None
    }

    /// `Class.new(...)`: allocate the object, then run `initialize` as a
    /// constructor frame whose return value is the object itself.
    fn exec_instantiate(&mut self, class: &Rc<Class>, argc: usize) -> RunResult<()> {
        let object = Rc::new(Object {
            class: Rc::clone(class),
            ivars: RefCell::new(AHashMap::new()),
        });

        match Class::resolve_method(class, "initialize") {
            Some((defining_class, MethodBody::Compiled(init))) => self.push_frame(
                init,
                argc,
                Some(Rc::clone(&object)),
                Some(defining_class),
                Some(Value::Object(object)),
            ),
            Some((_, MethodBody::Ast(_))) => Err(RunError::fatal(
                "constructor was defined for the tree-walking evaluator",
            )),
            None => {
                if argc != 0 {
                    return Err(RunError::wrong_arity(0, argc));
                }
                self.pop(); // the bound `new`
                self.stack.push(Value::Object(object));
                Ok(())
            }
        }
    }

    fn exec_get_super(&mut self, name: &str) -> RunResult<()> {
        let frame = self.frame();
        let (Some(receiver), Some(defining_class)) = (frame.receiver.clone(), frame.defining_class.clone()) else {
            return Err(RunError::fatal("super used outside of method context"));
        };
        let superclass = defining_class.superclass.borrow().clone();
        let Some(superclass) = superclass else {
            return Err(RunError::fatal(format!(
                "no superclass method {name} for {}",
                defining_class.name
            )));
        };
        let Some((found_class, method)) = Class::resolve_method(&superclass, name) else {
            return Err(RunError::fatal(format!(
                "no superclass method {name} for {}",
                defining_class.name
            )));
        };
        self.stack
            .push(Value::BoundMethod(Rc::new(crate::value::BoundMethod {
                receiver,
                defining_class: found_class,
                name: name.to_string(),
                method,
            })));
        Ok(())
    }

    fn exec_import(&mut self, module: &str, member: &str) -> RunResult<()> {
        let exports = self.module_loader.load_module(module, Pos::default())?;
        // Forward anything the module printed at load time.
        let printed = std::mem::take(&mut *self.module_print.borrow_mut());
        if !printed.is_empty() {
            self.print.write(&printed)?;
        }
        let Some(value) = exports.get(member) else {
            return Err(RunError::fatal(format!("module {module} has no export {member}")));
        };
        self.stack.push(value.clone());
        Ok(())
    }

    // ----- exceptions -----

    fn coerce_throw(&self, value: Value) -> Box<RushError> {
        let mut err = match value {
            Value::Error(err) => (*err).clone(),
            other => RushError::new(ErrorKind::Error, other.inspect()),
        };
        err.stack_trace = self.format_trace();
        Box::new(err)
    }

    fn format_trace(&self) -> String {
        let mut out = String::new();
        for frame in self.frames.iter().skip(1).rev() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("  at ");
            out.push_str(&frame.name);
        }
        out
    }

    /// Routes an operation failure: catchable exceptions unwind to a
    /// handler, everything else aborts the run.
    fn handle(&mut self, err: RunError) -> RunResult<()> {
        match err {
            RunError::Exc(mut e) => {
                if e.stack_trace.is_empty() {
                    e.stack_trace = self.format_trace();
                }
                self.unwind(e)
            }
            other => Err(other),
        }
    }

    /// Unwinds to the innermost try record, binding the error value on the
    /// handler's stack; with no handler the exception leaves the VM.
    fn unwind(&mut self, err: Box<RushError>) -> RunResult<()> {
        let Some(record) = self.try_records.pop() else {
            return Err(RunError::Exc(err));
        };
        self.frames.truncate(record.frame_index + 1);
        self.stack.truncate(record.stack_len);
        self.frame_mut().ip = record.handler_ip;
        self.stack.push(Value::Error(Rc::new(*err)));
        Ok(())
    }
}
