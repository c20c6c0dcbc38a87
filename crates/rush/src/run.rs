//! Host entry point: run one source string to a final value.
//!
//! A [`Runner`] parses its source once at construction and can execute it
//! repeatedly, on either engine. Host facilities (module resolver, print
//! sink, RNG seed, call-depth limit) are injected here.

use std::rc::Rc;

use rand::SeedableRng as _;
use rand_chacha::ChaCha8Rng;

use crate::{
    ast::Program,
    bytecode::{Compiler, VM},
    env::Environment,
    error::{ErrorKind, RunError, RushError, SyntaxError},
    eval::{DEFAULT_MAX_CALL_DEPTH, Evaluator},
    io::{PrintWriter, StdPrint},
    parser,
    resolver::{ModuleResolver, StaticResolver},
    tracer::{ExecTracer, NoopTracer},
    value::Value,
};

/// Which execution path to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Engine {
    /// The tree-walking evaluator (the semantic reference).
    #[default]
    TreeWalking,
    /// The bytecode compiler + stack VM.
    Bytecode,
}

/// Parses a source string once and runs it on demand.
pub struct Runner {
    program: Program,
    engine: Engine,
    resolver: Rc<dyn ModuleResolver>,
    rng_seed: Option<u64>,
    max_call_depth: usize,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("program", &self.program)
            .field("engine", &self.engine)
            .field("rng_seed", &self.rng_seed)
            .field("max_call_depth", &self.max_call_depth)
            .finish_non_exhaustive()
    }
}

impl Runner {
    /// Parses `source`. Syntax errors are returned as a list; the runner is
    /// only constructed for a clean parse.
    pub fn new(source: &str) -> Result<Self, Vec<SyntaxError>> {
        let (program, errors) = parser::parse(source);
        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(Self {
            program,
            engine: Engine::default(),
            resolver: Rc::new(StaticResolver::new()),
            rng_seed: None,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        })
    }

    #[must_use]
    pub fn with_engine(mut self, engine: Engine) -> Self {
        self.engine = engine;
        self
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: Rc<dyn ModuleResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Deterministic RNG override for tests; without it the generator seeds
    /// from OS entropy once per run.
    #[must_use]
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    #[must_use]
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Runs the program, printing to stdout.
    pub fn run(&self) -> Result<Value, RushError> {
        self.run_with(Box::new(StdPrint), Box::new(NoopTracer))
    }

    /// Runs the program with an explicit print sink and tracer.
    pub fn run_with(&self, print: Box<dyn PrintWriter>, tracer: Box<dyn ExecTracer>) -> Result<Value, RushError> {
        let rng = match self.rng_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        match self.engine {
            Engine::TreeWalking => {
                let mut evaluator = Evaluator::new(rng, print, Rc::clone(&self.resolver), tracer);
                evaluator.set_max_call_depth(self.max_call_depth);
                let env = Environment::new_global();
                finish(evaluator.eval_program(&self.program, &env))
            }
            Engine::Bytecode => {
                let bytecode = Compiler::new()
                    .compile(&self.program)
                    .map_err(|err| RushError::new(ErrorKind::Error, err.message))?;
                let mut vm = VM::new(rng, print, Rc::clone(&self.resolver), tracer);
                vm.set_max_call_depth(self.max_call_depth);
                finish(vm.run(bytecode))
            }
        }
    }
}

/// Maps the evaluator signal channel onto the host-facing result.
fn finish(result: Result<Value, RunError>) -> Result<Value, RushError> {
    match result {
        Ok(value) | Err(RunError::Return(value)) => Ok(value),
        Err(RunError::Exc(err) | RunError::Fatal(err)) => Err(*err),
        Err(RunError::Break | RunError::Continue) => {
            Err(RushError::new(ErrorKind::Error, "break outside of loop"))
        }
    }
}
