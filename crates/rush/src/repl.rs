//! Persistent interactive sessions.
//!
//! A [`ReplSession`] keeps the global environment, module cache and call
//! stack alive across `eval` calls, so interactive snippets share variables,
//! functions and classes. Each call returns the printable form of the last
//! expression, or `ERROR: <message>` for failures.

use std::{cell::RefCell, rc::Rc};

use rand::SeedableRng as _;
use rand_chacha::ChaCha8Rng;

use crate::{
    env::Environment,
    error::{RunError, RushError},
    eval::Evaluator,
    io::{PrintWriter, StdPrint},
    parser,
    resolver::{ModuleResolver, StaticResolver},
    tracer::NoopTracer,
    value::Value,
};

/// A REPL session with persistent interpreter state.
pub struct ReplSession {
    evaluator: Evaluator,
    env: Rc<RefCell<Environment>>,
}

impl Default for ReplSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplSession {
    /// A session printing to stdout, with no modules registered.
    #[must_use]
    pub fn new() -> Self {
        Self::with_parts(Box::new(StdPrint), Rc::new(StaticResolver::new()), None)
    }

    /// A fully configured session. `rng_seed` pins the RNG for reproducible
    /// runs.
    #[must_use]
    pub fn with_parts(print: Box<dyn PrintWriter>, resolver: Rc<dyn ModuleResolver>, rng_seed: Option<u64>) -> Self {
        let rng = match rng_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            evaluator: Evaluator::new(rng, print, resolver, Box::new(NoopTracer)),
            env: Environment::new_global(),
        }
    }

    /// Evaluates one input line against the session state, returning the
    /// value of the last expression.
    pub fn eval_value(&mut self, line: &str) -> Result<Value, RushError> {
        let (program, errors) = parser::parse(line);
        if let Some(first) = errors.first() {
            return Err(RushError::new(crate::error::ErrorKind::Error, first.to_string()));
        }
        match self.evaluator.eval_program(&program, &self.env) {
            Ok(value) | Err(RunError::Return(value)) => Ok(value),
            Err(RunError::Exc(err) | RunError::Fatal(err)) => Err(*err),
            Err(RunError::Break | RunError::Continue) => Err(RushError::new(
                crate::error::ErrorKind::Error,
                "break outside of loop",
            )),
        }
    }

    /// Evaluates one line and renders the result the way the interactive
    /// prompt shows it: `inspect()` output, or `ERROR: <message>`.
    pub fn eval(&mut self, line: &str) -> String {
        match self.eval_value(line) {
            Ok(value) => value.inspect(),
            Err(err) => format!("ERROR: {}", err.message),
        }
    }
}
