//! Execution tracing hooks.
//!
//! Both engines report call entry and (for the VM) opcode dispatch through an
//! [`ExecTracer`], so hosts can observe execution without forking the
//! interpreter. The default tracer does nothing.

/// Observer for interpreter execution events.
pub trait ExecTracer {
    /// A user function or method is being entered.
    fn on_call(&mut self, _name: &str, _depth: usize) {}

    /// The VM is about to execute an opcode.
    fn on_op(&mut self, _op: &str) {}
}

/// Tracer that ignores every event.
#[derive(Debug, Default)]
pub struct NoopTracer;

impl ExecTracer for NoopTracer {}

/// Tracer that prints every event to stderr; useful for debugging.
#[derive(Debug, Default)]
pub struct StderrTracer;

impl ExecTracer for StderrTracer {
    fn on_call(&mut self, name: &str, depth: usize) {
        eprintln!("{}call {name}", "  ".repeat(depth));
    }

    fn on_op(&mut self, op: &str) {
        eprintln!("op {op}");
    }
}
