//! Output sink for the `print` builtin.
//!
//! Implement [`PrintWriter`] to capture or redirect print output from
//! embedded programs; [`StdPrint`] writes to stdout and
//! [`CollectStringPrint`] collects into a string for tests.

use std::io::{self, Write as _};

use crate::error::{RunError, RunResult};

/// Sink for `print` output.
///
/// `write` receives one formatted argument at a time without separators;
/// separators and the trailing newline arrive through `push_char`.
pub trait PrintWriter {
    fn write(&mut self, output: &str) -> RunResult<()>;

    fn push_char(&mut self, ch: char) -> RunResult<()>;
}

/// Default writer: straight to stdout.
#[derive(Debug, Default)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn write(&mut self, output: &str) -> RunResult<()> {
        io::stdout()
            .write_all(output.as_bytes())
            .map_err(|err| RunError::runtime_error(format!("could not write to stdout: {err}")))
    }

    fn push_char(&mut self, ch: char) -> RunResult<()> {
        let mut buf = [0u8; 4];
        self.write(ch.encode_utf8(&mut buf))
    }
}

/// Collects all print output into a string.
#[derive(Debug, Default)]
pub struct CollectStringPrint {
    buffer: String,
}

impl CollectStringPrint {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns everything printed so far, clearing the buffer.
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.buffer
    }
}

impl PrintWriter for CollectStringPrint {
    fn write(&mut self, output: &str) -> RunResult<()> {
        self.buffer.push_str(output);
        Ok(())
    }

    fn push_char(&mut self, ch: char) -> RunResult<()> {
        self.buffer.push(ch);
        Ok(())
    }
}

/// Writer over a shared buffer, for forwarding output between two owners
/// (the VM drains what its embedded module loader printed).
#[derive(Debug, Default)]
pub struct SharedBufferPrint {
    buffer: std::rc::Rc<std::cell::RefCell<String>>,
}

impl SharedBufferPrint {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A second handle onto the same buffer.
    #[must_use]
    pub fn handle(&self) -> std::rc::Rc<std::cell::RefCell<String>> {
        std::rc::Rc::clone(&self.buffer)
    }
}

impl PrintWriter for SharedBufferPrint {
    fn write(&mut self, output: &str) -> RunResult<()> {
        self.buffer.borrow_mut().push_str(output);
        Ok(())
    }

    fn push_char(&mut self, ch: char) -> RunResult<()> {
        self.buffer.borrow_mut().push(ch);
        Ok(())
    }
}

/// Discards all print output.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn write(&mut self, _output: &str) -> RunResult<()> {
        Ok(())
    }

    fn push_char(&mut self, _ch: char) -> RunResult<()> {
        Ok(())
    }
}
