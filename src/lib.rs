//! Embedded API for the Thorn language: lex, parse, optimize, interpret.
//!
//! ```no_run
//! let mut thorn = thorn::Thorn::new();
//! thorn.run("print(\"hello\");").unwrap();
//! ```

pub mod ast;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod optimizer;
pub mod parser;
pub mod token;

use std::cell::RefCell;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;

use error::{ThornError, ThornResult};
use interpreter::callable::Arity;
use interpreter::value::Value;
use interpreter::Interpreter;
use optimizer::pipeline::Pipeline;
use optimizer::OptimizationLevel;

/// A single Thorn program: one set of globals, one module loader, one stdout
/// sink, and one optimization pipeline, reused across every `run`/`run_file`
/// call made against it.
pub struct Thorn {
    interpreter: Interpreter,
    pipeline: Pipeline,
    level: OptimizationLevel,
    debug_optimizer: bool,
}

impl Thorn {
    /// A fresh instance writing to the process's stdout, optimizing at `O1`.
    pub fn new() -> Self {
        Self::with_stdout(Rc::new(RefCell::new(std::io::stdout())))
    }

    /// An instance that writes everything `print` produces into `sink`
    /// instead of the process's stdout; useful for embedding and for tests
    /// that want to assert on program output.
    pub fn with_stdout(sink: Rc<RefCell<dyn Write>>) -> Self {
        Self {
            interpreter: Interpreter::new(sink),
            pipeline: Pipeline::standard(),
            level: OptimizationLevel::O1,
            debug_optimizer: false,
        }
    }

    pub fn with_optimization_level(mut self, level: OptimizationLevel) -> Self {
        self.level = level;
        self
    }

    /// When set, notes left by optimization passes are available after a run
    /// via [`Thorn::run_with_notes`].
    pub fn with_optimizer_debug(mut self, debug: bool) -> Self {
        self.debug_optimizer = debug;
        self
    }

    pub fn register_native(
        &mut self,
        name: &str,
        arity: Arity,
        f: impl Fn(&mut Interpreter, Vec<Value>) -> ThornResult<Value> + 'static,
    ) {
        self.interpreter.register_native(name, arity, f);
    }

    pub fn register_native_class(
        &mut self,
        name: &str,
        ctor: impl Fn(&mut Interpreter, Vec<Value>) -> ThornResult<Value> + 'static,
    ) {
        self.interpreter.register_native_class(name, ctor);
    }

    /// Lex, parse, optimize, and execute `source` in the current instance's
    /// globals. Exports declared at top level are discarded; call
    /// [`Thorn::run_file`] (or write an `import`) when a module graph is
    /// needed.
    pub fn run(&mut self, source: &str) -> ThornResult<Value> {
        self.run_with_notes(source).map(|(value, _)| value)
    }

    /// Same as [`Thorn::run`], also returning the optimizer's debug notes
    /// (empty unless [`Thorn::with_optimizer_debug`] was set).
    pub fn run_with_notes(&mut self, source: &str) -> ThornResult<(Value, Vec<String>)> {
        let tokens = lexer::Lexer::new(source).scan_tokens().map_err(ThornError::Parse)?;
        let mut program = parser::Parser::new(tokens).parse().map_err(ThornError::Parse)?;
        let ctx = self.pipeline.run(&mut program, self.level, self.debug_optimizer)?;
        let value = self.interpreter.run_program(&program)?;
        Ok((value, ctx.notes))
    }

    /// Read `path`, set it as the module search root, and run it.
    pub fn run_file(&mut self, path: impl AsRef<Path>) -> ThornResult<Value> {
        self.run_file_with_notes(path).map(|(value, _)| value)
    }

    /// Same as [`Thorn::run_file`], also returning the optimizer's debug
    /// notes (empty unless [`Thorn::with_optimizer_debug`] was set).
    pub fn run_file_with_notes(&mut self, path: impl AsRef<Path>) -> ThornResult<(Value, Vec<String>)> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        if let Some(dir) = path.parent() {
            self.interpreter.set_current_dir(dir.to_path_buf());
        }
        self.run_with_notes(&source)
    }
}

impl Default for Thorn {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collecting() -> (Thorn, Rc<RefCell<Vec<u8>>>) {
        struct Sink(Rc<RefCell<Vec<u8>>>);
        impl Write for Sink {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.borrow_mut().write(buf)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let buf = Rc::new(RefCell::new(Vec::new()));
        let sink: Rc<RefCell<dyn Write>> = Rc::new(RefCell::new(Sink(buf.clone())));
        (Thorn::with_stdout(sink), buf)
    }

    #[test]
    fn runs_a_trivial_program_and_captures_output() {
        let (mut thorn, out) = collecting();
        thorn.run("print(\"hi\");").unwrap();
        assert_eq!(String::from_utf8(out.borrow().clone()).unwrap(), "hi\n");
    }

    #[test]
    fn rejects_assignment_to_an_immutable_binding() {
        let (mut thorn, _out) = collecting();
        let err = thorn.run("@immut x = 1; x = 2;").unwrap_err();
        assert!(matches!(err, ThornError::Runtime { .. }));
    }

    #[test]
    fn optimizer_o2_still_produces_the_same_value_as_o0() {
        let (mut a, _) = collecting();
        let (mut b, _) = collecting();
        a.level = OptimizationLevel::O0;
        b.level = OptimizationLevel::O2;
        let src = "$ double(n) { return n * 2; } @immut x = double(21); x;";
        let lhs = interpreter::value::describe(&a.run(src).unwrap());
        let rhs = interpreter::value::describe(&b.run(src).unwrap());
        assert_eq!(lhs, rhs);
    }
}
