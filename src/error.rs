//! Error taxonomy for the Thorn engine (spec §7).
//!
//! `ThornError` is the single error type surfaced by the embedded API. The
//! interpreter's own recoverable/fatal distinction is the `try_depth` counter
//! on `Interpreter`, not an exception hierarchy; this enum only exists to let
//! a host format and react to whatever escaped all the way out.

use thiserror::Error;

use crate::interpreter::value::Value;

/// One parse failure: a message plus the line it was reported at.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseErrorDetail {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ParseErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[line {}] Error: {}", self.line, self.message)
    }
}

#[derive(Debug, Error)]
pub enum ThornError {
    /// Bad syntax. Carries every error the parser recovered from and kept
    /// going after, per spec §4.2's synchronize-and-resume policy.
    #[error("{} parse error(s): {}", .0.len(), .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Parse(Vec<ParseErrorDetail>),

    /// Arithmetic, type, bounds, or undefined-name failure not inside a `try`.
    #[error("[line {line}] Error at '{token}': {message}")]
    Runtime {
        line: usize,
        token: String,
        message: String,
    },

    /// A value raised by `throw` (or a recoverable fault converted while
    /// `try_depth > 0`) that unwound past every enclosing `try`.
    #[error("uncaught throw: {}", crate::interpreter::value::describe(&.0))]
    Throw(Value),

    /// Module not found, circular, or missing export.
    #[error("import error for module '{path}': {reason}")]
    Import { path: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ThornResult<T> = Result<T, ThornError>;
