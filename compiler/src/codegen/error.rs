//! Code generation error type.
//!
//! One enum covering both logical errors (bad programs) and the structured
//! diagnostics the rest of the compiler produces, with `?`-friendly `From`
//! impls at the boundary.

use crate::diagnostics::Diagnostic;

#[derive(Debug)]
pub enum CodeGenError {
    /// A single structured diagnostic (undefined variable, jump too far, …).
    Diagnostic(Diagnostic),
    /// A logic error that has no (line, column) of its own, e.g. an
    /// internal invariant violation.
    Logic(String),
}

impl std::fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeGenError::Diagnostic(d) => write!(f, "{}", d),
            CodeGenError::Logic(s) => write!(f, "{}", s),
        }
    }
}

impl std::error::Error for CodeGenError {}

impl From<Diagnostic> for CodeGenError {
    fn from(d: Diagnostic) -> Self {
        CodeGenError::Diagnostic(d)
    }
}

impl From<String> for CodeGenError {
    fn from(s: String) -> Self {
        CodeGenError::Logic(s)
    }
}
