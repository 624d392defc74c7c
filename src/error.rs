use thiserror::Error;

use crate::token::Token;

/// Category 4 from spec.md §7: undefined variable/property, wrong operand
/// type, arity mismatch, calling a non-callable, inheriting from a
/// non-class, accessing a property on a non-instance. Carries the
/// offending token so the boundary can render `"MSG\n[line L]"`.
#[derive(Debug, Error, Clone)]
#[error("{message}")]
pub struct RuntimeError {
    pub token: Token,
    pub message: String,
}

impl RuntimeError {
    pub fn new(token: &Token, message: impl Into<String>) -> Self {
        RuntimeError {
            token: token.clone(),
            message: message.into(),
        }
    }
}

/// A zero-sized sentinel the parser returns after it has already reported
/// a diagnostic through the `Diagnostics` sink. It carries no message of
/// its own — there is nothing left to say — it only tells `declaration()`
/// to enter panic-mode recovery.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("parse error")]
pub struct ParseError;

/// Top-level error spanning the categories `main` needs to turn into an
/// exit code: a wrapped I/O failure from the file-loading boundary, or a
/// runtime error that escaped the top-level execution.
#[derive(Debug, Error)]
pub enum LoxError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
