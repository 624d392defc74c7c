use std::cell::Cell;

use crate::error::RuntimeError;
use crate::token::{Token, TokenType};

/// A process-wide diagnostics sink, made explicit instead of module-level
/// statics (spec.md §9: "pass it explicitly through the pipeline rather
/// than relying on module-level mutable state"). One instance is created
/// per `run` of a file or REPL line and threaded by reference through the
/// lexer, parser, and resolver; the interpreter reports into it directly
/// since runtime errors surface after every static pass has already run.
#[derive(Default)]
pub struct Diagnostics {
    had_error: Cell<bool>,
    had_runtime_error: Cell<bool>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn had_error(&self) -> bool {
        self.had_error.get()
    }

    pub fn had_runtime_error(&self) -> bool {
        self.had_runtime_error.get()
    }

    /// Category 1: lex error, reported at the point of the offending line.
    pub fn lex_error(&self, line: u32, message: &str) {
        self.report(line, "", message);
        log::warn!("lex error at line {line}: {message}");
    }

    /// Categories 2–3: parse/resolve errors, reported relative to a token.
    pub fn token_error(&self, token: &Token, message: &str) {
        let location = if token.token_type == TokenType::Eof {
            " at end".to_string()
        } else {
            format!(" at '{}'", token.lexeme)
        };
        self.report(token.line, &location, message);
        log::warn!("static error{location} (line {}): {message}", token.line);
    }

    /// Category 4: runtime error, formatted as `"MSG\n[line L]"` per
    /// spec.md §6.
    pub fn runtime_error(&self, error: &RuntimeError) {
        eprintln!("{}\n[line {}]", error.message, error.token.line);
        log::error!("runtime error (line {}): {}", error.token.line, error.message);
        self.had_runtime_error.set(true);
    }

    fn report(&self, line: u32, location: &str, message: &str) {
        eprintln!("[line {line}] Error{location}: {message}");
        self.had_error.set(true);
    }
}
