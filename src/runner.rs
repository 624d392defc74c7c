use std::fs;
use std::io::{self, BufRead, Write};

use crate::diagnostics::Diagnostics;
use crate::error::LoxError;
use crate::interpreter::Interpreter;
use crate::parser::Parser;
use crate::resolver::Resolver;
use crate::scanner::Scanner;

/// What one `run_source` call produced, so the CLI boundary can choose an
/// exit code without reaching into `Diagnostics` itself.
pub struct RunOutcome {
    pub had_error: bool,
    pub had_runtime_error: bool,
}

/// Runs one chunk of source through a fresh lex/parse/resolve pass against
/// a long-lived `Interpreter` (its globals persist across REPL lines; a
/// fresh `Diagnostics` does not — each call gets its own).
pub fn run_source(source: &str, interpreter: &mut Interpreter) -> RunOutcome {
    let diagnostics = Diagnostics::new();

    let scanner = Scanner::new(source, &diagnostics);
    let tokens = scanner.scan_tokens();

    let mut parser = Parser::new(&tokens, &diagnostics);
    let statements = parser.parse();

    // No value in resolving, let alone running, code that failed to parse.
    if diagnostics.had_error() {
        return RunOutcome {
            had_error: true,
            had_runtime_error: false,
        };
    }

    let mut resolver = Resolver::new(interpreter, &diagnostics);
    resolver.resolve_stmts(&statements);

    if diagnostics.had_error() {
        return RunOutcome {
            had_error: true,
            had_runtime_error: false,
        };
    }

    interpreter.interpret(&statements, &diagnostics);

    RunOutcome {
        had_error: diagnostics.had_error(),
        had_runtime_error: diagnostics.had_runtime_error(),
    }
}

pub fn run_file(path: &str) -> Result<RunOutcome, LoxError> {
    let source = fs::read_to_string(path)?;
    let mut interpreter = Interpreter::new();
    Ok(run_source(&source, &mut interpreter))
}

pub fn run_prompt() -> Result<(), LoxError> {
    let mut interpreter = Interpreter::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    print!("> ");
    stdout.flush()?;
    for line in stdin.lock().lines() {
        run_source(&line?, &mut interpreter);
        print!("> ");
        stdout.flush()?;
    }
    Ok(())
}
