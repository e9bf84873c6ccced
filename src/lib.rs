//! GoTien: a small expression language compiled to bytecode.
//!
//! This is the library root that exports all modules.
//!
//! # Pipeline
//!
//! Source text is scanned into tokens, parsed into an AST, compiled into
//! [`bytecode::Bytecode`] and executed by the stack-based [`bytecode::Vm`].
//! [`session::Session`] threads compiler and VM state between inputs for the
//! REPL.

// Allow some clippy lints that are stylistic and not critical
#![allow(clippy::module_inception)]
#![allow(clippy::result_large_err)]
#![allow(clippy::new_without_default)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::collapsible_else_if)]
#![allow(clippy::len_zero)]
#![allow(clippy::redundant_closure)]

pub mod ast;
pub mod bytecode;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod session;
pub mod span;

use std::path::Path;

use ast::Program;
use bytecode::{Bytecode, Compiler, Value, Vm};
use error::{GotienError, ParseErrors};
use lexer::Scanner;
use parser::Parser;

/// Scan and parse `source` into a program.
pub fn parse(source: &str) -> Result<Program, ParseErrors> {
    let tokens = Scanner::new(source).scan_tokens()?;
    Parser::new(tokens).parse()
}

/// Parse and compile `source` with a fresh compiler.
pub fn compile(source: &str) -> Result<Bytecode, GotienError> {
    let program = parse(source)?;
    Ok(Compiler::compile(&program)?)
}

/// Compile and run `source`, returning the last popped value.
pub fn run(source: &str) -> Result<Value, GotienError> {
    let bytecode = compile(source)?;
    run_bytecode(bytecode)
}

/// Run already compiled bytecode on a fresh VM.
pub fn run_bytecode(bytecode: Bytecode) -> Result<Value, GotienError> {
    let mut vm = Vm::new(bytecode);
    vm.run()?;
    Ok(vm.last_popped_stack_elem())
}

/// Read, compile and run the file at `path`.
pub fn run_file(path: impl AsRef<Path>) -> Result<Value, GotienError> {
    let source = std::fs::read_to_string(path)?;
    run(&source)
}
