//! Bytecode compiler and virtual machine.
//!
//! # Architecture
//!
//! - `instruction`: opcodes, operand widths, encoding and decoding
//! - `chunk`: instruction streams and the compiled `Bytecode` artifact
//! - `symbol_table`: compile-time resolution of names to slots
//! - `compiler`: transforms AST into bytecode
//! - `value`: runtime values
//! - `builtins`: host functions callable from programs
//! - `vm`: stack-based virtual machine for executing bytecode
//! - `disassembler`: debug output for bytecode inspection

pub mod builtins;
pub mod chunk;
pub mod compiler;
mod compiler_exprs;
mod compiler_stmts;
pub mod disassembler;
pub mod frame;
pub mod instruction;
pub mod symbol_table;
pub mod value;
pub mod vm;
mod vm_calls;

pub use chunk::{Bytecode, Instructions};
pub use compiler::{CompileResult, Compiler};
pub use disassembler::{disassemble_bytecode, print_disassembly};
pub use instruction::{decode, make, OpCode};
pub use symbol_table::{Symbol, SymbolScope, SymbolTable};
pub use value::{Builtin, Closure, CompiledFunction, Value};
pub use vm::{Vm, GLOBALS_SIZE, MAX_FRAMES, STACK_SIZE};
