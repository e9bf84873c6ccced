//! AST-to-bytecode compiler.
//!
//! Single pass over the AST. Each function literal gets its own compilation
//! scope (instruction stream) and its own enclosed symbol table; leaving the
//! scope turns the stream into a `CompiledFunction` constant.

use crate::ast::{Block, Program};
use crate::bytecode::builtins::BUILTINS;
use crate::bytecode::chunk::{Bytecode, Instructions};
use crate::bytecode::instruction::{make, OpCode};
use crate::bytecode::symbol_table::{Symbol, SymbolScope, SymbolTable};
use crate::bytecode::value::Value;
use crate::error::CompileError;
use crate::span::Span;

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Operand written by forward jumps until their target is known.
pub const JUMP_PLACEHOLDER: usize = 9999;

/// Largest value of a two-byte operand.
pub const MAX_U16_OPERAND: usize = u16::MAX as usize;
/// Largest value of a one-byte operand.
pub const MAX_U8_OPERAND: usize = u8::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmittedInstruction {
    pub opcode: OpCode,
    pub position: usize,
}

/// The instruction stream of one function body being compiled.
#[derive(Debug, Clone, Default)]
pub struct CompilationScope {
    pub instructions: Instructions,
    pub last_instruction: Option<EmittedInstruction>,
    pub previous_instruction: Option<EmittedInstruction>,
}

/// The compiler: transforms AST into bytecode.
pub struct Compiler {
    /// Constant pool shared by every scope.
    pub constants: Vec<Value>,
    pub symbol_table: SymbolTable,
    /// Scope currently receiving instructions.
    scope: CompilationScope,
    /// Scopes of the function literals enclosing the current one.
    enclosing: Vec<CompilationScope>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// A compiler with an empty constant pool and the builtins bound.
    pub fn new() -> Self {
        Self::new_with_state(builtin_symbol_table(), Vec::new())
    }

    /// A compiler continuing from the symbols and constants of earlier runs.
    pub fn new_with_state(symbol_table: SymbolTable, constants: Vec<Value>) -> Self {
        Self {
            constants,
            symbol_table,
            scope: CompilationScope::default(),
            enclosing: Vec::new(),
        }
    }

    /// Compile a full program with fresh state.
    pub fn compile(program: &Program) -> CompileResult<Bytecode> {
        let mut compiler = Compiler::new();
        compiler.compile_program(program)?;
        Ok(compiler.bytecode())
    }

    pub fn compile_program(&mut self, program: &Program) -> CompileResult<()> {
        for stmt in &program.statements {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    pub fn compile_block(&mut self, block: &Block) -> CompileResult<()> {
        for stmt in &block.statements {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.scope.instructions.clone(),
            constants: self.constants.clone(),
        }
    }

    /// Consume the compiler, returning the bytecode and the symbol table to
    /// carry into the next compilation.
    pub fn into_parts(self) -> (Bytecode, SymbolTable) {
        let bytecode = Bytecode {
            instructions: self.scope.instructions,
            constants: self.constants,
        };
        (bytecode, self.symbol_table)
    }

    // --- Emission ---

    pub fn current_instructions(&self) -> &Instructions {
        &self.scope.instructions
    }

    pub fn current_offset(&self) -> usize {
        self.scope.instructions.len()
    }

    pub fn emit(&mut self, op: OpCode, operands: &[usize]) -> usize {
        let instruction = make(op, operands);
        let position = self.scope.instructions.write(&instruction);
        self.set_last_instruction(op, position);
        position
    }

    fn set_last_instruction(&mut self, opcode: OpCode, position: usize) {
        self.scope.previous_instruction = self.scope.last_instruction;
        self.scope.last_instruction = Some(EmittedInstruction { opcode, position });
    }

    pub fn add_constant(&mut self, value: Value, span: Span) -> CompileResult<usize> {
        let index = self.constants.len();
        if index > MAX_U16_OPERAND {
            return Err(CompileError::limit_exceeded(
                "constants",
                MAX_U16_OPERAND + 1,
                span,
            ));
        }
        self.constants.push(value);
        Ok(index)
    }

    pub fn emit_constant(&mut self, value: Value, span: Span) -> CompileResult<usize> {
        let index = self.add_constant(value, span)?;
        Ok(self.emit(OpCode::Constant, &[index]))
    }

    /// Rewrite the operand of the instruction at `position` in place.
    pub fn change_operand(&mut self, position: usize, operand: usize) {
        if let Some(op) = self.scope.instructions.opcode_at(position) {
            let instruction = make(op, &[operand]);
            self.scope.instructions.replace(position, &instruction);
        }
    }

    /// Point the jump at `position` to the current end of the stream.
    pub fn patch_jump(&mut self, position: usize, span: Span) -> CompileResult<()> {
        let target = self.current_offset();
        if target > MAX_U16_OPERAND {
            return Err(CompileError::limit_exceeded(
                "instruction bytes before a jump target",
                MAX_U16_OPERAND,
                span,
            ));
        }
        self.change_operand(position, target);
        Ok(())
    }

    pub fn last_instruction_is(&self, op: OpCode) -> bool {
        if self.scope.instructions.is_empty() {
            return false;
        }
        matches!(self.scope.last_instruction, Some(last) if last.opcode == op)
    }

    pub fn remove_last_pop(&mut self) {
        if let Some(last) = self.scope.last_instruction {
            self.scope.instructions.truncate(last.position);
            self.scope.last_instruction = self.scope.previous_instruction;
        }
    }

    pub fn replace_last_pop_with_return(&mut self) {
        if let Some(last) = self.scope.last_instruction {
            let instruction = make(OpCode::ReturnValue, &[]);
            self.scope.instructions.replace(last.position, &instruction);
            self.scope.last_instruction = Some(EmittedInstruction {
                opcode: OpCode::ReturnValue,
                position: last.position,
            });
        }
    }

    // --- Scope management ---

    pub fn scope_depth(&self) -> usize {
        self.enclosing.len()
    }

    pub fn enter_scope(&mut self) {
        let outer = std::mem::take(&mut self.scope);
        self.enclosing.push(outer);

        let table = std::mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::new_enclosed(table);
    }

    /// Leave the current function scope, returning its instructions.
    pub fn leave_scope(&mut self) -> Instructions {
        let outer = self.enclosing.pop().unwrap_or_default();
        let finished = std::mem::replace(&mut self.scope, outer);

        if let Some(outer_table) = self.symbol_table.take_outer() {
            self.symbol_table = outer_table;
        }

        finished.instructions
    }

    // --- Symbols ---

    /// Bind `name` in the current scope, checking that its slot fits the operand.
    pub fn define_binding(&mut self, name: &str, span: Span) -> CompileResult<Symbol> {
        let symbol = self.symbol_table.define(name);
        check_slot(symbol, span)
    }

    /// Bind a parameter of the function being compiled.
    pub fn define_parameter(&mut self, name: &str, span: Span) -> CompileResult<Symbol> {
        let symbol = self.symbol_table.define_parameter(name);
        check_slot(symbol, span)
    }

    pub fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(OpCode::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(OpCode::GetLocal, &[symbol.index]),
            SymbolScope::Builtin => self.emit(OpCode::GetBuiltin, &[symbol.index]),
            SymbolScope::Free => self.emit(OpCode::GetFree, &[symbol.index]),
            SymbolScope::Function => self.emit(OpCode::CurrentClosure, &[]),
        };
    }

    pub fn store_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(OpCode::SetGlobal, &[symbol.index]),
            _ => self.emit(OpCode::SetLocal, &[symbol.index]),
        };
    }
}

/// Reject slots that do not fit the operand of their load/store opcode.
fn check_slot(symbol: Symbol, span: Span) -> CompileResult<Symbol> {
    match symbol.scope {
        SymbolScope::Global if symbol.index > MAX_U16_OPERAND => Err(
            CompileError::limit_exceeded("global bindings", MAX_U16_OPERAND + 1, span),
        ),
        SymbolScope::Local if symbol.index > MAX_U8_OPERAND => Err(
            CompileError::limit_exceeded("local bindings", MAX_U8_OPERAND + 1, span),
        ),
        _ => Ok(symbol),
    }
}

/// A global symbol table with every builtin bound to its slot.
pub fn builtin_symbol_table() -> SymbolTable {
    let mut table = SymbolTable::new();
    for (index, builtin) in BUILTINS.iter().enumerate() {
        table.define_builtin(index, builtin.name);
    }
    table
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::lexer::Scanner;
    use crate::parser::Parser;
    use pretty_assertions::assert_eq;

    pub(crate) fn parse(source: &str) -> Program {
        let tokens = Scanner::new(source).scan_tokens().unwrap();
        Parser::new(tokens).parse().unwrap()
    }

    #[test]
    fn test_scopes() {
        let mut compiler = Compiler::new();
        compiler.emit(OpCode::Mul, &[]);

        compiler.enter_scope();
        assert_eq!(compiler.scope_depth(), 1);
        compiler.emit(OpCode::Sub, &[]);
        assert_eq!(compiler.current_instructions().len(), 1);
        assert!(compiler.last_instruction_is(OpCode::Sub));
        assert!(!compiler.symbol_table.is_global());

        let inner = compiler.leave_scope();
        assert_eq!(inner.code, vec![OpCode::Sub as u8]);
        assert_eq!(compiler.scope_depth(), 0);
        assert!(compiler.symbol_table.is_global());

        compiler.emit(OpCode::Add, &[]);
        assert_eq!(
            compiler.current_instructions().code,
            vec![OpCode::Mul as u8, OpCode::Add as u8]
        );
        assert_eq!(
            compiler.scope.previous_instruction.map(|i| i.opcode),
            Some(OpCode::Mul)
        );
    }

    #[test]
    fn test_remove_last_pop() {
        let mut compiler = Compiler::new();
        compiler.emit(OpCode::True, &[]);
        compiler.emit(OpCode::Pop, &[]);
        compiler.remove_last_pop();
        assert_eq!(compiler.current_instructions().code, vec![OpCode::True as u8]);
        assert!(compiler.last_instruction_is(OpCode::True));
    }

    #[test]
    fn test_patch_jump() {
        let mut compiler = Compiler::new();
        let jump = compiler.emit(OpCode::JumpNotTruthy, &[JUMP_PLACEHOLDER]);
        compiler.emit(OpCode::Null, &[]);
        compiler.patch_jump(jump, Span::default()).unwrap();
        assert_eq!(
            compiler.current_instructions().code,
            vec![OpCode::JumpNotTruthy as u8, 0, 4, OpCode::Null as u8]
        );
    }

    #[test]
    fn test_builtins_are_seeded() {
        let mut compiler = Compiler::new();
        let symbol = compiler.symbol_table.resolve("rest").unwrap();
        assert_eq!(symbol.scope, SymbolScope::Builtin);
        assert_eq!(symbol.index, 4);
    }

    #[test]
    fn test_compile_entry_point() {
        let bytecode = Compiler::compile(&parse("1; 2")).unwrap();
        assert_eq!(bytecode.constants, vec![Value::Integer(1), Value::Integer(2)]);
    }
}
