//! State carried between successive evaluations.
//!
//! A session owns the symbol table, the constant pool and the globals store.
//! Each `eval` compiles against the first two and runs against the third, so
//! top-level bindings accumulate across inputs.

use crate::bytecode::compiler::{builtin_symbol_table, Compiler};
use crate::bytecode::{Bytecode, SymbolTable, Value, Vm, GLOBALS_SIZE};
use crate::error::GotienError;
use crate::parse;

pub struct Session {
    symbol_table: SymbolTable,
    constants: Vec<Value>,
    globals: Vec<Value>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            symbol_table: builtin_symbol_table(),
            constants: Vec::new(),
            globals: vec![Value::Null; GLOBALS_SIZE],
        }
    }

    /// Compile `source` against the session's bindings without committing
    /// anything.
    pub fn compile(&self, source: &str) -> Result<Bytecode, GotienError> {
        let program = parse(source)?;
        let mut compiler =
            Compiler::new_with_state(self.symbol_table.clone(), self.constants.clone());
        compiler.compile_program(&program)?;
        Ok(compiler.bytecode())
    }

    /// Parse, compile and run `source`, returning the last popped value.
    ///
    /// Parse and compile errors leave the session untouched. After a runtime
    /// error the new symbols and constants stay, as do any globals written
    /// before the failure.
    pub fn eval(&mut self, source: &str) -> Result<Value, GotienError> {
        let program = parse(source)?;

        let mut compiler =
            Compiler::new_with_state(self.symbol_table.clone(), self.constants.clone());
        compiler.compile_program(&program)?;
        let (bytecode, symbol_table) = compiler.into_parts();

        self.symbol_table = symbol_table;
        self.constants = bytecode.constants.clone();

        let globals = std::mem::take(&mut self.globals);
        let mut vm = Vm::with_globals(bytecode, globals);
        let result = vm.run();
        let last_popped = vm.last_popped_stack_elem();
        self.globals = vm.into_globals();

        result?;
        Ok(last_popped)
    }

    /// Global names in definition order with their current values.
    pub fn global_bindings(&self) -> Vec<(String, Value)> {
        self.symbol_table
            .globals()
            .into_iter()
            .map(|symbol| {
                let value = self
                    .globals
                    .get(symbol.index)
                    .cloned()
                    .unwrap_or(Value::Null);
                (symbol.name, value)
            })
            .collect()
    }

    pub fn constants(&self) -> &[Value] {
        &self.constants
    }

    pub fn symbol_table(&self) -> &SymbolTable {
        &self.symbol_table
    }

    /// Drop every binding and constant.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
