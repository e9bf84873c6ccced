//! Statement compilation: AST statements to bytecode.

use crate::ast::{Stmt, StmtKind};
use crate::bytecode::compiler::{CompileResult, Compiler};
use crate::bytecode::instruction::OpCode;

impl Compiler {
    /// Compile a statement.
    pub fn compile_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.compile_expr(expr)?;
                self.emit(OpCode::Pop, &[]);
            }
            StmtKind::Let { name, value } => {
                // Defined first so a function value can see its own binding.
                let symbol = self.define_binding(name, stmt.span)?;
                self.compile_expr(value)?;
                self.store_symbol(&symbol);
            }
            StmtKind::Return(value) => {
                self.compile_expr(value)?;
                self.emit(OpCode::ReturnValue, &[]);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::bytecode::chunk::Instructions;
    use crate::bytecode::compiler::tests::parse;
    use crate::bytecode::compiler::Compiler;
    use crate::bytecode::instruction::{make, OpCode};
    use crate::bytecode::symbol_table::SymbolScope;
    use crate::bytecode::value::Value;
    use crate::error::CompileError;
    use pretty_assertions::assert_eq;

    fn instructions(source: &str) -> String {
        Compiler::compile(&parse(source))
            .unwrap()
            .instructions
            .to_string()
    }

    fn expected(instructions: Vec<Vec<u8>>) -> String {
        instructions.into_iter().collect::<Instructions>().to_string()
    }

    #[test]
    fn test_global_let_statements() {
        assert_eq!(
            instructions("let one = 1; let two = 2;"),
            expected(vec![
                make(OpCode::Constant, &[0]),
                make(OpCode::SetGlobal, &[0]),
                make(OpCode::Constant, &[1]),
                make(OpCode::SetGlobal, &[1]),
            ])
        );
        assert_eq!(
            instructions("let one = 1; let two = one; two;"),
            expected(vec![
                make(OpCode::Constant, &[0]),
                make(OpCode::SetGlobal, &[0]),
                make(OpCode::GetGlobal, &[0]),
                make(OpCode::SetGlobal, &[1]),
                make(OpCode::GetGlobal, &[1]),
                make(OpCode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_redefinition_writes_the_same_slot() {
        assert_eq!(
            instructions("let x = 1; let x = x + 1; x"),
            expected(vec![
                make(OpCode::Constant, &[0]),
                make(OpCode::SetGlobal, &[0]),
                make(OpCode::GetGlobal, &[0]),
                make(OpCode::Constant, &[1]),
                make(OpCode::Add, &[]),
                make(OpCode::SetGlobal, &[0]),
                make(OpCode::GetGlobal, &[0]),
                make(OpCode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_local_let_statements() {
        let bytecode = Compiler::compile(&parse("fn() { let a = 55; let b = 77; a + b }")).unwrap();
        let function = match &bytecode.constants[2] {
            Value::CompiledFunction(function) => function.clone(),
            other => panic!("expected a compiled function, got {}", other),
        };
        assert_eq!(function.num_locals, 2);
        assert_eq!(function.num_parameters, 0);
        assert_eq!(
            function.instructions.to_string(),
            expected(vec![
                make(OpCode::Constant, &[0]),
                make(OpCode::SetLocal, &[0]),
                make(OpCode::Constant, &[1]),
                make(OpCode::SetLocal, &[1]),
                make(OpCode::GetLocal, &[0]),
                make(OpCode::GetLocal, &[1]),
                make(OpCode::Add, &[]),
                make(OpCode::ReturnValue, &[]),
            ])
        );
    }

    #[test]
    fn test_top_level_return() {
        assert_eq!(
            instructions("return 1; 2;"),
            expected(vec![
                make(OpCode::Constant, &[0]),
                make(OpCode::ReturnValue, &[]),
                make(OpCode::Constant, &[1]),
                make(OpCode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_state_threads_between_compilations() {
        let mut first = Compiler::new();
        first.compile_program(&parse("let a = 1;")).unwrap();
        let (bytecode, symbol_table) = first.into_parts();

        let mut second = Compiler::new_with_state(symbol_table, bytecode.constants);
        second.compile_program(&parse("let b = a + 2; b")).unwrap();

        let b = second.symbol_table.resolve("b").unwrap();
        assert_eq!(b.scope, SymbolScope::Global);
        assert_eq!(b.index, 1);
        assert_eq!(
            second.constants,
            vec![Value::Integer(1), Value::Integer(2)]
        );
        assert_eq!(
            second.bytecode().instructions.to_string(),
            expected(vec![
                make(OpCode::GetGlobal, &[0]),
                make(OpCode::Constant, &[1]),
                make(OpCode::Add, &[]),
                make(OpCode::SetGlobal, &[1]),
                make(OpCode::GetGlobal, &[1]),
                make(OpCode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_too_many_locals() {
        let lets: String = (0..257).map(|i| format!("let v{} = 0; ", i)).collect();
        let source = format!("fn() {{ {} }}", lets);
        let err = Compiler::compile(&parse(&source)).unwrap_err();
        assert!(matches!(err, CompileError::LimitExceeded { what: "local bindings", .. }));
    }

    #[test]
    fn test_too_many_arguments() {
        let args = vec!["1"; 256].join(", ");
        let err = Compiler::compile(&parse(&format!("len({})", args))).unwrap_err();
        assert!(matches!(err, CompileError::LimitExceeded { what: "call arguments", .. }));
    }
}
