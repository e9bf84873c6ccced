//! Expression compilation: AST expressions to bytecode.

use std::rc::Rc;

use crate::ast::{BinaryOp, Block, Expr, ExprKind, UnaryOp};
use crate::bytecode::compiler::{
    CompileResult, Compiler, JUMP_PLACEHOLDER, MAX_U16_OPERAND, MAX_U8_OPERAND,
};
use crate::bytecode::instruction::OpCode;
use crate::bytecode::value::{CompiledFunction, Value};
use crate::error::CompileError;
use crate::span::Span;

impl Compiler {
    /// Compile an expression; the result is left on the stack.
    pub fn compile_expr(&mut self, expr: &Expr) -> CompileResult<()> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::IntLiteral(n) => {
                self.emit_constant(Value::Integer(*n), span)?;
            }
            ExprKind::StringLiteral(s) => {
                self.emit_constant(Value::string(s.as_str()), span)?;
            }
            ExprKind::BoolLiteral(b) => {
                self.emit(if *b { OpCode::True } else { OpCode::False }, &[]);
            }
            ExprKind::Variable(name) => {
                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .ok_or_else(|| CompileError::undefined_variable(name.as_str(), span))?;
                self.load_symbol(&symbol);
            }
            ExprKind::Array(elements) => {
                check_count("array elements", elements.len(), MAX_U16_OPERAND, span)?;
                for element in elements {
                    self.compile_expr(element)?;
                }
                self.emit(OpCode::Array, &[elements.len()]);
            }
            ExprKind::Hash(pairs) => {
                check_count("hash pairs", pairs.len(), MAX_U16_OPERAND, span)?;
                for (key, value) in pairs {
                    self.compile_expr(key)?;
                    self.compile_expr(value)?;
                }
                self.emit(OpCode::Hash, &[pairs.len()]);
            }
            ExprKind::Unary { operator, operand } => {
                self.compile_expr(operand)?;
                match operator {
                    UnaryOp::Negate => self.emit(OpCode::Minus, &[]),
                    UnaryOp::Not => self.emit(OpCode::Bang, &[]),
                };
            }
            ExprKind::Binary {
                left,
                operator,
                right,
            } => {
                self.compile_binary(left, *operator, right)?;
            }
            ExprKind::If {
                condition,
                consequence,
                alternative,
            } => {
                self.compile_if(condition, consequence, alternative.as_ref(), span)?;
            }
            ExprKind::Function {
                parameters,
                body,
                name,
            } => {
                self.compile_function(parameters, body, name.as_deref(), span)?;
            }
            ExprKind::Call { callee, arguments } => {
                check_count("call arguments", arguments.len(), MAX_U8_OPERAND, span)?;
                self.compile_expr(callee)?;
                for argument in arguments {
                    self.compile_expr(argument)?;
                }
                self.emit(OpCode::Call, &[arguments.len()]);
            }
            ExprKind::Index { object, index } => {
                self.compile_expr(object)?;
                self.compile_expr(index)?;
                self.emit(OpCode::Index, &[]);
            }
        }
        Ok(())
    }

    fn compile_binary(&mut self, left: &Expr, operator: BinaryOp, right: &Expr) -> CompileResult<()> {
        // `a < b` is compiled as `b > a`.
        if operator == BinaryOp::Less {
            self.compile_expr(right)?;
            self.compile_expr(left)?;
            self.emit(OpCode::GreaterThan, &[]);
            return Ok(());
        }

        self.compile_expr(left)?;
        self.compile_expr(right)?;
        let op = match operator {
            BinaryOp::Add => OpCode::Add,
            BinaryOp::Subtract => OpCode::Sub,
            BinaryOp::Multiply => OpCode::Mul,
            BinaryOp::Divide => OpCode::Div,
            BinaryOp::Equal => OpCode::Equal,
            BinaryOp::NotEqual => OpCode::NotEqual,
            BinaryOp::Greater => OpCode::GreaterThan,
            BinaryOp::Less => unreachable!("handled above"),
        };
        self.emit(op, &[]);
        Ok(())
    }

    fn compile_if(
        &mut self,
        condition: &Expr,
        consequence: &Block,
        alternative: Option<&Block>,
        span: Span,
    ) -> CompileResult<()> {
        self.compile_expr(condition)?;
        let jump_not_truthy = self.emit(OpCode::JumpNotTruthy, &[JUMP_PLACEHOLDER]);

        self.compile_branch(consequence)?;
        let jump = self.emit(OpCode::Jump, &[JUMP_PLACEHOLDER]);
        self.patch_jump(jump_not_truthy, span)?;

        match alternative {
            Some(block) => self.compile_branch(block)?,
            None => {
                self.emit(OpCode::Null, &[]);
            }
        }
        self.patch_jump(jump, span)
    }

    /// Compile an `if` branch so that it leaves exactly one value.
    fn compile_branch(&mut self, block: &Block) -> CompileResult<()> {
        self.compile_block(block)?;
        if self.last_instruction_is(OpCode::Pop) {
            self.remove_last_pop();
        } else {
            self.emit(OpCode::Null, &[]);
        }
        Ok(())
    }

    fn compile_function(
        &mut self,
        parameters: &[String],
        body: &Block,
        name: Option<&str>,
        span: Span,
    ) -> CompileResult<()> {
        check_count("parameters", parameters.len(), MAX_U8_OPERAND, span)?;

        self.enter_scope();
        if let Some(name) = name {
            self.symbol_table.define_function_name(name);
        }
        for parameter in parameters {
            self.define_parameter(parameter, span)?;
        }

        self.compile_block(body)?;
        if self.last_instruction_is(OpCode::Pop) {
            self.replace_last_pop_with_return();
        }
        if !self.last_instruction_is(OpCode::ReturnValue) {
            self.emit(OpCode::Return, &[]);
        }

        let free_symbols = std::mem::take(&mut self.symbol_table.free_symbols);
        let num_locals = self.symbol_table.num_definitions();
        let instructions = self.leave_scope();

        check_count("free variables", free_symbols.len(), MAX_U8_OPERAND, span)?;
        for symbol in &free_symbols {
            self.load_symbol(symbol);
        }

        let function = CompiledFunction {
            instructions,
            num_locals,
            num_parameters: parameters.len(),
            name: name.map(str::to_string),
        };
        let index = self.add_constant(Value::CompiledFunction(Rc::new(function)), span)?;
        self.emit(OpCode::Closure, &[index, free_symbols.len()]);
        Ok(())
    }
}

fn check_count(what: &'static str, count: usize, limit: usize, span: Span) -> CompileResult<()> {
    if count > limit {
        return Err(CompileError::limit_exceeded(what, limit, span));
    }
    Ok(())
}
