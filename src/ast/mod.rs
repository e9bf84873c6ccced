//! Abstract Syntax Tree for GoTien.

pub mod expr;
pub mod stmt;

pub use expr::{BinaryOp, Expr, ExprKind, UnaryOp};
pub use stmt::{Block, Program, Stmt, StmtKind};
