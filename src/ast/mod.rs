//! Abstract syntax tree: closed tagged enums for statements and
//! expressions, so the compiler's lowering is statically exhaustive.

pub mod expr;
pub mod stmt;

pub use expr::{Expr, ExprKind, InfixOp, PrefixOp};
pub use stmt::{Block, Program, Stmt, StmtKind};
