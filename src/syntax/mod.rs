pub mod expr;
pub mod stmt;

pub use expr::{Expr, FunctionExpr};
pub use stmt::Stmt;
