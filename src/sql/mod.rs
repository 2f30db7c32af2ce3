//! SQL AST and SQLite renderer.

pub mod ast;
pub mod render;

pub use ast::{BinaryOp, Expr, Join, JoinKind, OrderBy, Select, SelectItem, TableRef};
pub use render::{ParamContext, Statement, ToSql, quote_identifier};
