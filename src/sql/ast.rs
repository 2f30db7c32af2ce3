//! Just enough SQL to express a nested-JSON select.

use crate::ast::{SortOrder, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `"table"."column"`
    Column { table: String, name: String },
    /// Bound parameter, rendered as `?`.
    Param(Value),
    /// String literal written into the statement. Only for text the compiler owns.
    Text(String),
    /// Integer literal written into the statement.
    Int(i64),
    Func { name: &'static str, args: Vec<Expr> },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    IsNull { expr: Box<Expr>, negated: bool },
    InList { expr: Box<Expr>, list: Vec<Expr> },
    /// `CASE WHEN .. THEN .. [ELSE ..] END`
    Case {
        when: Box<Expr>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
    /// `ROW_NUMBER() OVER (PARTITION BY .. ORDER BY ..)`
    RowNumber {
        partition_by: Vec<Expr>,
        order_by: Vec<OrderBy>,
    },
}

impl Expr {
    pub fn column(table: impl Into<String>, name: impl Into<String>) -> Self {
        Expr::Column {
            table: table.into(),
            name: name.into(),
        }
    }

    pub fn text(s: impl Into<String>) -> Self {
        Expr::Text(s.into())
    }

    pub fn func(name: &'static str, args: Vec<Expr>) -> Self {
        Expr::Func { name, args }
    }

    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Concat,
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "!=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Like => "LIKE",
            BinaryOp::Concat => "||",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expr,
    pub order: SortOrder,
}

impl OrderBy {
    pub fn new(expr: Expr, order: SortOrder) -> Self {
        Self { expr, order }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn named(expr: Expr, alias: impl Into<String>) -> Self {
        Self {
            expr,
            alias: Some(alias.into()),
        }
    }
}

/// Something to select from.
#[derive(Debug, Clone, PartialEq)]
pub enum TableRef {
    Table { name: String, alias: String },
    Derived { query: Box<Select>, alias: String },
}

impl TableRef {
    pub fn alias(&self) -> &str {
        match self {
            TableRef::Table { alias, .. } | TableRef::Derived { alias, .. } => alias,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub source: TableRef,
    pub on: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub items: Vec<SelectItem>,
    pub from: TableRef,
    pub joins: Vec<Join>,
    /// Conjunction; empty means no WHERE clause.
    pub filters: Vec<Expr>,
    pub group_by: Vec<Expr>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Select {
    pub fn new(from: TableRef) -> Self {
        Self {
            items: Vec::new(),
            from,
            joins: Vec::new(),
            filters: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }
}
