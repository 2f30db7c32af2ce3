//! Generic syntax tree, straight out of the parser.
//!
//! This mirrors the grammar one-to-one and knows nothing about selections,
//! de-duplication or defaults. `builder` reduces it to an `ActionTree`.

use crate::ast::{FilterOp, SortOrder, Value};

/// `"(" field ("," field)* ")" modifier*`
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxTree {
    pub fields: Vec<FieldNode>,
    pub modifiers: Vec<Modifier>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldNode {
    /// `IDENT`
    Name(String),
    /// `"!" IDENT`
    Bang(String),
    /// `"*"`
    Star,
    /// `IDENT action_tree`
    Relation { name: String, tree: SyntaxTree },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Modifier {
    /// `.filter(a.b.c OP value)`, `path` holds at least one segment.
    Filter {
        path: Vec<String>,
        op: FilterOp,
        value: Value,
    },
    /// `.order(field, asc|desc)`
    Order { field: String, order: SortOrder },
    /// `.limit(n)`
    Limit(u64),
    /// `.offset(n)`
    Offset(u64),
}
