//! # treeql
//!
//! A tree-shaped query language: one line of text asks for fields and
//! related entities, filters anywhere in the tree, sorts and pages, and
//! compiles to a single SQL query whose only cell is the finished JSON.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use treeql::prelude::*;
//!
//! let registry = Registry::load("schema.toml")?;
//! let query = treeql::prepare(&registry, "todo", "q=(id, slaves(*)).filter(slaves.id>2)")?;
//!
//! let db = Database::connect("sqlite://todo.db").await?;
//! let json = db.run(&query).await?;
//! ```
//!
//! ## Syntax
//!
//! | Form                    | Meaning                                  |
//! |-------------------------|------------------------------------------|
//! | `(a, b)`                | select fields                            |
//! | `*` / `!a`              | all fields / all but `a`                 |
//! | `rel(...)`              | nested relation with its own field list  |
//! | `.filter(rel.a>=2)`     | filter, may reach into relations         |
//! | `.order(a, desc)`       | sort                                     |
//! | `.limit(n)` `.offset(n)`| paging                                   |

pub mod ast;
pub mod builder;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod plan;
pub mod schema;
pub mod sql;
pub mod syntax;
pub mod validator;

use percent_encoding::percent_decode_str;

use crate::ast::ActionTree;
use crate::compiler::Query;
use crate::error::{TreeqlError, TreeqlResult};
use crate::schema::Registry;

pub mod prelude {
    pub use crate::ast::*;
    pub use crate::compiler::{Query, compile};
    pub use crate::config::Config;
    pub use crate::engine::Database;
    pub use crate::error::*;
    pub use crate::parser::parse;
    pub use crate::schema::{Direction, Entity, FieldDef, Registry, Relationship};
    pub use crate::sql::{Statement, ToSql};
    pub use crate::validator::validate;
}

/// Parse query text into an action tree.
///
/// # Example
///
/// ```
/// let tree = treeql::parse("q=(id, todo(id)).filter(todo.id=2)").unwrap();
/// assert_eq!(tree.relations.len(), 1);
/// assert_eq!(tree.filters.len(), 1);
/// ```
pub fn parse(input: &str) -> TreeqlResult<ActionTree> {
    parser::parse(input)
}

/// Percent-decode a raw query string as it arrives on the wire.
///
/// `+` is left alone: the grammar has no use for it and decoding it to a
/// space would silently change string literals.
///
/// ```
/// assert_eq!(treeql::decode_query_string("q=%28id%29").unwrap(), "q=(id)");
/// ```
pub fn decode_query_string(raw: &str) -> TreeqlResult<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| TreeqlError::syntax(0, format!("query string is not valid UTF-8: {}", e)))
}

/// Parse, validate and compile `text` against `entity`.
pub fn prepare(registry: &Registry, entity: &str, text: &str) -> TreeqlResult<Query> {
    let entity = registry.require(entity)?;

    let tree = parse(text).inspect_err(|e| tracing::debug!("rejected query: {}", e))?;
    tracing::debug!(
        "parsed query for '{}': {} filters, {} relations",
        entity.name,
        tree.filters.len(),
        tree.relations.len()
    );

    validator::validate(&tree, entity, registry)
        .inspect_err(|e| tracing::debug!("invalid query: {}", e))?;

    let query = compiler::compile(&tree, entity, registry)
        .inspect_err(|e| tracing::warn!("compilation failed: {}", e))?;
    tracing::info!("compiled query for '{}'", entity.name);
    Ok(query)
}
