//! Compile an action tree into one SQLite query returning a JSON array.
//!
//! Every level is a plain select over its table producing a `payload` JSON
//! object. Each relation becomes a derived table that folds the child
//! payloads into a JSON array per join key, joined back onto the parent:
//!
//! ```text
//! SELECT '[' || coalesce(group_concat(payload, ','), '') || ']'
//! FROM (
//!     SELECT json_object('id', t.id, 'slaves', CASE .. END) AS payload
//!     FROM todo t
//!     LEFT OUTER JOIN (
//!         SELECT json_group_array(json(payload)) AS obj, __key
//!         FROM (SELECT json_object(..) AS payload, todo_id AS __key FROM todoslave ..)
//!         GROUP BY __key
//!     ) r ON t.id = r.__key
//!     ORDER BY .. LIMIT ..
//! )
//! ```

use crate::ast::{ActionTree, DEFAULT_LIMIT, FilterOp, SortOrder, Value};
use crate::error::{TreeqlError, TreeqlResult};
use crate::plan::{self, ColumnFilter, LevelPlan, RelationPlan};
use crate::schema::{Direction, Entity, Registry};
use crate::sql::{
    BinaryOp, Expr, Join, OrderBy, Select, SelectItem, Statement, TableRef,
};

const PAYLOAD: &str = "payload";
const KEY: &str = "__key";
const ROW_NUMBER: &str = "__rn";
const AGGREGATE: &str = "obj";
const RESULT: &str = "result";

/// A compiled query: one statement, one row, one text column.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub entity: String,
    pub select: Select,
}

impl Query {
    pub fn to_statement(&self) -> Statement {
        self.select.to_statement()
    }
}

/// Compile `tree` against `entity`. The tree is expected to be validated.
pub fn compile(tree: &ActionTree, entity: &Entity, registry: &Registry) -> TreeqlResult<Query> {
    let level = plan::plan(tree, entity, registry)?;
    let mut compiler = Compiler::default();
    let select = compiler.root(&level)?;
    tracing::debug!(
        "compiled '{}' using {} table aliases",
        entity.name,
        compiler.next_alias
    );
    Ok(Query {
        entity: entity.name.clone(),
        select,
    })
}

#[derive(Default)]
struct Compiler {
    next_alias: usize,
}

/// Where a level sits in the tree.
enum Position<'a> {
    Root,
    /// Reached through a relationship; rows are keyed by this child-side column.
    Child { key_column: &'a str },
}

impl Compiler {
    fn alias(&mut self) -> String {
        let alias = format!("t{}", self.next_alias);
        self.next_alias += 1;
        alias
    }

    fn root(&mut self, level: &LevelPlan<'_>) -> TreeqlResult<Select> {
        let inner = self.level(level, Position::Root)?;
        let alias = self.alias();

        let concat = Expr::func(
            "group_concat",
            vec![Expr::column(&alias, PAYLOAD), Expr::text(",")],
        );
        let document = Expr::binary(
            Expr::binary(
                Expr::text("["),
                BinaryOp::Concat,
                Expr::func("coalesce", vec![concat, Expr::text("")]),
            ),
            BinaryOp::Concat,
            Expr::text("]"),
        );

        let mut select = Select::new(TableRef::Derived {
            query: Box::new(inner),
            alias,
        });
        select.items.push(SelectItem::named(document, RESULT));
        Ok(select)
    }

    fn level(&mut self, level: &LevelPlan<'_>, position: Position<'_>) -> TreeqlResult<Select> {
        let entity = level.entity;
        let table = self.alias();
        let mut select = Select::new(TableRef::Table {
            name: entity.table.clone(),
            alias: table.clone(),
        });

        let mut payload = Vec::new();
        for field in &level.fields {
            payload.push(Expr::text(&field.alias));
            payload.push(Expr::column(&table, &field.name));
        }

        let mut to_many = false;
        for relation in &level.relations {
            let rel = relation.relationship;
            match rel.direction {
                Direction::ToMany => to_many = true,
                Direction::ToOne => {}
                Direction::ManyToMany => {
                    return Err(TreeqlError::compile(format!(
                        "unsupported relation type {} for '{}.{}'",
                        rel.direction, entity.name, relation.alias
                    )));
                }
            }

            let joined = self.relation(relation)?;
            let agg = joined.alias().to_string();

            if relation.level.output {
                payload.push(Expr::text(&relation.alias));
                payload.push(relation_value(rel.direction, &agg));
            }

            select.joins.push(Join {
                kind: relation.join,
                source: joined,
                on: Expr::binary(
                    Expr::column(&table, &rel.parent_column),
                    BinaryOp::Eq,
                    Expr::column(&agg, KEY),
                ),
            });
        }

        if level.output {
            select.items.push(SelectItem::named(
                Expr::func("json_object", payload),
                PAYLOAD,
            ));
        }

        for filter in &level.filters {
            select.filters.push(filter_expr(&table, filter)?);
        }

        if to_many {
            select.group_by.push(Expr::column(&table, &entity.identity));
        }

        let ordering = level_ordering(level, &table);

        match position {
            Position::Root => {
                select.order_by = ordering;
                let limit = level.limit.unwrap_or(DEFAULT_LIMIT);
                select.limit = (limit > 0).then_some(limit);
                select.offset = level.offset.filter(|n| *n > 0);
            }
            Position::Child { key_column } => {
                let key = Expr::column(&table, key_column);
                select.items.push(SelectItem::named(key.clone(), KEY));
                if level.is_paginated() {
                    select.items.push(SelectItem::named(
                        Expr::RowNumber {
                            partition_by: vec![key.clone()],
                            order_by: ordering.clone(),
                        },
                        ROW_NUMBER,
                    ));
                }
                select.order_by = std::iter::once(OrderBy::new(key, SortOrder::Asc))
                    .chain(ordering)
                    .collect();
            }
        }

        Ok(select)
    }

    /// Derived table folding a relation's rows into one JSON array per key.
    fn relation(&mut self, relation: &RelationPlan<'_>) -> TreeqlResult<TableRef> {
        let child = &relation.level;
        let inner = self.level(
            child,
            Position::Child {
                key_column: &relation.relationship.child_column,
            },
        )?;
        let rows = self.alias();

        let mut select = Select::new(TableRef::Derived {
            query: Box::new(inner),
            alias: rows.clone(),
        });

        if child.output {
            select.items.push(SelectItem::named(
                Expr::func(
                    "json_group_array",
                    vec![Expr::func("json", vec![Expr::column(&rows, PAYLOAD)])],
                ),
                AGGREGATE,
            ));
        }
        select
            .items
            .push(SelectItem::named(Expr::column(&rows, KEY), KEY));

        if child.is_paginated() {
            let offset = child.offset.unwrap_or(0);
            select.filters.push(Expr::binary(
                Expr::column(&rows, ROW_NUMBER),
                BinaryOp::Gt,
                Expr::Int(to_i64(offset)),
            ));
            if let Some(limit) = child.limit.filter(|n| *n > 0) {
                select.filters.push(Expr::binary(
                    Expr::column(&rows, ROW_NUMBER),
                    BinaryOp::Lte,
                    Expr::Int(to_i64(offset.saturating_add(limit))),
                ));
            }
        }

        select.group_by.push(Expr::column(&rows, KEY));

        Ok(TableRef::Derived {
            query: Box::new(select),
            alias: self.alias(),
        })
    }
}

/// The value a relation contributes to its parent's payload.
fn relation_value(direction: Direction, agg: &str) -> Expr {
    let matched = Expr::column(agg, KEY).is_not_null();
    match direction {
        Direction::ToOne => Expr::Case {
            when: Box::new(matched),
            then: Box::new(Expr::func(
                "json_extract",
                vec![Expr::column(agg, AGGREGATE), Expr::text("$[0]")],
            )),
            otherwise: None,
        },
        Direction::ToMany | Direction::ManyToMany => Expr::Case {
            when: Box::new(matched),
            then: Box::new(Expr::func("json", vec![Expr::column(agg, AGGREGATE)])),
            otherwise: Some(Box::new(Expr::func("json", vec![Expr::text("[]")]))),
        },
    }
}

/// Requested sort, then identity so pages are stable.
fn level_ordering(level: &LevelPlan<'_>, table: &str) -> Vec<OrderBy> {
    let identity = &level.entity.identity;
    let mut ordering = Vec::new();
    if let Some((field, order)) = level.sort {
        ordering.push(OrderBy::new(Expr::column(table, &field.name), order));
        if field.name == *identity {
            return ordering;
        }
    }
    ordering.push(OrderBy::new(Expr::column(table, identity), SortOrder::Asc));
    ordering
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn filter_expr(table: &str, filter: &ColumnFilter<'_>) -> TreeqlResult<Expr> {
    let column = Expr::column(table, &filter.field.name);
    let value = &filter.value;

    let compare = |op: BinaryOp| -> TreeqlResult<Expr> {
        if value.is_list() {
            return Err(TreeqlError::compile(format!(
                "'{}' cannot take a list",
                filter.operator
            )));
        }
        Ok(Expr::binary(column.clone(), op, Expr::Param(value.clone())))
    };

    match filter.operator {
        FilterOp::Eq => compare(BinaryOp::Eq),
        FilterOp::Ne => compare(BinaryOp::Ne),
        FilterOp::Gt => compare(BinaryOp::Gt),
        FilterOp::Gte => compare(BinaryOp::Gte),
        FilterOp::Lt => compare(BinaryOp::Lt),
        FilterOp::Lte => compare(BinaryOp::Lte),
        FilterOp::Like => compare(BinaryOp::Like),
        FilterOp::ILike => {
            if value.is_list() {
                return Err(TreeqlError::compile("'ilike' cannot take a list"));
            }
            Ok(Expr::binary(
                Expr::func("lower", vec![column.clone()]),
                BinaryOp::Like,
                Expr::func("lower", vec![Expr::Param(value.clone())]),
            ))
        }
        FilterOp::In => {
            let list = match value {
                Value::List(items) => items.iter().cloned().map(Expr::Param).collect(),
                scalar => vec![Expr::Param(scalar.clone())],
            };
            Ok(Expr::InList {
                expr: Box::new(column.clone()),
                list,
            })
        }
        FilterOp::IsNull => match value {
            Value::Int(0) => Ok(column.clone().is_not_null()),
            Value::Int(_) => Ok(column.clone().is_null()),
            other => Err(TreeqlError::compile(format!(
                "'is_null' takes 1 or 0, got {}",
                other.type_name()
            ))),
        },
    }
}
