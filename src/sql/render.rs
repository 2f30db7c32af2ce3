//! SQLite rendering.
//!
//! Parameters are collected left to right while rendering, so the n-th `?`
//! in the text is `params[n]`.

use crate::ast::{SortOrder, Value};

use super::ast::{Expr, Join, JoinKind, OrderBy, Select, SelectItem, TableRef};

/// Collected parameter values in placeholder order.
#[derive(Debug, Default)]
pub struct ParamContext {
    pub params: Vec<Value>,
}

impl ParamContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value and return the placeholder for it.
    pub fn add_param(&mut self, value: Value) -> String {
        self.params.push(value);
        "?".to_string()
    }
}

/// A rendered statement, ready to bind and execute.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.sql)?;
        if !self.params.is_empty() {
            let params: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
            write!(f, " -- params: [{}]", params.join(", "))?;
        }
        Ok(())
    }
}

/// Trait for converting SQL AST nodes to SQLite text.
pub trait ToSql {
    fn to_sql(&self, params: &mut ParamContext) -> String;
}

impl Select {
    pub fn to_statement(&self) -> Statement {
        let mut params = ParamContext::new();
        let sql = self.to_sql(&mut params);
        Statement {
            sql,
            params: params.params,
        }
    }
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn quote_text(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn join_sql<T: ToSql>(items: &[T], params: &mut ParamContext) -> String {
    items
        .iter()
        .map(|item| item.to_sql(params))
        .collect::<Vec<_>>()
        .join(", ")
}

impl ToSql for Expr {
    fn to_sql(&self, params: &mut ParamContext) -> String {
        match self {
            Expr::Column { table, name } => {
                format!("{}.{}", quote_identifier(table), quote_identifier(name))
            }
            Expr::Param(value) => params.add_param(value.clone()),
            Expr::Text(s) => quote_text(s),
            Expr::Int(n) => n.to_string(),
            Expr::Func { name, args } => format!("{}({})", name, join_sql(args, params)),
            Expr::Binary { left, op, right } => {
                let left = operand(left, params);
                let right = operand(right, params);
                format!("{} {} {}", left, op.as_str(), right)
            }
            Expr::IsNull { expr, negated } => {
                let expr = operand(expr, params);
                if *negated {
                    format!("{} IS NOT NULL", expr)
                } else {
                    format!("{} IS NULL", expr)
                }
            }
            Expr::InList { expr, list } => {
                let expr = operand(expr, params);
                format!("{} IN ({})", expr, join_sql(list, params))
            }
            Expr::Case {
                when,
                then,
                otherwise,
            } => {
                let mut sql = format!(
                    "CASE WHEN {} THEN {}",
                    when.to_sql(params),
                    then.to_sql(params)
                );
                if let Some(otherwise) = otherwise {
                    sql.push_str(" ELSE ");
                    sql.push_str(&otherwise.to_sql(params));
                }
                sql.push_str(" END");
                sql
            }
            Expr::RowNumber {
                partition_by,
                order_by,
            } => {
                let mut window = Vec::new();
                if !partition_by.is_empty() {
                    window.push(format!("PARTITION BY {}", join_sql(partition_by, params)));
                }
                if !order_by.is_empty() {
                    window.push(format!("ORDER BY {}", join_sql(order_by, params)));
                }
                format!("ROW_NUMBER() OVER ({})", window.join(" "))
            }
        }
    }
}

/// Nested operators get parentheses so precedence never depends on SQLite's table.
fn operand(expr: &Expr, params: &mut ParamContext) -> String {
    match expr {
        Expr::Binary { .. } | Expr::IsNull { .. } | Expr::InList { .. } => {
            format!("({})", expr.to_sql(params))
        }
        _ => expr.to_sql(params),
    }
}

impl ToSql for OrderBy {
    fn to_sql(&self, params: &mut ParamContext) -> String {
        match self.order {
            SortOrder::Asc => format!("{} ASC", self.expr.to_sql(params)),
            SortOrder::Desc => format!("{} DESC", self.expr.to_sql(params)),
        }
    }
}

impl ToSql for SelectItem {
    fn to_sql(&self, params: &mut ParamContext) -> String {
        match &self.alias {
            Some(alias) => format!("{} AS {}", self.expr.to_sql(params), quote_identifier(alias)),
            None => self.expr.to_sql(params),
        }
    }
}

impl ToSql for TableRef {
    fn to_sql(&self, params: &mut ParamContext) -> String {
        match self {
            TableRef::Table { name, alias } => {
                format!("{} AS {}", quote_identifier(name), quote_identifier(alias))
            }
            TableRef::Derived { query, alias } => {
                format!("({}) AS {}", query.to_sql(params), quote_identifier(alias))
            }
        }
    }
}

impl ToSql for Join {
    fn to_sql(&self, params: &mut ParamContext) -> String {
        let kind = match self.kind {
            JoinKind::Inner => "JOIN",
            JoinKind::LeftOuter => "LEFT OUTER JOIN",
        };
        format!(
            "{} {} ON {}",
            kind,
            self.source.to_sql(params),
            self.on.to_sql(params)
        )
    }
}

impl ToSql for Select {
    fn to_sql(&self, params: &mut ParamContext) -> String {
        let mut sql = String::from("SELECT ");
        sql.push_str(&join_sql(&self.items, params));

        sql.push_str(" FROM ");
        sql.push_str(&self.from.to_sql(params));

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.to_sql(params));
        }

        if !self.filters.is_empty() {
            let conditions: Vec<String> =
                self.filters.iter().map(|f| operand(f, params)).collect();
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&join_sql(&self.group_by, params));
        }

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&join_sql(&self.order_by, params));
        }

        // SQLite has no OFFSET without LIMIT; -1 means unbounded.
        match (self.limit, self.offset) {
            (Some(n), Some(m)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", n, m)),
            (Some(n), None) => sql.push_str(&format!(" LIMIT {}", n)),
            (None, Some(m)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", m)),
            (None, None) => {}
        }

        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::ast::BinaryOp;
    use pretty_assertions::assert_eq;

    fn table(name: &str, alias: &str) -> TableRef {
        TableRef::Table {
            name: name.into(),
            alias: alias.into(),
        }
    }

    #[test]
    fn test_simple_select() {
        let mut select = Select::new(table("todo", "t0"));
        select.items.push(SelectItem::named(Expr::column("t0", "id"), "id"));
        select.filters.push(Expr::binary(
            Expr::column("t0", "priority"),
            BinaryOp::Gte,
            Expr::Param(Value::Int(2)),
        ));
        select.filters.push(Expr::column("t0", "comment").is_not_null());
        select.order_by.push(OrderBy::new(Expr::column("t0", "id"), SortOrder::Desc));
        select.limit = Some(20);

        let stmt = select.to_statement();
        assert_eq!(
            stmt.sql,
            r#"SELECT "t0"."id" AS "id" FROM "todo" AS "t0" WHERE ("t0"."priority" >= ?) AND ("t0"."comment" IS NOT NULL) ORDER BY "t0"."id" DESC LIMIT 20"#
        );
        assert_eq!(stmt.params, vec![Value::Int(2)]);
    }

    #[test]
    fn test_params_follow_text_order() {
        let mut inner = Select::new(table("todoslave", "t1"));
        inner.items.push(SelectItem::named(Expr::column("t1", "todo_id"), "__key"));
        inner.filters.push(Expr::binary(
            Expr::column("t1", "comment"),
            BinaryOp::Eq,
            Expr::Param(Value::from("inner")),
        ));

        let mut outer = Select::new(table("todo", "t0"));
        outer.items.push(SelectItem::named(Expr::column("t0", "id"), "id"));
        outer.joins.push(Join {
            kind: JoinKind::Inner,
            source: TableRef::Derived {
                query: Box::new(inner),
                alias: "t2".into(),
            },
            on: Expr::binary(
                Expr::column("t0", "id"),
                BinaryOp::Eq,
                Expr::column("t2", "__key"),
            ),
        });
        outer.filters.push(Expr::InList {
            expr: Box::new(Expr::column("t0", "id")),
            list: vec![Expr::Param(Value::Int(1)), Expr::Param(Value::Int(2))],
        });

        let stmt = outer.to_statement();
        assert_eq!(
            stmt.params,
            vec![Value::from("inner"), Value::Int(1), Value::Int(2)]
        );
        assert!(stmt.sql.contains(r#"JOIN (SELECT "t1"."todo_id" AS "__key" FROM "todoslave" AS "t1" WHERE ("t1"."comment" = ?)) AS "t2" ON "t0"."id" = "t2"."__key""#));
        assert!(stmt.sql.ends_with(r#"WHERE ("t0"."id" IN (?, ?))"#));
    }

    #[test]
    fn test_offset_without_limit() {
        let mut select = Select::new(table("todo", "t0"));
        select.items.push(SelectItem::named(Expr::Int(1), "one"));
        select.offset = Some(5);
        assert!(select.to_statement().sql.ends_with("LIMIT -1 OFFSET 5"));
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote_identifier(r#"we"ird"#), r#""we""ird""#);
        assert_eq!(quote_text("it's"), "'it''s'");
    }

    #[test]
    fn test_case_and_window() {
        let case = Expr::Case {
            when: Box::new(Expr::column("t1", "__key").is_not_null()),
            then: Box::new(Expr::func("json", vec![Expr::column("t1", "obj")])),
            otherwise: Some(Box::new(Expr::func("json", vec![Expr::text("[]")]))),
        };
        let window = Expr::RowNumber {
            partition_by: vec![Expr::column("t2", "todo_id")],
            order_by: vec![OrderBy::new(Expr::column("t2", "id"), SortOrder::Asc)],
        };
        let mut params = ParamContext::new();
        assert_eq!(
            case.to_sql(&mut params),
            r#"CASE WHEN "t1"."__key" IS NOT NULL THEN json("t1"."obj") ELSE json('[]') END"#
        );
        assert_eq!(
            window.to_sql(&mut params),
            r#"ROW_NUMBER() OVER (PARTITION BY "t2"."todo_id" ORDER BY "t2"."id" ASC)"#
        );
        assert!(params.params.is_empty());
    }
}
