//! Database execution engine.
//!
//! Runs compiled statements against SQLite through sqlx. A compiled query
//! always yields exactly one row with one text column: the JSON document.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use crate::ast::Value;
use crate::compiler::Query;
use crate::error::{TreeqlError, TreeqlResult};
use crate::sql::Statement;

/// A database connection for executing compiled queries.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect using a connection URL.
    ///
    /// - `sqlite://path/to/db.sqlite`
    /// - `sqlite::memory:`
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let db = Database::connect("sqlite://todo.db").await?;
    /// ```
    pub async fn connect(url: &str) -> TreeqlResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| TreeqlError::Database(format!("cannot connect to {}: {}", url, e)))?;
        tracing::info!("connected to {}", url);
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run a compiled query and return its JSON text.
    pub async fn run(&self, query: &Query) -> TreeqlResult<String> {
        self.fetch_json(&query.to_statement()).await
    }

    /// Execute a statement and return the JSON text in its single cell.
    pub async fn fetch_json(&self, statement: &Statement) -> TreeqlResult<String> {
        tracing::debug!("executing: {}", statement);

        let mut query = sqlx::query(&statement.sql);
        for param in &statement.params {
            query = match param {
                Value::Int(v) => query.bind(*v),
                Value::Float(v) => query.bind(*v),
                Value::Date(d) => query.bind(d.format("%Y-%m-%d").to_string()),
                Value::String(s) => query.bind(s.clone()),
                Value::List(_) => {
                    return Err(TreeqlError::compile(
                        "list values must be expanded before binding",
                    ));
                }
            };
        }

        let row: SqliteRow = query.fetch_one(&self.pool).await?;
        let json: Option<String> = row.try_get(0)?;
        Ok(json.unwrap_or_else(|| "[]".to_string()))
    }

    /// Execute a statement and parse the document.
    pub async fn fetch_value(&self, statement: &Statement) -> TreeqlResult<serde_json::Value> {
        let text = self.fetch_json(statement).await?;
        serde_json::from_str(&text)
            .map_err(|e| TreeqlError::Database(format!("query returned malformed JSON: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{Expr, Select, SelectItem, TableRef};

    async fn memory() -> Database {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        Database::from_pool(pool)
    }

    #[tokio::test]
    async fn test_binds_every_value_kind() {
        let db = memory().await;
        let statement = Statement {
            sql: "SELECT json_array(?, ?, ?, ?)".to_string(),
            params: vec![
                Value::Int(7),
                Value::Float(1.5),
                Value::Date(chrono::NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()),
                Value::from("x"),
            ],
        };
        let value = db.fetch_value(&statement).await.unwrap();
        assert_eq!(value, serde_json::json!([7, 1.5, "2024-02-29", "x"]));
    }

    #[tokio::test]
    async fn test_null_document_is_empty_array() {
        let db = memory().await;
        let statement = Statement {
            sql: "SELECT NULL".to_string(),
            params: vec![],
        };
        assert_eq!(db.fetch_json(&statement).await.unwrap(), "[]");
    }

    #[tokio::test]
    async fn test_list_params_are_refused() {
        let db = memory().await;
        let statement = Statement {
            sql: "SELECT ?".to_string(),
            params: vec![Value::List(vec![Value::Int(1)])],
        };
        let err = db.fetch_json(&statement).await.unwrap_err();
        assert!(matches!(err, TreeqlError::Compile(_)));
    }

    #[tokio::test]
    async fn test_runs_rendered_select() {
        let db = memory().await;
        sqlx::query("CREATE TABLE t (id INTEGER PRIMARY KEY)")
            .execute(db.pool())
            .await
            .unwrap();
        let mut select = Select::new(TableRef::Table {
            name: "t".into(),
            alias: "t0".into(),
        });
        select.items.push(SelectItem::named(
            Expr::func("json_group_array", vec![Expr::column("t0", "id")]),
            "result",
        ));
        assert_eq!(db.fetch_json(&select.to_statement()).await.unwrap(), "[]");
    }
}
