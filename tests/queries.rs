//! End-to-end: query text in, JSON out of a real SQLite database.

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use sqlx::sqlite::SqlitePoolOptions;
use treeql::prelude::*;

const SCHEMA: &str = include_str!("../demos/schema.toml");
const SEED: &str = include_str!("../demos/seed.sql");

async fn seeded() -> Database {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    for statement in SEED.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }
    Database::from_pool(pool)
}

fn registry() -> Registry {
    Registry::from_toml_str(SCHEMA).unwrap()
}

async fn run(entity: &str, text: &str) -> Value {
    let query = treeql::prepare(&registry(), entity, text).unwrap();
    let db = seeded().await;
    db.fetch_value(&query.to_statement()).await.unwrap()
}

#[tokio::test]
async fn test_flat_fields() {
    assert_eq!(
        run("todo", "q=(primary_key, instruction)").await,
        json!([
            {"primary_key": 1, "instruction": "buy milk"},
            {"primary_key": 2, "instruction": "walk dog"},
            {"primary_key": 3, "instruction": null},
        ])
    );
}

#[tokio::test]
async fn test_wildcard_with_exclusions() {
    let rows = run(
        "todo",
        "q=(*, !instruction, !creation_time, !is_principal, !worker, !deadline, !amount).limit(1)",
    )
    .await;
    assert_eq!(rows, json!([{"primary_key": 1, "preference": 1}]));
}

#[tokio::test]
async fn test_wildcard_keeps_everything_else() {
    let rows = run("todo", "q=(*, !instruction).filter(primary_key=2)").await;
    assert_eq!(
        rows,
        json!([{
            "primary_key": 2,
            "creation_time": "2024-01-11 09:00:00",
            "preference": 3,
            "is_principal": 0,
            "worker": "Bob Stone",
            "deadline": "2024-02-05",
            "amount": 2,
        }])
    );
}

#[tokio::test]
async fn test_to_many_relation_defaults_to_empty_array() {
    assert_eq!(
        run("todo", "q=(primary_key, slaves(primary_key, instruction))").await,
        json!([
            {"primary_key": 1, "slaves": [
                {"primary_key": 1, "instruction": "skim"},
                {"primary_key": 2, "instruction": "whole"},
            ]},
            {"primary_key": 2, "slaves": [{"primary_key": 3, "instruction": "leash"}]},
            {"primary_key": 3, "slaves": []},
        ])
    );
}

#[tokio::test]
async fn test_to_one_relation_defaults_to_null() {
    assert_eq!(
        run("todo_slave", "q=(primary_key, todo(worker), slavedetails(info))").await,
        json!([
            {"primary_key": 1, "todo": {"worker": "Ann Lee"}, "slavedetails": {"info": "fridge"}},
            {"primary_key": 2, "todo": {"worker": "Ann Lee"}, "slavedetails": null},
            {"primary_key": 3, "todo": {"worker": "Bob Stone"}, "slavedetails": {"info": "red leash"}},
            {"primary_key": 4, "todo": null, "slavedetails": null},
        ])
    );
}

#[tokio::test]
async fn test_three_levels_deep() {
    let rows = run(
        "todo",
        "q=(primary_key, slaves(instruction, slavedetails(info))).filter(primary_key<=2)",
    )
    .await;
    assert_eq!(
        rows,
        json!([
            {"primary_key": 1, "slaves": [
                {"instruction": "skim", "slavedetails": {"info": "fridge"}},
                {"instruction": "whole", "slavedetails": null},
            ]},
            {"primary_key": 2, "slaves": [
                {"instruction": "leash", "slavedetails": {"info": "red leash"}},
            ]},
        ])
    );
}

#[tokio::test]
async fn test_nested_filter_restricts_parents() {
    assert_eq!(
        run("todo", r#"q=(primary_key).filter(slaves.instruction="leash")"#).await,
        json!([{"primary_key": 2}])
    );
    assert_eq!(
        run("todo", r#"q=(primary_key).filter(slaves.slavedetails.info="fridge")"#).await,
        json!([{"primary_key": 1}])
    );
    assert_eq!(
        run("todo_slave", "q=(primary_key).filter(todo.preference>=2)").await,
        json!([{"primary_key": 3}])
    );
}

#[tokio::test]
async fn test_nested_filter_on_selected_relation() {
    assert_eq!(
        run(
            "todo",
            r#"q=(primary_key, slaves(instruction)).filter(slaves.instruction="whole")"#
        )
        .await,
        json!([{"primary_key": 1, "slaves": [{"instruction": "whole"}]}])
    );
}

#[tokio::test]
async fn test_relation_filter_keeps_parents() {
    assert_eq!(
        run(
            "todo",
            r#"q=(primary_key, slaves(instruction).filter(instruction="whole"))"#
        )
        .await,
        json!([
            {"primary_key": 1, "slaves": [{"instruction": "whole"}]},
            {"primary_key": 2, "slaves": []},
            {"primary_key": 3, "slaves": []},
        ])
    );
}

#[tokio::test]
async fn test_root_paging_and_sorting() {
    assert_eq!(
        run("todo", "q=(primary_key).order(preference, desc).limit(2)").await,
        json!([{"primary_key": 2}, {"primary_key": 3}])
    );
    assert_eq!(
        run("todo", "q=(primary_key).offset(1)").await,
        json!([{"primary_key": 2}, {"primary_key": 3}])
    );
    assert_eq!(
        run("todo", "q=(primary_key).offset(1).limit(1)").await,
        json!([{"primary_key": 2}])
    );
    assert_eq!(
        run("todo", "q=(primary_key).limit(0).order(primary_key, desc)").await,
        json!([{"primary_key": 3}, {"primary_key": 2}, {"primary_key": 1}])
    );
}

#[tokio::test]
async fn test_relation_paging_is_per_parent() {
    assert_eq!(
        run(
            "todo",
            "q=(primary_key, slaves(primary_key).order(primary_key, desc).limit(1))"
        )
        .await,
        json!([
            {"primary_key": 1, "slaves": [{"primary_key": 2}]},
            {"primary_key": 2, "slaves": [{"primary_key": 3}]},
            {"primary_key": 3, "slaves": []},
        ])
    );
    assert_eq!(
        run("todo", "q=(primary_key, slaves(primary_key).offset(1)).limit(1)").await,
        json!([{"primary_key": 1, "slaves": [{"primary_key": 2}]}])
    );
}

#[tokio::test]
async fn test_relation_sorting_without_paging() {
    assert_eq!(
        run("todo", "q=(primary_key, slaves(primary_key).order(primary_key, desc))").await,
        json!([
            {"primary_key": 1, "slaves": [{"primary_key": 2}, {"primary_key": 1}]},
            {"primary_key": 2, "slaves": [{"primary_key": 3}]},
            {"primary_key": 3, "slaves": []},
        ])
    );
}

#[tokio::test]
async fn test_relation_paging_does_not_drop_matching_parents() {
    assert_eq!(
        run(
            "todo",
            "q=(primary_key, slaves(primary_key).offset(1)).filter(slaves.primary_key>0)"
        )
        .await,
        json!([
            {"primary_key": 1, "slaves": [{"primary_key": 2}]},
            {"primary_key": 2, "slaves": []},
        ])
    );
    assert_eq!(
        run(
            "todo",
            r#"q=(primary_key, slaves(instruction).order(primary_key, desc).limit(1)).filter(slaves.instruction="skim")"#
        )
        .await,
        json!([{"primary_key": 1, "slaves": [{"instruction": "skim"}]}])
    );
}

#[tokio::test]
async fn test_filter_operators() {
    let ids = |rows: Value| -> Vec<i64> {
        rows.as_array()
            .unwrap()
            .iter()
            .map(|r| r["primary_key"].as_i64().unwrap())
            .collect()
    };

    assert_eq!(ids(run("todo", r#"q=(primary_key).filter(instruction ilike "%MILK%")"#).await), vec![1]);
    assert_eq!(ids(run("todo", r#"q=(primary_key).filter(instruction like "walk%")"#).await), vec![2]);
    assert_eq!(ids(run("todo", "q=(primary_key).filter(primary_key in [1, 3])").await), vec![1, 3]);
    assert_eq!(ids(run("todo", "q=(primary_key).filter(instruction is_null 1)").await), vec![3]);
    assert_eq!(ids(run("todo", "q=(primary_key).filter(instruction is_null 0)").await), vec![1, 2]);
    assert_eq!(ids(run("todo", "q=(primary_key).filter(deadline>=2024-02-05)").await), vec![2, 3]);
    assert_eq!(ids(run("todo", "q=(primary_key).filter(creation_time<2024-01-11)").await), vec![1]);
    assert_eq!(ids(run("todo", "q=(primary_key).filter(preference!=3).filter(amount=1)").await), vec![1, 3]);
    assert_eq!(ids(run("todo", r#"q=(primary_key).filter(worker="Ann Lee")"#).await), vec![1]);
}

#[tokio::test]
async fn test_empty_result_is_an_empty_array() {
    let query = treeql::prepare(&registry(), "todo", "q=(primary_key).filter(primary_key=99)").unwrap();
    let db = seeded().await;
    assert_eq!(db.fetch_json(&query.to_statement()).await.unwrap(), "[]");
}

#[tokio::test]
async fn test_default_page_size() {
    let db = seeded().await;
    for id in 10..40 {
        sqlx::query("INSERT INTO todo (id, priority) VALUES (?, 0)")
            .bind(id)
            .execute(db.pool())
            .await
            .unwrap();
    }
    let query = treeql::prepare(&registry(), "todo", "q=(primary_key)").unwrap();
    let rows = db.fetch_value(&query.to_statement()).await.unwrap();
    assert_eq!(rows.as_array().unwrap().len(), DEFAULT_LIMIT as usize);
}

#[tokio::test]
async fn test_wire_encoded_query() {
    let text = treeql::decode_query_string("q=%28primary_key%29.filter%28primary_key%3D2%29").unwrap();
    assert_eq!(run("todo", &text).await, json!([{"primary_key": 2}]));
}

#[test]
fn test_client_errors() {
    let registry = registry();

    let err = treeql::prepare(&registry, "todo", "q=(primary_key").unwrap_err();
    assert!(matches!(err, TreeqlError::Syntax { position: 14, .. }));
    assert_eq!(err.kind(), ErrorKind::Client);

    let err = treeql::prepare(&registry, "todo", "q=(id)").unwrap_err();
    assert_eq!(err.status_code(), 422);
    assert!(err.to_string().contains("'id'"));

    let err = treeql::prepare(&registry, "todo", "q=(primary_key).filter(slaves.nope=1)").unwrap_err();
    assert!(err.to_string().contains("unknown field 'nope' on 'todo_slave'"));

    let err = treeql::prepare(&registry, "todo", "q=(primary_key).filter(primary_key=[1, 2])").unwrap_err();
    assert!(matches!(err, TreeqlError::Validation(_)));

    let err = treeql::prepare(&registry, "todo", "q=(primary_key).filter(instruction like 3)").unwrap_err();
    assert!(matches!(err, TreeqlError::Validation(_)));

    let err = treeql::prepare(&registry, "todo", "q=(primary_key).filter(primary_key in [1, \"2\"])").unwrap_err();
    assert!(matches!(err, TreeqlError::Validation(_)));
}

#[test]
fn test_compiling_twice_is_identical() {
    let registry = registry();
    let text = "q=(*, slaves(*, slavedetails(info)).limit(3)).filter(slaves.todo.preference>1).order(deadline, desc)";
    let a = treeql::prepare(&registry, "todo", text).unwrap();
    let b = treeql::prepare(&registry, "todo", text).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.to_statement(), b.to_statement());
}
