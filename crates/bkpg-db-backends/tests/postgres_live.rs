//! Round-trip tests against a live PostgreSQL server.
//!
//! These run only when `BKPG_TEST_LIVE=1` is set; the connection is taken
//! from the usual `BKPG_DB_*` / `PG*` environment variables. Each test
//! works in its own temporary-named table and drops it afterwards.

#![cfg(feature = "postgres")]

use std::collections::HashMap;
use std::sync::Arc;

use bkpg_core::settings_loader;
use bkpg_db::fields::{FieldDef, FieldType};
use bkpg_db::filter::FilterDescriptor;
use bkpg_db::manager::Manager;
use bkpg_db::query::OrderBy;
use bkpg_db::schema::ModelSchema;
use bkpg_db::value::Value;
use bkpg_db::Executor;
use bkpg_db_backends::PostgresExecutor;

fn live_executor() -> Option<PostgresExecutor> {
    if std::env::var("BKPG_TEST_LIVE").ok().as_deref() != Some("1") {
        return None;
    }
    let settings = settings_loader::from_env();
    Some(PostgresExecutor::from_settings(&settings.database).unwrap())
}

fn schema(table: &str) -> Arc<ModelSchema> {
    Arc::new(
        ModelSchema::builder("Producto", table)
            .field(FieldDef::new("id", FieldType::Integer).primary_key().nullable())
            .field(FieldDef::new("name", FieldType::String).column("nombre"))
            .field(FieldDef::new("price", FieldType::Float).nullable())
            .field(FieldDef::new("tags", FieldType::array_of(FieldType::String)).nullable())
            .field(FieldDef::new("attrs", FieldType::Json).nullable())
            .build()
            .unwrap(),
    )
}

fn raw(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

#[tokio::test]
async fn test_crud_round_trip() {
    let Some(executor) = live_executor() else {
        return;
    };
    let table = format!("bkpg_live_{}", uuid::Uuid::new_v4().simple());
    executor
        .execute(
            &format!(
                "CREATE TABLE {table} (id BIGSERIAL PRIMARY KEY, nombre TEXT NOT NULL, \
                 price DOUBLE PRECISION, tags TEXT[], attrs JSONB)"
            ),
            &[],
        )
        .await
        .unwrap();

    let manager = Manager::new(schema(&table), executor);
    let created = manager
        .create(&raw(&[
            ("name", Value::from("Mesa")),
            ("price", Value::Float(99.5)),
            ("tags", Value::List(vec![Value::from("madera")])),
            ("attrs", Value::Json(serde_json::json!({"color": "roble"}))),
        ]))
        .await
        .unwrap();
    assert!(created.get::<i64>("id").unwrap() > 0);
    manager
        .create(&raw(&[("name", Value::from("Silla"))]))
        .await
        .unwrap();

    let found = manager
        .getlist(&[FilterDescriptor::leaf("name", "like", "%es%")], None)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(
        found[0].get_value("attrs"),
        Some(&Value::Json(serde_json::json!({"color": "roble"})))
    );

    let page = manager
        .getlist_page(&[], 1, 10, &[OrderBy::desc("name")])
        .await
        .unwrap();
    assert_eq!(page[0].get::<String>("name").unwrap(), "Silla");
    assert_eq!(manager.count(&[]).await.unwrap(), 2);

    let updated = manager
        .update(
            &[FilterDescriptor::is_null("price")],
            &raw(&[("price", Value::Int(10))]),
        )
        .await
        .unwrap();
    assert_eq!(updated, 1);
    let deleted = manager
        .delete(&[FilterDescriptor::leaf("price", "between", vec![Value::Int(0), Value::Int(50)])])
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    manager
        .executor()
        .execute(&format!("DROP TABLE {table}"), &[])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_database_error_is_reported() {
    let Some(executor) = live_executor() else {
        return;
    };
    let err = executor
        .query("SELECT * FROM bkpg_missing_table", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, bkpg_core::ExecutorError::Database(_)));
}

#[tokio::test]
async fn test_numeric_columns_decode() {
    let Some(executor) = live_executor() else {
        return;
    };
    let rows = executor
        .query(
            "SELECT 19.75::numeric AS total, ARRAY[1.5, NULL]::numeric[] AS parts, $1::numeric AS bound",
            &[Value::Int(12)],
        )
        .await
        .unwrap();
    assert_eq!(rows[0].get_value("total"), Some(&Value::Float(19.75)));
    assert_eq!(
        rows[0].get_value("parts"),
        Some(&Value::List(vec![Value::Float(1.5), Value::Null]))
    );
    assert_eq!(rows[0].get_value("bound"), Some(&Value::Float(12.0)));
}

#[tokio::test]
async fn test_undecodable_column_is_an_error() {
    let Some(executor) = live_executor() else {
        return;
    };
    let err = executor
        .query("SELECT '1 day'::interval AS span", &[])
        .await
        .unwrap_err();
    match err {
        bkpg_core::ExecutorError::Database(msg) => assert!(msg.contains("'span'")),
        other => panic!("unexpected error: {other:?}"),
    }
}
