//! Integration tests for the manager pipeline.
//!
//! These tests drive a [`Manager`] end to end against a recording executor:
//! schema definition, row validation, filter building, SQL compilation,
//! execution and result mapping back to records.

use std::collections::HashMap;
use std::sync::Arc;

use bkpg_core::{BkError, BuildStage, ExecutorError};
use bkpg_db::executor::Executor;
use bkpg_db::fields::{register_custom_type, CustomType, FieldDef, FieldType};
use bkpg_db::filter::FilterDescriptor;
use bkpg_db::manager::Manager;
use bkpg_db::query::{JsonMode, OrderBy};
use bkpg_db::row::Row;
use bkpg_db::schema::ModelSchema;
use bkpg_db::value::Value;
use bkpg_db::export_schema;
use tokio::sync::Mutex as TokioMutex;

// ── Recording executor ────────────────────────────────────────────────

/// Answers every query with canned rows and records what it was sent.
struct MockDb {
    rows: TokioMutex<Vec<Row>>,
    executed: TokioMutex<Vec<(String, Vec<Value>)>>,
    json_mode: JsonMode,
    fail: bool,
}

impl MockDb {
    fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: TokioMutex::new(rows),
            executed: TokioMutex::new(Vec::new()),
            json_mode: JsonMode::Native,
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    async fn executed(&self) -> Vec<(String, Vec<Value>)> {
        self.executed.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl Executor for MockDb {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, ExecutorError> {
        self.executed
            .lock()
            .await
            .push((sql.to_string(), params.to_vec()));
        if self.fail {
            return Err(ExecutorError::Database("relation does not exist".to_string()));
        }
        Ok(self.rows.lock().await.clone())
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, ExecutorError> {
        self.executed
            .lock()
            .await
            .push((sql.to_string(), params.to_vec()));
        if self.fail {
            return Err(ExecutorError::Database("relation does not exist".to_string()));
        }
        Ok(1)
    }

    fn json_mode(&self) -> JsonMode {
        self.json_mode
    }
}

// ── Fixtures ──────────────────────────────────────────────────────────

fn persona_schema() -> Arc<ModelSchema> {
    Arc::new(
        ModelSchema::builder("Persona", "personas")
            .field(FieldDef::new("id", FieldType::Integer).primary_key())
            .field(FieldDef::new("name", FieldType::String))
            .field(FieldDef::new("email", FieldType::String).nullable())
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

// ── Scenarios ─────────────────────────────────────────────────────────

#[test]
fn test_validate_row_nullable_email() {
    let schema = persona_schema();
    let record = schema
        .validate_row(&raw(&[
            ("id", Value::Int(1)),
            ("name", Value::from("Ana")),
            ("email", Value::Null),
        ]))
        .unwrap();
    assert_eq!(record.get_value("email"), Some(&Value::Null));
    assert_eq!(record.get::<String>("name").unwrap(), "Ana");
}

#[test]
fn test_validate_row_missing_id() {
    let schema = persona_schema();
    let errors = schema
        .validate_row(&raw(&[("name", Value::from("Ana"))]))
        .unwrap_err();
    assert_eq!(errors.len(), 1);
    let error = errors.iter().next().unwrap();
    assert_eq!(error.field, "id");
    assert_eq!(error.reason, "required");
}

#[tokio::test]
async fn test_ilike_filter_scenario() {
    let manager = Manager::new(persona_schema(), MockDb::new(Vec::new()));
    manager
        .getlist(&[FilterDescriptor::leaf("name", "ILIKE", "%an%")], None)
        .await
        .unwrap();
    let executed = manager.executor().executed().await;
    assert_eq!(executed[0].0, "SELECT * FROM personas WHERE name ILIKE $1");
    assert_eq!(executed[0].1, vec![Value::from("%an%")]);
}

#[tokio::test]
async fn test_or_group_scenario() {
    let manager = Manager::new(persona_schema(), MockDb::new(Vec::new()));
    let filters = [FilterDescriptor::or(vec![
        FilterDescriptor::leaf("id", "=", 1_i64),
        FilterDescriptor::leaf("id", "=", 2_i64),
    ])];
    manager.getlist(&filters, None).await.unwrap();
    let executed = manager.executor().executed().await;
    assert_eq!(
        executed[0].0,
        "SELECT * FROM personas WHERE (id = $1 OR id = $2)"
    );
    assert_eq!(executed[0].1, vec![Value::Int(1), Value::Int(2)]);
}

#[tokio::test]
async fn test_equality_with_list_scenario() {
    let manager = Manager::new(persona_schema(), MockDb::new(Vec::new()));
    manager
        .getlist(
            &[FilterDescriptor::leaf(
                "id",
                "=",
                vec![Value::Int(1), Value::Int(2)],
            )],
            None,
        )
        .await
        .unwrap();
    let executed = manager.executor().executed().await;
    assert_eq!(executed[0].0, "SELECT * FROM personas WHERE id IN ($1, $2)");
    assert_eq!(executed[0].1, vec![Value::Int(1), Value::Int(2)]);
}

#[tokio::test]
async fn test_pagination_after_where() {
    let manager = Manager::new(persona_schema(), MockDb::new(Vec::new()));
    let pagination = bkpg_db::Pagination::new()
        .limit(10)
        .offset(20)
        .order_by(OrderBy::desc("id"));
    manager
        .getlist(
            &[FilterDescriptor::leaf("name", "ILIKE", "%an%")],
            Some(&pagination),
        )
        .await
        .unwrap();
    let executed = manager.executor().executed().await;
    assert_eq!(
        executed[0].0,
        "SELECT * FROM personas WHERE name ILIKE $1 ORDER BY id DESC LIMIT $2 OFFSET $3"
    );
    assert_eq!(
        executed[0].1,
        vec![Value::from("%an%"), Value::Int(10), Value::Int(20)]
    );
}

#[tokio::test]
async fn test_unfiltered_writes_refused() {
    let manager = Manager::new(persona_schema(), MockDb::new(Vec::new()));
    let patch = raw(&[("name", Value::from("Eva"))]);

    let err = manager.update(&[], &patch).await.unwrap_err();
    assert!(matches!(err, BkError::QueryBuild(ref e) if e.stage == BuildStage::Update));
    let err = manager.delete(&[]).await.unwrap_err();
    assert!(matches!(err, BkError::QueryBuild(ref e) if e.stage == BuildStage::Delete));
    assert!(manager.executor().executed().await.is_empty());
}

// ── Pipeline ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_definition_to_records() {
    let schema = ModelSchema::from_definition(&serde_json::json!({
        "model_name": "Producto",
        "table": "public.producto",
        "id_field": "id",
        "fields": {
            "id": {"type": "integer", "nullable": false, "primary_key": true},
            "name": {"type": "string", "nullable": false, "db_name": "nombre", "max_length": 50},
            "price": {"type": "float", "min_value": 0},
            "tags": {"type": "array<string>"}
        }
    }))
    .unwrap();
    let rows = vec![
        Row::from_pairs([
            ("id", Value::Int(1)),
            ("nombre", Value::from("Mesa")),
            ("price", Value::Float(99.5)),
            ("tags", Value::List(vec![Value::from("madera")])),
        ]),
        Row::from_pairs([
            ("id", Value::Int(2)),
            ("nombre", Value::from("Silla")),
            ("price", Value::Null),
            ("tags", Value::Null),
        ]),
    ];
    let manager = Manager::new(Arc::new(schema), MockDb::new(rows));

    let records = manager
        .getlist_page(
            &[FilterDescriptor::leaf("name", "like", "%a%")],
            1,
            25,
            &[OrderBy::asc("name")],
        )
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get::<String>("name").unwrap(), "Mesa");
    assert_eq!(
        records[0].get_value("tags"),
        Some(&Value::List(vec![Value::from("madera")]))
    );
    assert_eq!(records[1].get_value("price"), Some(&Value::Null));

    let executed = manager.executor().executed().await;
    assert_eq!(
        executed[0].0,
        "SELECT * FROM public.producto WHERE nombre ILIKE $1 ORDER BY nombre ASC LIMIT $2 OFFSET $3"
    );

    let err = manager
        .create(&raw(&[
            ("id", Value::Int(3)),
            ("name", Value::from("x".repeat(51))),
            ("price", Value::Float(-1.0)),
        ]))
        .await
        .unwrap_err();
    let errors = err.validation_errors().unwrap();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors.for_field("name").count(), 1);
    assert_eq!(errors.for_field("price").count(), 1);
    assert_eq!(manager.executor().executed().await.len(), 1);

    let export = export_schema(manager.schema());
    assert_eq!(export.field("name").unwrap().db_name, "nombre");
    assert!(export.field("price").unwrap().nullable);
}

#[tokio::test]
async fn test_json_text_mode_binding() {
    let schema = Arc::new(
        ModelSchema::builder("Evento", "eventos")
            .field(FieldDef::new("id", FieldType::Integer).primary_key())
            .field(FieldDef::new("payload", FieldType::Json))
            .build()
            .unwrap(),
    );
    let db = MockDb {
        json_mode: JsonMode::Text,
        ..MockDb::new(Vec::new())
    };
    let manager = Manager::new(schema, db);
    manager
        .create(&raw(&[
            ("id", Value::Int(1)),
            ("payload", Value::Json(serde_json::json!({"ok": true}))),
        ]))
        .await
        .unwrap();
    let executed = manager.executor().executed().await;
    assert_eq!(
        executed[0].0,
        "INSERT INTO eventos (id, payload) VALUES ($1, $2) RETURNING *"
    );
    assert_eq!(executed[0].1[1], Value::from(r#"{"ok":true}"#));
}

#[tokio::test]
async fn test_custom_type_round_trip() {
    register_custom_type(
        CustomType::new("scenario_cents", |value| match value {
            Value::Int(cents) if *cents >= 0 => Ok(value.clone()),
            _ => Err("expected non-negative cents".to_string()),
        })
        .ordered()
        .sql_type("BIGINT"),
    )
    .unwrap();

    let schema = Arc::new(
        ModelSchema::from_definition(&serde_json::json!({
            "model_name": "Cuenta",
            "table": "cuentas",
            "fields": {
                "id": {"type": "integer", "nullable": false},
                "balance": {"type": "scenario_cents", "nullable": false}
            }
        }))
        .unwrap(),
    );
    let manager = Manager::new(schema, MockDb::new(Vec::new()));
    manager
        .getlist(&[FilterDescriptor::leaf("balance", ">", 100_i64)], None)
        .await
        .unwrap();
    let err = manager
        .getlist(&[FilterDescriptor::leaf("balance", ">", -5_i64)], None)
        .await
        .unwrap_err();
    assert!(matches!(err, BkError::Validation(_)));
    assert_eq!(manager.executor().executed().await.len(), 1);
}

#[tokio::test]
async fn test_executor_failure_surfaces() {
    let manager = Manager::new(persona_schema(), MockDb::failing());
    let err = manager.count(&[]).await.unwrap_err();
    assert!(matches!(err, BkError::Executor(ExecutorError::Database(_))));
}
