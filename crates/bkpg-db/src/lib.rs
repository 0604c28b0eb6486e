//! # bkpg-db
//!
//! The query construction and validation core of bkpg. Model schemas
//! validate rows against typed fields, filter descriptors are checked
//! against a schema before any SQL exists, and the compiler produces
//! PostgreSQL statements whose variable data travels only as positional
//! parameters.
//!
//! ## Module Overview
//!
//! - [`value`] - The backend-agnostic [`Value`](value::Value) enum
//! - [`fields`] - Field types, field definitions and the custom type registry
//! - [`validators`] - Field constraint validators
//! - [`schema`] - [`ModelSchema`](schema::ModelSchema) and typed [`Record`](schema::Record)s
//! - [`filter`] - Filter descriptors and validated filter expressions
//! - [`query`] - The SQL compiler and pagination options
//! - [`executor`] - The [`Executor`](executor::Executor) trait
//! - [`manager`] - The CRUD [`Manager`](manager::Manager)
//! - [`export`] - Schema export for web/serialization layers

// These clippy lints are intentionally allowed for this crate:
// - cast_precision_loss: i64-to-f64 casts are acceptable for numeric coercion
// - result_large_err: BkError is the shared error type and is used consistently
// - doc_markdown: backtick requirements for documentation items are too strict
// - return_self_not_must_use: builder pattern methods are self-documenting
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::result_large_err)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::unused_self)]

pub mod executor;
pub mod export;
pub mod fields;
pub mod filter;
pub mod ident;
pub mod manager;
pub mod query;
pub mod row;
pub mod schema;
pub mod validators;
pub mod value;

// Re-export the most commonly used types at the crate root.
pub use executor::Executor;
pub use export::{export_schema, FieldExport, SchemaExport};
pub use fields::{
    register_custom_type, resolve_type, CustomType, FieldDef, FieldType, TypeRegistry,
};
pub use filter::{
    ColumnFunction, Condition, FilterDescriptor, FilterExpression, Logic, Operand, Operator,
};
pub use manager::{Manager, ManagerHooks};
pub use query::{
    CompiledQuery, Direction, JsonMode, OrderBy, Pagination, QueryOptions, SqlCompiler,
};
pub use row::{FromValue, Row};
pub use schema::{ModelSchema, ModelSchemaBuilder, Record};
pub use validators::Validator;
pub use value::Value;
