//! # bkpg
//!
//! Typed model schemas, validated filters and parameterized SQL compilation
//! for PostgreSQL.
//!
//! This is the meta-crate that re-exports all sub-crates for convenient access.
//! You can depend on `bkpg` to get everything, or depend on individual crates
//! for finer-grained control.
//!
//! ```ignore
//! use bkpg::prelude::*;
//!
//! let schema = Arc::new(ModelSchema::from_definition(&definition)?);
//! let executor = PostgresExecutor::from_settings(&settings.database)?;
//! let manager = Manager::new(schema, executor);
//! let page = manager
//!     .getlist_page(&[FilterDescriptor::leaf("name", "like", "%mesa%")], 1, 25, &[])
//!     .await?;
//! ```

/// Error types, settings and logging setup.
pub use bkpg_core as core;

/// Field types, model schemas, filters, the SQL compiler and the manager.
pub use bkpg_db as db;

/// Statement executors: PostgreSQL.
pub use bkpg_db_backends as db_backends;

// Third-party crates used in the public API.
pub use async_trait;
pub use chrono;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;
pub use uuid;

/// The types most programs need.
pub mod prelude {
    pub use std::sync::Arc;

    pub use bkpg_core::{BkError, BkResult, ExecutorError, Settings};
    pub use bkpg_db::{
        export_schema, register_custom_type, CustomType, Direction, Executor, FieldDef,
        FieldType, FilterDescriptor, Manager, ManagerHooks, ModelSchema, OrderBy, Pagination,
        Record, Row, Value,
    };
    #[cfg(feature = "postgres")]
    pub use bkpg_db_backends::PostgresExecutor;
}
