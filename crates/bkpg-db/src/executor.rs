//! Statement executor trait.
//!
//! The [`Executor`] is the only boundary between the query core and a live
//! database. It receives finished SQL text plus positional parameters and
//! returns rows or an affected-row count. Connection handling, pooling,
//! cancellation and timeouts all belong to the implementation; the core
//! invokes it at most once per compiled statement.
//!
//! The PostgreSQL implementation lives in the `bkpg-db-backends` crate.

use std::sync::Arc;

use bkpg_core::ExecutorError;

use crate::query::JsonMode;
use crate::row::Row;
use crate::value::Value;

/// Minimal async statement executor.
///
/// Implementations must be safe for concurrent use when a
/// [`Manager`](crate::manager::Manager) is shared across tasks.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    /// Runs a statement and returns all result rows.
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, ExecutorError>;

    /// Runs a statement that returns no rows and reports the affected-row count.
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, ExecutorError>;

    /// How this executor wants JSON parameters bound.
    fn json_mode(&self) -> JsonMode {
        JsonMode::Native
    }
}

#[async_trait::async_trait]
impl<E: Executor + ?Sized> Executor for Arc<E> {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, ExecutorError> {
        (**self).query(sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, ExecutorError> {
        (**self).execute(sql, params).await
    }

    fn json_mode(&self) -> JsonMode {
        (**self).json_mode()
    }
}
