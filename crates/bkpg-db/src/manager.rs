//! The CRUD manager.
//!
//! A [`Manager`] ties a [`ModelSchema`] to an [`Executor`]. Each call
//! validates its own input (rows through the schema, filters through
//! [`FilterExpression::build`]), compiles one statement and hands it to the
//! executor. Nothing is cached between calls, and no statement reaches the
//! executor once validation or compilation has failed.
//!
//! # Examples
//!
//! ```ignore
//! let manager = Manager::new(schema, executor).with_table("public.producto");
//! let rows = manager
//!     .getlist(&[FilterDescriptor::leaf("nombre", "like", "%mesa%")], None)
//!     .await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use bkpg_core::logging::statement_span;
use bkpg_core::{BkError, BkResult};
use tracing::Instrument;

use crate::executor::Executor;
use crate::filter::{FilterDescriptor, FilterExpression};
use crate::query::{CompiledQuery, OrderBy, Pagination, QueryOptions, SqlCompiler};
use crate::row::Row;
use crate::schema::{ModelSchema, Record};
use crate::value::Value;

/// Optional callbacks around manager writes.
///
/// All methods default to no-ops. A `before_*` hook returning `Err` aborts
/// the operation before any statement is executed.
pub trait ManagerHooks: Send + Sync {
    /// Called with the validated record before an INSERT.
    fn before_insert(&self, _record: &Record) -> BkResult<()> {
        Ok(())
    }

    /// Called with the stored record after an INSERT.
    fn after_insert(&self, _record: &Record) {}

    /// Called with the validated patch before an UPDATE.
    fn before_update(&self, _patch: &Record, _filters: &[FilterDescriptor]) -> BkResult<()> {
        Ok(())
    }

    /// Called with the affected-row count after an UPDATE.
    fn after_update(&self, _affected: u64) {}

    /// Called before a DELETE.
    fn before_delete(&self, _filters: &[FilterDescriptor]) -> BkResult<()> {
        Ok(())
    }

    /// Called with the affected-row count after a DELETE.
    fn after_delete(&self, _affected: u64) {}
}

/// Model-level CRUD operations over an executor.
pub struct Manager<E: Executor> {
    schema: Arc<ModelSchema>,
    executor: E,
    options: QueryOptions,
    hooks: Option<Arc<dyn ManagerHooks>>,
}

impl<E: Executor> std::fmt::Debug for Manager<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("model", &self.schema.name())
            .field("options", &self.options)
            .field("hooks", &self.hooks.is_some())
            .finish_non_exhaustive()
    }
}

impl<E: Executor> Manager<E> {
    /// Creates a manager for `schema` running statements on `executor`.
    pub fn new(schema: Arc<ModelSchema>, executor: E) -> Self {
        Self {
            schema,
            executor,
            options: QueryOptions::default(),
            hooks: None,
        }
    }

    /// Replaces the statement options.
    #[must_use]
    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// Targets `table` instead of the schema's bound table.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.options.table_override = Some(table.into());
        self
    }

    /// Reads from the rows of `clause` instead of the table.
    #[must_use]
    pub fn with_select_clause(mut self, clause: impl Into<String>) -> Self {
        self.options.custom_select_clause = Some(clause.into());
        self
    }

    /// Attaches lifecycle hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn ManagerHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// The managed schema.
    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    /// The underlying executor.
    pub const fn executor(&self) -> &E {
        &self.executor
    }

    /// The statement options in effect.
    pub const fn options(&self) -> &QueryOptions {
        &self.options
    }

    fn compiler(&self) -> SqlCompiler {
        SqlCompiler::new(self.executor.json_mode())
    }

    fn build_filter(&self, filters: &[FilterDescriptor]) -> BkResult<Option<FilterExpression>> {
        FilterExpression::build(&self.schema, filters).map_err(|e| {
            tracing::debug!(model = %self.schema.name(), error = %e, "Filter rejected");
            e
        })
    }

    async fn fetch(&self, query: &CompiledQuery<'_>, op: &'static str) -> BkResult<Vec<Row>> {
        let span = statement_span(self.schema.name(), op);
        async {
            tracing::debug!(sql = %query.sql, params = query.params.len(), "Executing query");
            let rows = self.executor.query(&query.sql, &query.params).await?;
            tracing::debug!(rows = rows.len(), "Query finished");
            Ok::<_, BkError>(rows)
        }
        .instrument(span)
        .await
    }

    async fn run(&self, query: &CompiledQuery<'_>, op: &'static str) -> BkResult<u64> {
        let span = statement_span(self.schema.name(), op);
        async {
            tracing::debug!(sql = %query.sql, params = query.params.len(), "Executing statement");
            let affected = self.executor.execute(&query.sql, &query.params).await?;
            tracing::debug!(affected, "Statement finished");
            Ok::<_, BkError>(affected)
        }
        .instrument(span)
        .await
    }

    fn map_rows(&self, rows: &[Row]) -> BkResult<Vec<Record>> {
        rows.iter().map(|row| self.schema.from_row(row)).collect()
    }

    /// Returns every record matching `filters`, ordered and paginated.
    pub async fn getlist(
        &self,
        filters: &[FilterDescriptor],
        pagination: Option<&Pagination>,
    ) -> BkResult<Vec<Record>> {
        let filter = self.build_filter(filters)?;
        let query =
            self.compiler()
                .compile_select(&self.schema, &self.options, filter.as_ref(), pagination)?;
        let rows = self.fetch(&query, "getlist").await?;
        self.map_rows(&rows)
    }

    /// Returns one 1-indexed page of `page_size` records.
    pub async fn getlist_page(
        &self,
        filters: &[FilterDescriptor],
        page: u64,
        page_size: u64,
        order_by: &[OrderBy],
    ) -> BkResult<Vec<Record>> {
        let mut pagination = Pagination::page(page, page_size)?;
        pagination.order_by = order_by.to_vec();
        self.getlist(filters, Some(&pagination)).await
    }

    /// Returns the first record matching `filters`, if any.
    ///
    /// With `unique` set, more than one match is an error
    /// (`MultipleObjectsReturned`).
    pub async fn get_one(
        &self,
        filters: &[FilterDescriptor],
        unique: bool,
    ) -> BkResult<Option<Record>> {
        let filter = self.build_filter(filters)?;
        let pagination = Pagination::new().limit(if unique { 2 } else { 1 });
        let query = self.compiler().compile_select(
            &self.schema,
            &self.options,
            filter.as_ref(),
            Some(&pagination),
        )?;
        let rows = self.fetch(&query, "get_one").await?;
        match rows.as_slice() {
            [] => Ok(None),
            [row] => self.schema.from_row(row).map(Some),
            [row, ..] if !unique => self.schema.from_row(row).map(Some),
            _ => Err(BkError::MultipleObjectsReturned(format!(
                "get_one() on {} returned more than one row",
                self.schema.name()
            ))),
        }
    }

    /// Counts the records matching `filters`.
    pub async fn count(&self, filters: &[FilterDescriptor]) -> BkResult<u64> {
        let filter = self.build_filter(filters)?;
        let query = self
            .compiler()
            .compile_count(&self.schema, &self.options, filter.as_ref())?;
        let rows = self.fetch(&query, "count").await?;
        let counter: i64 = match rows.first() {
            Some(row) => row.get("counter")?,
            None => 0,
        };
        u64::try_from(counter)
            .map_err(|_| BkError::Serialization(format!("Invalid row count {counter}")))
    }

    /// Validates and inserts a row, returning the stored record.
    ///
    /// When the executor returns no row for `RETURNING *`, the validated
    /// record is returned as-is.
    pub async fn create(&self, raw: &HashMap<String, Value>) -> BkResult<Record> {
        let record = self.schema.validate_row(raw)?;
        if let Some(hooks) = &self.hooks {
            hooks.before_insert(&record)?;
        }
        let query = self
            .compiler()
            .compile_insert(&self.schema, &self.options, &record)?;
        let rows = self.fetch(&query, "create").await?;
        let stored = match rows.first() {
            Some(row) => self.schema.from_row(row)?,
            None => record,
        };
        if let Some(hooks) = &self.hooks {
            hooks.after_insert(&stored);
        }
        Ok(stored)
    }

    /// Validates a partial row and applies it to the records matching
    /// `filters`. An empty filter list is refused; see [`Self::update_all`].
    pub async fn update(
        &self,
        filters: &[FilterDescriptor],
        raw_patch: &HashMap<String, Value>,
    ) -> BkResult<u64> {
        self.update_inner(filters, raw_patch, false).await
    }

    /// Applies a partial row to every record of the table.
    pub async fn update_all(&self, raw_patch: &HashMap<String, Value>) -> BkResult<u64> {
        self.update_inner(&[], raw_patch, true).await
    }

    async fn update_inner(
        &self,
        filters: &[FilterDescriptor],
        raw_patch: &HashMap<String, Value>,
        allow_unfiltered: bool,
    ) -> BkResult<u64> {
        let patch = self.schema.validate_patch(raw_patch)?;
        let filter = self.build_filter(filters)?;
        let query = self.compiler().compile_update(
            &self.schema,
            &self.options,
            &patch,
            filter.as_ref(),
            allow_unfiltered,
        )?;
        if let Some(hooks) = &self.hooks {
            hooks.before_update(&patch, filters)?;
        }
        let affected = self.run(&query, "update").await?;
        if let Some(hooks) = &self.hooks {
            hooks.after_update(affected);
        }
        Ok(affected)
    }

    /// Deletes the records matching `filters`. An empty filter list is
    /// refused; see [`Self::delete_all`].
    pub async fn delete(&self, filters: &[FilterDescriptor]) -> BkResult<u64> {
        self.delete_inner(filters, false).await
    }

    /// Deletes every record of the table.
    pub async fn delete_all(&self) -> BkResult<u64> {
        self.delete_inner(&[], true).await
    }

    async fn delete_inner(
        &self,
        filters: &[FilterDescriptor],
        allow_unfiltered: bool,
    ) -> BkResult<u64> {
        let filter = self.build_filter(filters)?;
        let query = self.compiler().compile_delete(
            &self.schema,
            &self.options,
            filter.as_ref(),
            allow_unfiltered,
        )?;
        if let Some(hooks) = &self.hooks {
            hooks.before_delete(filters)?;
        }
        let affected = self.run(&query, "delete").await?;
        if let Some(hooks) = &self.hooks {
            hooks.after_delete(affected);
        }
        Ok(affected)
    }

    /// Runs `CALL name(args...)`.
    pub async fn execute_procedure(&self, name: &str, args: &[Value]) -> BkResult<u64> {
        let query = self
            .compiler()
            .compile_procedure_call(&self.schema, name, args)?;
        self.run(&query, "procedure").await
    }

    /// Runs `SELECT name(args...) AS result` and returns the result value.
    pub async fn execute_function(&self, name: &str, args: &[Value]) -> BkResult<Value> {
        let query = self
            .compiler()
            .compile_function_call(&self.schema, name, args)?;
        let rows = self.fetch(&query, "function").await?;
        Ok(rows
            .first()
            .and_then(|row| row.get_value("result").cloned())
            .unwrap_or(Value::Null))
    }
}
