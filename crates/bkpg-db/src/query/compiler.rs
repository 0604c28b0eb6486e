//! SQL compiler.
//!
//! The [`SqlCompiler`] turns a [`ModelSchema`], a validated
//! [`FilterExpression`] and [`Pagination`] options into a
//! [`CompiledQuery`]: PostgreSQL SQL text with `$1, $2, ...` placeholders and
//! the parameter list in placeholder order.
//!
//! Compilation is pure and deterministic. Every variable value flows through
//! the parameter list; the only text interpolated into SQL is identifiers
//! already checked at schema declaration time (or here, for overrides and
//! routine names) and the developer-authored custom select clause.

use bkpg_core::{BuildStage, QueryBuildError};

use super::pagination::Pagination;
use crate::filter::{Condition, FilterExpression, Operand};
use crate::ident::is_valid_identifier;
use crate::schema::{ModelSchema, Record};
use crate::value::Value;

/// How JSON parameters are handed to the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonMode {
    /// JSON documents are bound as native JSON parameters.
    #[default]
    Native,
    /// JSON documents are serialized and bound as text.
    Text,
}

/// Per-manager statement options.
///
/// `custom_select_clause` replaces the table as the row source. It is
/// developer-authored and is not validated; the compiler nests it as
/// `SELECT * FROM (<clause>) AS custom_select`, so filters, ordering and
/// pagination apply to its output columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Table to use instead of the schema's bound table.
    pub table_override: Option<String>,
    /// Query to select from instead of the table.
    pub custom_select_clause: Option<String>,
}

impl QueryOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the table name.
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table_override = Some(table.into());
        self
    }

    /// Replaces the base select clause.
    #[must_use]
    pub fn select_clause(mut self, clause: impl Into<String>) -> Self {
        self.custom_select_clause = Some(clause.into());
        self
    }
}

/// A compiled statement ready for an executor.
#[derive(Debug, Clone)]
pub struct CompiledQuery<'s> {
    /// SQL text with `$n` placeholders.
    pub sql: String,
    /// Parameters, in placeholder order.
    pub params: Vec<Value>,
    /// Schema the result rows are mapped through.
    pub row_shape: &'s ModelSchema,
}

impl PartialEq for CompiledQuery<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.sql == other.sql
            && self.params == other.params
            && std::ptr::eq(self.row_shape, other.row_shape)
    }
}

impl CompiledQuery<'_> {
    /// Counts the `$n` placeholders in the SQL text.
    pub fn placeholder_count(&self) -> usize {
        let bytes = self.sql.as_bytes();
        bytes
            .windows(2)
            .filter(|w| w[0] == b'$' && w[1].is_ascii_digit())
            .count()
    }
}

/// Compiles statements for PostgreSQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlCompiler {
    json_mode: JsonMode,
}

impl SqlCompiler {
    /// Creates a new compiler binding JSON parameters according to `json_mode`.
    pub const fn new(json_mode: JsonMode) -> Self {
        Self { json_mode }
    }

    /// The JSON binding mode of this compiler.
    pub const fn json_mode(&self) -> JsonMode {
        self.json_mode
    }

    /// Appends a parameter and returns its placeholder.
    fn bind(&self, params: &mut Vec<Value>, value: Value) -> String {
        params.push(self.adapt(value));
        format!("${}", params.len())
    }

    fn adapt(&self, value: Value) -> Value {
        match (self.json_mode, value) {
            (JsonMode::Text, Value::Json(doc)) => Value::String(doc.to_string()),
            (JsonMode::Text, Value::List(items)) => {
                Value::List(items.into_iter().map(|v| self.adapt(v)).collect())
            }
            (_, v) => v,
        }
    }

    fn table<'a>(
        schema: &'a ModelSchema,
        options: &'a QueryOptions,
        stage: BuildStage,
    ) -> Result<&'a str, QueryBuildError> {
        match options.table_override.as_deref() {
            Some(table) if !is_valid_identifier(table) => Err(QueryBuildError::new(
                stage,
                format!("Invalid table name '{table}'"),
            )),
            Some(table) => Ok(table),
            None => Ok(schema.table()),
        }
    }

    /// Compiles a SELECT statement.
    ///
    /// Renders the base clause, then `WHERE <tree>`, `ORDER BY`, and
    /// `LIMIT $k OFFSET $k+1` with both bounds bound as parameters.
    pub fn compile_select<'s>(
        &self,
        schema: &'s ModelSchema,
        options: &QueryOptions,
        filter: Option<&FilterExpression>,
        pagination: Option<&Pagination>,
    ) -> Result<CompiledQuery<'s>, QueryBuildError> {
        let mut params = Vec::new();
        let mut sql = self.select_base(schema, options, filter, &mut params)?;

        if let Some(pagination) = pagination {
            self.render_pagination(schema, pagination, &mut sql, &mut params)?;
        }

        Ok(self.finish(schema, sql, params))
    }

    /// Compiles `SELECT COUNT(*) AS counter` over the filtered select.
    pub fn compile_count<'s>(
        &self,
        schema: &'s ModelSchema,
        options: &QueryOptions,
        filter: Option<&FilterExpression>,
    ) -> Result<CompiledQuery<'s>, QueryBuildError> {
        let mut params = Vec::new();
        let inner = self.select_base(schema, options, filter, &mut params)?;
        let sql = format!("SELECT COUNT(*) AS counter FROM ({inner}) AS query_count");
        Ok(self.finish(schema, sql, params))
    }

    fn select_base(
        &self,
        schema: &ModelSchema,
        options: &QueryOptions,
        filter: Option<&FilterExpression>,
        params: &mut Vec<Value>,
    ) -> Result<String, QueryBuildError> {
        let mut sql = match options.custom_select_clause.as_deref() {
            Some(clause) => format!(
                "SELECT * FROM ({}) AS custom_select",
                clause.trim().trim_end_matches(';').trim_end()
            ),
            None => format!(
                "SELECT * FROM {}",
                Self::table(schema, options, BuildStage::Select)?
            ),
        };
        if let Some(filter) = filter {
            sql.push_str(" WHERE ");
            self.render_filter(schema, filter, &mut sql, params)?;
        }
        Ok(sql)
    }

    /// Compiles an INSERT statement returning the inserted row.
    ///
    /// Primary key columns holding NULL are left out so the database can
    /// generate them.
    pub fn compile_insert<'s>(
        &self,
        schema: &'s ModelSchema,
        options: &QueryOptions,
        record: &Record,
    ) -> Result<CompiledQuery<'s>, QueryBuildError> {
        let table = Self::table(schema, options, BuildStage::Insert)?;
        let mut params = Vec::new();
        let mut columns = Vec::new();
        let mut placeholders = Vec::new();
        for (column, value) in schema.to_row_representation(record) {
            let generated = value.is_null()
                && schema
                    .field_by_column(&column)
                    .is_some_and(|f| f.primary_key);
            if generated {
                continue;
            }
            placeholders.push(self.bind(&mut params, value));
            columns.push(column);
        }

        let sql = if columns.is_empty() {
            format!("INSERT INTO {table} DEFAULT VALUES RETURNING *")
        } else {
            format!(
                "INSERT INTO {table} ({}) VALUES ({}) RETURNING *",
                columns.join(", "),
                placeholders.join(", ")
            )
        };
        Ok(self.finish(schema, sql, params))
    }

    /// Compiles an UPDATE statement.
    ///
    /// `SET` parameters come first, then the `WHERE` parameters. Without a
    /// filter the statement is refused unless `allow_unfiltered` is set.
    pub fn compile_update<'s>(
        &self,
        schema: &'s ModelSchema,
        options: &QueryOptions,
        patch: &Record,
        filter: Option<&FilterExpression>,
        allow_unfiltered: bool,
    ) -> Result<CompiledQuery<'s>, QueryBuildError> {
        if filter.is_none() && !allow_unfiltered {
            return Err(QueryBuildError::new(
                BuildStage::Update,
                format!(
                    "Refusing to update every row of {} without a filter",
                    schema.name()
                ),
            ));
        }
        let table = Self::table(schema, options, BuildStage::Update)?;
        let assignments = schema.to_row_representation(patch);
        if assignments.is_empty() {
            return Err(QueryBuildError::new(
                BuildStage::Update,
                format!("No fields to update for {}", schema.name()),
            ));
        }

        let mut params = Vec::new();
        let set_parts: Vec<String> = assignments
            .into_iter()
            .map(|(column, value)| format!("{column} = {}", self.bind(&mut params, value)))
            .collect();
        let mut sql = format!("UPDATE {table} SET {}", set_parts.join(", "));
        if let Some(filter) = filter {
            sql.push_str(" WHERE ");
            self.render_filter(schema, filter, &mut sql, &mut params)?;
        }
        Ok(self.finish(schema, sql, params))
    }

    /// Compiles a DELETE statement.
    ///
    /// Without a filter the statement is refused unless `allow_unfiltered`
    /// is set.
    pub fn compile_delete<'s>(
        &self,
        schema: &'s ModelSchema,
        options: &QueryOptions,
        filter: Option<&FilterExpression>,
        allow_unfiltered: bool,
    ) -> Result<CompiledQuery<'s>, QueryBuildError> {
        if filter.is_none() && !allow_unfiltered {
            return Err(QueryBuildError::new(
                BuildStage::Delete,
                format!(
                    "Refusing to delete every row of {} without a filter",
                    schema.name()
                ),
            ));
        }
        let table = Self::table(schema, options, BuildStage::Delete)?;
        let mut params = Vec::new();
        let mut sql = format!("DELETE FROM {table}");
        if let Some(filter) = filter {
            sql.push_str(" WHERE ");
            self.render_filter(schema, filter, &mut sql, &mut params)?;
        }
        Ok(self.finish(schema, sql, params))
    }

    /// Compiles `CALL name($1, ...)`.
    pub fn compile_procedure_call<'s>(
        &self,
        schema: &'s ModelSchema,
        name: &str,
        args: &[Value],
    ) -> Result<CompiledQuery<'s>, QueryBuildError> {
        let (arg_list, params) = self.routine_args(name, args)?;
        Ok(self.finish(schema, format!("CALL {name}({arg_list})"), params))
    }

    /// Compiles `SELECT name($1, ...) AS result`.
    pub fn compile_function_call<'s>(
        &self,
        schema: &'s ModelSchema,
        name: &str,
        args: &[Value],
    ) -> Result<CompiledQuery<'s>, QueryBuildError> {
        let (arg_list, params) = self.routine_args(name, args)?;
        Ok(self.finish(
            schema,
            format!("SELECT {name}({arg_list}) AS result"),
            params,
        ))
    }

    fn routine_args(
        &self,
        name: &str,
        args: &[Value],
    ) -> Result<(String, Vec<Value>), QueryBuildError> {
        if !is_valid_identifier(name) {
            return Err(QueryBuildError::new(
                BuildStage::Routine,
                format!("Invalid routine name '{name}'"),
            ));
        }
        let mut params = Vec::new();
        let placeholders: Vec<String> = args
            .iter()
            .map(|arg| self.bind(&mut params, arg.clone()))
            .collect();
        Ok((placeholders.join(", "), params))
    }

    fn finish<'s>(
        &self,
        schema: &'s ModelSchema,
        sql: String,
        params: Vec<Value>,
    ) -> CompiledQuery<'s> {
        tracing::trace!(model = %schema.name(), sql = %sql, params = params.len(), "Compiled statement");
        CompiledQuery {
            sql,
            params,
            row_shape: schema,
        }
    }

    /// Renders a filter tree, appending to `sql` and `params`.
    ///
    /// Groups are always parenthesized; a lone leaf is not.
    fn render_filter(
        &self,
        schema: &ModelSchema,
        expr: &FilterExpression,
        sql: &mut String,
        params: &mut Vec<Value>,
    ) -> Result<(), QueryBuildError> {
        match expr {
            FilterExpression::Leaf(condition) => self.render_condition(schema, condition, sql, params),
            FilterExpression::Group { logic, children } => {
                if children.is_empty() {
                    return Err(QueryBuildError::new(
                        BuildStage::Filter,
                        format!("Empty {} group", logic.sql()),
                    ));
                }
                sql.push('(');
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        sql.push(' ');
                        sql.push_str(logic.sql());
                        sql.push(' ');
                    }
                    self.render_filter(schema, child, sql, params)?;
                }
                sql.push(')');
                Ok(())
            }
        }
    }

    fn render_condition(
        &self,
        schema: &ModelSchema,
        condition: &Condition,
        sql: &mut String,
        params: &mut Vec<Value>,
    ) -> Result<(), QueryBuildError> {
        let field = schema.field(&condition.field).ok_or_else(|| {
            QueryBuildError::new(
                BuildStage::Filter,
                format!("Unknown field '{}' for {}", condition.field, schema.name()),
            )
        })?;
        let column = match condition.function {
            Some(func) => format!("{}({})", func.sql(), field.column),
            None => field.column.clone(),
        };
        let op = condition.operator.sql();

        let rendered = match &condition.operand {
            Operand::None => format!("{column} {op}"),
            Operand::Single(value) => {
                format!("{column} {op} {}", self.bind(params, field.encode(value)))
            }
            Operand::Pair(low, high) => {
                let low = self.bind(params, field.encode(low));
                let high = self.bind(params, field.encode(high));
                format!("{column} {op} {low} AND {high}")
            }
            Operand::List(values) => {
                if values.is_empty() {
                    return Err(QueryBuildError::new(
                        BuildStage::Filter,
                        format!("Empty value set for {op} on '{}'", field.name),
                    ));
                }
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| self.bind(params, field.encode(v)))
                    .collect();
                format!("{column} {op} ({})", placeholders.join(", "))
            }
        };
        sql.push_str(&rendered);
        Ok(())
    }

    fn render_pagination(
        &self,
        schema: &ModelSchema,
        pagination: &Pagination,
        sql: &mut String,
        params: &mut Vec<Value>,
    ) -> Result<(), QueryBuildError> {
        if !pagination.order_by.is_empty() {
            let terms = pagination
                .order_by
                .iter()
                .map(|order| {
                    schema
                        .field(&order.field)
                        .map(|f| format!("{} {}", f.column, order.direction.sql()))
                        .ok_or_else(|| {
                            QueryBuildError::new(
                                BuildStage::Pagination,
                                format!("Unknown order-by field '{}' for {}", order.field, schema.name()),
                            )
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }
        if let Some(limit) = pagination.limit {
            let placeholder = self.bind(params, Value::Int(bound("limit", limit)?));
            sql.push_str(" LIMIT ");
            sql.push_str(&placeholder);
        }
        if let Some(offset) = pagination.offset {
            let placeholder = self.bind(params, Value::Int(bound("offset", offset)?));
            sql.push_str(" OFFSET ");
            sql.push_str(&placeholder);
        }
        Ok(())
    }
}

fn bound(what: &str, n: u64) -> Result<i64, QueryBuildError> {
    i64::try_from(n).map_err(|_| {
        QueryBuildError::new(BuildStage::Pagination, format!("{what} {n} is out of range"))
    })
}
