//! Core error types for bkpg.
//!
//! The taxonomy has three families:
//!
//! - [`ValidationError`] / [`ValidationErrors`]: a value broke a field's type,
//!   nullability or constraint rule. Row validation collects every failure.
//! - [`QueryBuildError`]: a statement could not be compiled (unknown field,
//!   illegal operator, empty value set, unfiltered mutation, bad identifier).
//! - [`ExecutorError`]: an opaque failure reported by the statement executor.
//!
//! [`BkError`] wraps all of them for APIs that can fail in more than one way.

use std::fmt;

use thiserror::Error;

/// A single field-level validation failure.
///
/// # Examples
///
/// ```
/// use bkpg_core::error::ValidationError;
///
/// let err = ValidationError::new("id", "required");
/// assert_eq!(err.to_string(), "id: required");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The logical field name the failure belongs to.
    pub field: String,
    /// Short human-readable reason (e.g. `"required"`).
    pub reason: String,
}

impl ValidationError {
    /// Creates a new `ValidationError` for `field`.
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates the error reported for a missing non-nullable value.
    pub fn required(field: impl Into<String>) -> Self {
        Self::new(field, "required")
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

impl std::error::Error for ValidationError {}

/// Every validation failure found in one pass over a row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    /// Returns `true` when no failure was recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of recorded failures.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Records a failure.
    pub fn push(&mut self, error: ValidationError) {
        self.0.push(error);
    }

    /// Iterates over the recorded failures in field declaration order.
    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.0.iter()
    }

    /// Returns the failures recorded for `field`.
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a ValidationError> {
        self.0.iter().filter(move |e| e.field == field)
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        Self(vec![error])
    }
}

impl IntoIterator for ValidationErrors {
    type Item = ValidationError;
    type IntoIter = std::vec::IntoIter<ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// The compilation stage a [`QueryBuildError`] was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    /// Resolving filter descriptors into a filter tree.
    Filter,
    /// Resolving ordering, limit and offset.
    Pagination,
    /// Assembling a SELECT statement.
    Select,
    /// Assembling an INSERT statement.
    Insert,
    /// Assembling an UPDATE statement.
    Update,
    /// Assembling a DELETE statement.
    Delete,
    /// Assembling a stored procedure or function call.
    Routine,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Filter => "filter",
            Self::Pagination => "pagination",
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Routine => "routine",
        };
        f.write_str(name)
    }
}

/// A statement could not be compiled. No SQL text exists when this is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage}: {detail}")]
pub struct QueryBuildError {
    /// Where compilation stopped.
    pub stage: BuildStage,
    /// What was wrong with the input.
    pub detail: String,
}

impl QueryBuildError {
    /// Creates a new `QueryBuildError`.
    pub fn new(stage: BuildStage, detail: impl Into<String>) -> Self {
        Self {
            stage,
            detail: detail.into(),
        }
    }
}

/// An opaque failure reported by a statement executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    /// The database rejected or failed the statement.
    #[error("Database error: {0}")]
    Database(String),

    /// The executor could not reach the database (pool, connection, timeout).
    #[error("Operational error: {0}")]
    Operational(String),
}

/// The primary error type for bkpg.
#[derive(Error, Debug)]
pub enum BkError {
    /// One or more values failed validation.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// A statement could not be compiled.
    #[error("Query build error: {0}")]
    QueryBuild(#[from] QueryBuildError),

    /// The executor failed; passed through unchanged.
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    /// A uniqueness-checked lookup matched more than one row.
    #[error("Multiple objects returned when one expected: {0}")]
    MultipleObjectsReturned(String),

    /// A schema, field or registry declaration is invalid.
    #[error("Improperly configured: {0}")]
    ImproperlyConfigured(String),

    /// Settings could not be loaded.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A record could not be converted to or from JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BkError {
    /// Returns the validation failures carried by this error, if any.
    pub const fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }

    /// Returns `true` if this error was raised before any SQL was produced.
    pub const fn is_pre_execution(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::QueryBuild(_) | Self::ImproperlyConfigured(_)
        )
    }
}

impl From<ValidationErrors> for BkError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

impl From<ValidationError> for BkError {
    fn from(error: ValidationError) -> Self {
        Self::Validation(error.into())
    }
}

/// A convenience type alias for `Result<T, BkError>`.
pub type BkResult<T> = Result<T, BkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::required("id");
        assert_eq!(err.to_string(), "id: required");
    }

    #[test]
    fn test_validation_errors_display_joins() {
        let mut errors = ValidationErrors::default();
        errors.push(ValidationError::required("id"));
        errors.push(ValidationError::new("name", "expected text"));
        assert_eq!(errors.to_string(), "id: required; name: expected text");
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_validation_errors_for_field() {
        let errors = ValidationErrors(vec![
            ValidationError::required("id"),
            ValidationError::new("email", "expected text"),
        ]);
        assert_eq!(errors.for_field("email").count(), 1);
        assert_eq!(errors.for_field("missing").count(), 0);
    }

    #[test]
    fn test_query_build_error_display() {
        let err = QueryBuildError::new(BuildStage::Filter, "unknown field 'x'");
        assert_eq!(err.to_string(), "filter: unknown field 'x'");
    }

    #[test]
    fn test_executor_error_is_transparent() {
        let err: BkError = ExecutorError::Database("relation missing".into()).into();
        assert_eq!(err.to_string(), "Database error: relation missing");
        assert!(!err.is_pre_execution());
    }

    #[test]
    fn test_pre_execution_classification() {
        let err: BkError = QueryBuildError::new(BuildStage::Delete, "unfiltered").into();
        assert!(err.is_pre_execution());
        let err: BkError = ValidationError::required("id").into();
        assert!(err.is_pre_execution());
        assert_eq!(err.validation_errors().map(ValidationErrors::len), Some(1));
    }
}
