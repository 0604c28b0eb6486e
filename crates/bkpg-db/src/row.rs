//! Driver rows and typed access to values.
//!
//! A [`Row`] is what an [`Executor`](crate::executor::Executor) hands back:
//! column names paired with raw driver values, in result order. It is mapped
//! into a typed [`Record`](crate::schema::Record) by
//! [`ModelSchema::from_row`](crate::schema::ModelSchema::from_row).

use crate::value::Value;
use bkpg_core::BkError;

/// A generic database row for passing data between executors and the schema layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Creates a new row from column names and values.
    ///
    /// # Panics
    ///
    /// Panics if the number of columns does not match the number of values.
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        assert_eq!(
            columns.len(),
            values.len(),
            "Row column count must match value count"
        );
        Self { columns, values }
    }

    /// Creates a row from `(column, value)` pairs.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let (columns, values) = pairs.into_iter().map(|(k, v)| (k.into(), v)).unzip();
        Self { columns, values }
    }

    /// Returns the column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Gets a typed value by column name.
    pub fn get<T: FromValue>(&self, column: &str) -> Result<T, BkError> {
        let value = self.get_value(column).ok_or_else(|| {
            BkError::Serialization(format!("Column '{column}' not found in row"))
        })?;
        T::from_value(value)
    }

    /// Returns a reference to the raw value at the given column name.
    pub fn get_value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    /// Iterates over `(column, value)` pairs in result order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

/// Trait for converting a [`Value`] to a concrete Rust type.
pub trait FromValue: Sized {
    /// Attempts to convert a value reference to this type.
    fn from_value(value: &Value) -> Result<Self, BkError>;
}

fn mismatch(expected: &str, value: &Value) -> BkError {
    BkError::Serialization(format!("Expected {expected}, got {}", value.kind()))
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, BkError> {
        match value {
            Value::Int(i) => Ok(*i),
            _ => Err(mismatch("integer", value)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self, BkError> {
        match value {
            Value::Int(i) => i32::try_from(*i).map_err(|e| {
                BkError::Serialization(format!("Int value out of i32 range: {e}"))
            }),
            _ => Err(mismatch("integer", value)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, BkError> {
        match value {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            _ => Err(mismatch("float", value)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, BkError> {
        match value {
            Value::Bool(b) => Ok(*b),
            _ => Err(mismatch("boolean", value)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, BkError> {
        match value {
            Value::String(s) => Ok(s.clone()),
            _ => Err(mismatch("text", value)),
        }
    }
}

impl FromValue for chrono::NaiveDate {
    fn from_value(value: &Value) -> Result<Self, BkError> {
        match value {
            Value::Date(d) => Ok(*d),
            _ => Err(mismatch("date", value)),
        }
    }
}

impl FromValue for chrono::NaiveDateTime {
    fn from_value(value: &Value) -> Result<Self, BkError> {
        match value {
            Value::DateTime(dt) => Ok(*dt),
            _ => Err(mismatch("datetime", value)),
        }
    }
}

impl FromValue for uuid::Uuid {
    fn from_value(value: &Value) -> Result<Self, BkError> {
        match value {
            Value::Uuid(u) => Ok(*u),
            _ => Err(mismatch("uuid", value)),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self, BkError> {
        match value {
            Value::Json(j) => Ok(j.clone()),
            _ => Err(mismatch("json", value)),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, BkError> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, BkError> {
        match value {
            Value::Null => Ok(None),
            _ => T::from_value(value).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_get_string() {
        let row = Row::new(
            vec!["name".to_string()],
            vec![Value::String("Alice".to_string())],
        );
        assert_eq!(row.get::<String>("name").unwrap(), "Alice");
    }

    #[test]
    fn test_row_get_int_and_i32() {
        let row = Row::new(vec!["id".to_string()], vec![Value::Int(42)]);
        assert_eq!(row.get::<i64>("id").unwrap(), 42);
        assert_eq!(row.get::<i32>("id").unwrap(), 42);
    }

    #[test]
    fn test_row_get_float_from_int() {
        let row = Row::from_pairs([("price", Value::Int(3))]);
        let price: f64 = row.get("price").unwrap();
        assert!((price - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_row_get_optional_null() {
        let row = Row::from_pairs([("email", Value::Null)]);
        assert_eq!(row.get::<Option<String>>("email").unwrap(), None);
    }

    #[test]
    fn test_row_missing_column() {
        let row = Row::from_pairs([("id", Value::Int(1))]);
        assert!(row.get::<i64>("nope").is_err());
        assert!(row.get_value("nope").is_none());
    }

    #[test]
    fn test_row_type_mismatch() {
        let row = Row::from_pairs([("id", Value::from("x"))]);
        let err = row.get::<i64>("id").unwrap_err();
        assert!(err.to_string().contains("Expected integer, got text"));
    }

    #[test]
    fn test_row_iter_order() {
        let row = Row::from_pairs([("b", Value::Int(2)), ("a", Value::Int(1))]);
        let cols: Vec<&str> = row.iter().map(|(c, _)| c).collect();
        assert_eq!(cols, vec!["b", "a"]);
        assert_eq!(row.len(), 2);
        assert!(!row.is_empty());
    }

    #[test]
    #[should_panic(expected = "Row column count must match value count")]
    fn test_row_new_mismatched_lengths() {
        let _ = Row::new(vec!["a".into()], vec![]);
    }
}
