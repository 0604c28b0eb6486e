//! Field constraint validators.
//!
//! Validators run after a value has been coerced by its
//! [`FieldType`](crate::fields::FieldType), so they only ever see typed
//! values. Each one checks a single constraint and returns a short reason
//! when the value does not satisfy it.

use crate::value::Value;
use std::fmt;

/// A trait for validating typed field values.
///
/// Validators are attached to [`FieldDef`](crate::fields::FieldDef) instances and
/// called during row validation.
///
/// # Examples
///
/// ```
/// use bkpg_db::validators::{Validator, MaxLengthValidator};
/// use bkpg_db::value::Value;
///
/// let v = MaxLengthValidator::new(5);
/// assert!(v.validate(&Value::String("hi".into())).is_ok());
/// assert!(v.validate(&Value::String("toolong".into())).is_err());
/// ```
pub trait Validator: Send + Sync + fmt::Debug {
    /// Validates the given value, returning the failure reason if invalid.
    fn validate(&self, value: &Value) -> Result<(), String>;

    /// Returns a human-readable name for this validator.
    fn name(&self) -> &str;

    /// Describes the constraint for schema export (e.g. `"max_length=50"`).
    fn describe(&self) -> String;
}

/// Validates that a string value does not exceed a maximum length in characters.
#[derive(Debug, Clone)]
pub struct MaxLengthValidator {
    /// The maximum allowed length.
    pub max_length: usize,
}

impl MaxLengthValidator {
    /// Creates a new `MaxLengthValidator` with the given maximum length.
    pub const fn new(max_length: usize) -> Self {
        Self { max_length }
    }
}

impl Validator for MaxLengthValidator {
    fn validate(&self, value: &Value) -> Result<(), String> {
        if let Value::String(s) = value {
            let len = s.chars().count();
            if len > self.max_length {
                return Err(format!(
                    "must have at most {} characters (it has {len})",
                    self.max_length
                ));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "MaxLengthValidator"
    }

    fn describe(&self) -> String {
        format!("max_length={}", self.max_length)
    }
}

/// Validates that a string value meets a minimum length in characters.
#[derive(Debug, Clone)]
pub struct MinLengthValidator {
    /// The minimum required length.
    pub min_length: usize,
}

impl MinLengthValidator {
    /// Creates a new `MinLengthValidator` with the given minimum length.
    pub const fn new(min_length: usize) -> Self {
        Self { min_length }
    }
}

impl Validator for MinLengthValidator {
    fn validate(&self, value: &Value) -> Result<(), String> {
        if let Value::String(s) = value {
            let len = s.chars().count();
            if len < self.min_length {
                return Err(format!(
                    "must have at least {} characters (it has {len})",
                    self.min_length
                ));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "MinLengthValidator"
    }

    fn describe(&self) -> String {
        format!("min_length={}", self.min_length)
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

/// Validates that a numeric value does not exceed a maximum.
#[derive(Debug, Clone)]
pub struct MaxValueValidator {
    /// The maximum allowed value.
    pub max_value: f64,
}

impl MaxValueValidator {
    /// Creates a new `MaxValueValidator` with the given maximum.
    pub fn new(max_value: f64) -> Self {
        Self { max_value }
    }
}

impl Validator for MaxValueValidator {
    fn validate(&self, value: &Value) -> Result<(), String> {
        match numeric(value) {
            Some(n) if n > self.max_value => Err(format!("must be <= {}", self.max_value)),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "MaxValueValidator"
    }

    fn describe(&self) -> String {
        format!("max_value={}", self.max_value)
    }
}

/// Validates that a numeric value meets a minimum requirement.
#[derive(Debug, Clone)]
pub struct MinValueValidator {
    /// The minimum required value.
    pub min_value: f64,
}

impl MinValueValidator {
    /// Creates a new `MinValueValidator` with the given minimum.
    pub fn new(min_value: f64) -> Self {
        Self { min_value }
    }
}

impl Validator for MinValueValidator {
    fn validate(&self, value: &Value) -> Result<(), String> {
        match numeric(value) {
            Some(n) if n < self.min_value => Err(format!("must be >= {}", self.min_value)),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "MinValueValidator"
    }

    fn describe(&self) -> String {
        format!("min_value={}", self.min_value)
    }
}
