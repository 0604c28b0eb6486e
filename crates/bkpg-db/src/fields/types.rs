//! Field type definitions.
//!
//! A [`FieldType`] decides which raw values are legal for a column and how a
//! legal value is encoded as a driver parameter. [`FieldDef`] adds the
//! per-field metadata (column name, nullability, default, documentation,
//! constraint validators) and owns the null/default policy.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use base64::Engine as _;
use bkpg_core::ValidationError;

use crate::validators::{
    MaxLengthValidator, MaxValueValidator, MinLengthValidator, MinValueValidator, Validator,
};
use crate::value::{Value, DATETIME_FORMAT, DATE_FORMAT, TIME_FORMAT};

/// Caller-supplied validation function for a [`CustomType`].
pub type ValidateFn = dyn Fn(&Value) -> Result<Value, String> + Send + Sync;
/// Caller-supplied encoding function for a [`CustomType`].
pub type EncodeFn = dyn Fn(&Value) -> Value + Send + Sync;

/// A caller-defined field type.
///
/// This is the only extension point of the type system: the validator and
/// encoder are plain function values supplied at registration time.
///
/// # Examples
///
/// ```
/// use bkpg_db::fields::CustomType;
/// use bkpg_db::value::Value;
///
/// let percent = CustomType::new("percent", |v| match v {
///     Value::Int(i) if (0..=100).contains(i) => Ok(Value::Int(*i)),
///     _ => Err("expected an integer between 0 and 100".to_string()),
/// })
/// .ordered()
/// .sql_type("SMALLINT");
///
/// assert!(percent.validate(&Value::Int(42)).is_ok());
/// assert!(percent.validate(&Value::Int(420)).is_err());
/// ```
#[derive(Clone)]
pub struct CustomType {
    name: Arc<str>,
    validator: Arc<ValidateFn>,
    encoder: Arc<EncodeFn>,
    ordered: bool,
    sql_type: Arc<str>,
}

impl CustomType {
    /// Creates a custom type whose encoder passes typed values through unchanged.
    pub fn new<F>(name: impl Into<Arc<str>>, validator: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            validator: Arc::new(validator),
            encoder: Arc::new(Value::clone),
            ordered: false,
            sql_type: Arc::from("TEXT"),
        }
    }

    /// Replaces the encoder.
    #[must_use]
    pub fn with_encoder<F>(mut self, encoder: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.encoder = Arc::new(encoder);
        self
    }

    /// Declares the type as ordered, making range operators legal on it.
    #[must_use]
    pub const fn ordered(mut self) -> Self {
        self.ordered = true;
        self
    }

    /// Sets the PostgreSQL column type reported by schema export.
    #[must_use]
    pub fn sql_type(mut self, sql_type: impl Into<Arc<str>>) -> Self {
        self.sql_type = sql_type.into();
        self
    }

    /// The registered name of this type.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether range operators are legal on this type.
    pub const fn is_ordered(&self) -> bool {
        self.ordered
    }

    /// Runs the caller-supplied validator.
    pub fn validate(&self, value: &Value) -> Result<Value, String> {
        (self.validator)(value)
    }

    /// Runs the caller-supplied encoder.
    pub fn encode(&self, value: &Value) -> Value {
        (self.encoder)(value)
    }
}

impl fmt::Debug for CustomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomType")
            .field("name", &self.name)
            .field("ordered", &self.ordered)
            .field("sql_type", &self.sql_type)
            .finish_non_exhaustive()
    }
}

/// The type of a model field, determining which values are legal and how
/// they are bound as parameters.
#[derive(Debug, Clone)]
pub enum FieldType {
    /// Text.
    String,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit floating-point number.
    Float,
    /// Boolean.
    Boolean,
    /// Date without time (`YYYY-MM-DD`).
    Date,
    /// Date and time without timezone (`YYYY-MM-DDTHH:MM:SS[.f]`).
    DateTime,
    /// Time without date (`HH:MM:SS[.f]`).
    Time,
    /// UUID.
    Uuid,
    /// Raw binary data.
    Binary,
    /// Text holding standard base64.
    Base64,
    /// IPv4 or IPv6 address (PostgreSQL `INET`).
    Inet,
    /// Any JSON-serializable value.
    Json,
    /// Homogeneous array of another field type.
    Array {
        /// The element type; every element is validated independently.
        element: Box<FieldType>,
        /// Whether an empty array is legal.
        allow_empty: bool,
    },
    /// Caller-defined type.
    Custom(CustomType),
}

impl FieldType {
    /// Creates an array type that accepts empty arrays.
    pub fn array_of(element: Self) -> Self {
        Self::Array {
            element: Box::new(element),
            allow_empty: true,
        }
    }

    /// Stable tag used by schema export and dynamic definitions.
    pub fn tag(&self) -> String {
        match self {
            Self::String => "string".to_string(),
            Self::Integer => "integer".to_string(),
            Self::Float => "float".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::Date => "date".to_string(),
            Self::DateTime => "datetime".to_string(),
            Self::Time => "time".to_string(),
            Self::Uuid => "uuid".to_string(),
            Self::Binary => "binary".to_string(),
            Self::Base64 => "base64".to_string(),
            Self::Inet => "inet".to_string(),
            Self::Json => "json".to_string(),
            Self::Array { element, .. } => format!("array<{}>", element.tag()),
            Self::Custom(custom) => custom.name().to_string(),
        }
    }

    /// Returns the PostgreSQL column type for this field type.
    pub fn pg_column_type(&self) -> String {
        match self {
            Self::String | Self::Base64 => "TEXT".to_string(),
            Self::Integer => "BIGINT".to_string(),
            Self::Float => "DOUBLE PRECISION".to_string(),
            Self::Boolean => "BOOLEAN".to_string(),
            Self::Date => "DATE".to_string(),
            Self::DateTime => "TIMESTAMP".to_string(),
            Self::Time => "TIME".to_string(),
            Self::Uuid => "UUID".to_string(),
            Self::Binary => "BYTEA".to_string(),
            Self::Inet => "INET".to_string(),
            Self::Json => "JSONB".to_string(),
            Self::Array { element, .. } => format!("{}[]", element.pg_column_type()),
            Self::Custom(custom) => custom.sql_type.to_string(),
        }
    }

    /// Whether values of this type have a total order (range operators legal).
    pub const fn is_ordered(&self) -> bool {
        match self {
            Self::String | Self::Integer | Self::Float | Self::Date | Self::DateTime | Self::Time => {
                true
            }
            Self::Custom(custom) => custom.is_ordered(),
            _ => false,
        }
    }

    /// Whether pattern operators (`LIKE`, `ILIKE`) and column functions are legal.
    pub const fn is_text(&self) -> bool {
        matches!(self, Self::String)
    }

    /// Validates and coerces a non-null raw value.
    ///
    /// Null handling belongs to [`FieldDef`]; a `Value::Null` reaching this
    /// method is rejected.
    pub fn validate(&self, value: &Value) -> Result<Value, String> {
        if value.is_null() {
            return Err("null is not allowed".to_string());
        }
        match self {
            Self::String => match value {
                Value::String(_) => Ok(value.clone()),
                other => Err(expected("text", other)),
            },
            Self::Integer => match value {
                Value::Int(_) => Ok(value.clone()),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| format!("expected integer, got non-numeric text '{s}'")),
                other => Err(expected("integer", other)),
            },
            Self::Float => {
                let f = match value {
                    Value::Float(f) => *f,
                    Value::Int(i) => *i as f64,
                    Value::String(s) => s
                        .trim()
                        .parse::<f64>()
                        .map_err(|_| format!("expected number, got non-numeric text '{s}'"))?,
                    other => return Err(expected("number", other)),
                };
                if f.is_finite() {
                    Ok(Value::Float(f))
                } else {
                    Err("expected a finite number".to_string())
                }
            }
            Self::Boolean => match value {
                Value::Bool(_) => Ok(value.clone()),
                Value::String(s) => match s.to_ascii_lowercase().as_str() {
                    "true" | "1" => Ok(Value::Bool(true)),
                    "false" | "0" => Ok(Value::Bool(false)),
                    _ => Err(format!("expected boolean, got '{s}'")),
                },
                other => Err(expected("boolean", other)),
            },
            Self::Date => match value {
                Value::Date(_) => Ok(value.clone()),
                Value::String(s) => chrono::NaiveDate::parse_from_str(s, DATE_FORMAT)
                    .map(Value::Date)
                    .map_err(|_| format!("expected date in ISO-8601 format YYYY-MM-DD, got '{s}'")),
                other => Err(expected("date", other)),
            },
            Self::DateTime => match value {
                Value::DateTime(_) => Ok(value.clone()),
                Value::String(s) => chrono::NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
                    .map(Value::DateTime)
                    .map_err(|_| {
                        format!(
                            "expected datetime in ISO-8601 format YYYY-MM-DDTHH:MM:SS[.fraction], got '{s}'"
                        )
                    }),
                other => Err(expected("datetime", other)),
            },
            Self::Time => match value {
                Value::Time(_) => Ok(value.clone()),
                Value::String(s) => chrono::NaiveTime::parse_from_str(s, TIME_FORMAT)
                    .map(Value::Time)
                    .map_err(|_| format!("expected time in ISO-8601 format HH:MM:SS[.fraction], got '{s}'")),
                other => Err(expected("time", other)),
            },
            Self::Uuid => match value {
                Value::Uuid(_) => Ok(value.clone()),
                Value::String(s) => uuid::Uuid::parse_str(s.trim())
                    .map(Value::Uuid)
                    .map_err(|_| format!("expected UUID, got '{s}'")),
                other => Err(expected("uuid", other)),
            },
            Self::Binary => match value {
                Value::Bytes(_) => Ok(value.clone()),
                other => Err(expected("bytes", other)),
            },
            Self::Base64 => match value {
                Value::String(s) => base64::engine::general_purpose::STANDARD
                    .decode(s)
                    .map(|_| value.clone())
                    .map_err(|_| "expected valid base64 text".to_string()),
                other => Err(expected("base64 text", other)),
            },
            Self::Inet => match value {
                Value::String(s) => s
                    .trim()
                    .parse::<IpAddr>()
                    .map(|ip| Value::String(ip.to_string()))
                    .map_err(|_| format!("expected IP address, got '{s}'")),
                other => Err(expected("IP address text", other)),
            },
            Self::Json => match value {
                Value::Json(_) => Ok(value.clone()),
                v if v.is_json_native() => Ok(Value::Json(v.to_json())),
                other => Err(format!("{} is not JSON-serializable", other.kind())),
            },
            Self::Array {
                element,
                allow_empty,
            } => match value {
                Value::List(items) => {
                    if items.is_empty() && !allow_empty {
                        return Err("array must not be empty".to_string());
                    }
                    items
                        .iter()
                        .enumerate()
                        .map(|(i, item)| {
                            element
                                .validate(item)
                                .map_err(|reason| format!("element {i}: {reason}"))
                        })
                        .collect::<Result<Vec<_>, _>>()
                        .map(Value::List)
                }
                other => Err(expected("array", other)),
            },
            Self::Custom(custom) => custom.validate(value),
        }
    }

    /// Encodes a typed value as a driver parameter.
    pub fn encode(&self, value: &Value) -> Value {
        match (self, value) {
            (_, Value::Null) => Value::Null,
            (Self::Array { element, .. }, Value::List(items)) => {
                Value::List(items.iter().map(|item| element.encode(item)).collect())
            }
            (Self::Custom(custom), v) => custom.encode(v),
            (_, v) => v.clone(),
        }
    }

    /// Maps a raw driver value read from a row back to a typed value.
    ///
    /// JSON stored as text is parsed back into a document; everything else
    /// goes through the regular validator.
    pub fn decode(&self, value: &Value) -> Result<Value, String> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (Self::Json, Value::String(s)) => Ok(Value::Json(
                serde_json::from_str(s).unwrap_or_else(|_| serde_json::Value::String(s.clone())),
            )),
            (Self::Array { element, .. }, Value::List(items)) => items
                .iter()
                .map(|item| element.decode(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            _ => self.validate(value),
        }
    }
}

fn expected(what: &str, got: &Value) -> String {
    format!("expected {what}, got {}", got.kind())
}

/// Complete definition of a model field.
///
/// # Examples
///
/// ```
/// use bkpg_db::fields::{FieldDef, FieldType};
/// use bkpg_db::value::Value;
///
/// let name = FieldDef::new("name", FieldType::String)
///     .column("nombre")
///     .max_length(50)
///     .doc("Display name");
/// assert!(name.clean(Some(&Value::from("Ana"))).is_ok());
/// assert_eq!(name.clean(None).unwrap_err().reason, "required");
/// ```
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// The logical field name.
    pub name: String,
    /// The database column name (may differ from `name`).
    pub column: String,
    /// The type of this field.
    pub field_type: FieldType,
    /// Whether this field is (part of) the primary key.
    pub primary_key: bool,
    /// Whether NULL is allowed.
    pub null: bool,
    /// Value substituted when none is supplied.
    pub default: Option<Value>,
    /// Human-readable documentation.
    pub doc: String,
    /// Constraint validators run after type coercion.
    pub validators: Vec<Arc<dyn Validator>>,
}

impl FieldDef {
    /// Creates a new non-nullable `FieldDef` with no default.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            field_type,
            primary_key: false,
            null: false,
            default: None,
            doc: String::new(),
            validators: Vec::new(),
        }
    }

    /// Sets the database column name.
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// Marks this field as the primary key.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Allows NULL values.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    /// Sets the default value for this field.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Sets the documentation string.
    #[must_use]
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    /// Adds a constraint validator.
    #[must_use]
    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Requires at least `n` characters.
    #[must_use]
    pub fn min_length(self, n: usize) -> Self {
        self.validator(MinLengthValidator::new(n))
    }

    /// Allows at most `n` characters.
    #[must_use]
    pub fn max_length(self, n: usize) -> Self {
        self.validator(MaxLengthValidator::new(n))
    }

    /// Requires a numeric value `>= min`.
    #[must_use]
    pub fn min_value(self, min: f64) -> Self {
        self.validator(MinValueValidator::new(min))
    }

    /// Requires a numeric value `<= max`.
    #[must_use]
    pub fn max_value(self, max: f64) -> Self {
        self.validator(MaxValueValidator::new(max))
    }

    /// Whether a value must be supplied for this field.
    pub const fn is_required(&self) -> bool {
        !self.null && self.default.is_none()
    }

    /// Applies the null/default policy, then validates.
    ///
    /// `None` and `Some(Value::Null)` are both treated as "no value": the
    /// default is substituted if there is one, NULL is kept for nullable
    /// fields, and anything else is reported as `required`.
    pub fn clean(&self, raw: Option<&Value>) -> Result<Value, ValidationError> {
        match raw {
            Some(value) if !value.is_null() => self.validate_value(value),
            _ => match (&self.default, self.null) {
                (Some(default), _) if !default.is_null() => self.validate_value(default),
                (_, true) => Ok(Value::Null),
                (_, false) => Err(ValidationError::required(&self.name)),
            },
        }
    }

    /// Validates a value supplied for this field in a partial update.
    ///
    /// Defaults do not apply: an explicit NULL is legal only on nullable fields.
    pub fn clean_patch(&self, raw: &Value) -> Result<Value, ValidationError> {
        if raw.is_null() {
            return if self.null {
                Ok(Value::Null)
            } else {
                Err(ValidationError::new(&self.name, "null is not allowed"))
            };
        }
        self.validate_value(raw)
    }

    /// Runs the type validator and every constraint validator on a non-null value.
    pub fn validate_value(&self, raw: &Value) -> Result<Value, ValidationError> {
        let typed = self
            .field_type
            .validate(raw)
            .map_err(|reason| ValidationError::new(&self.name, reason))?;
        for validator in &self.validators {
            validator
                .validate(&typed)
                .map_err(|reason| ValidationError::new(&self.name, reason))?;
        }
        Ok(typed)
    }

    /// Encodes a typed value as a driver parameter.
    pub fn encode(&self, typed: &Value) -> Value {
        self.field_type.encode(typed)
    }
}
