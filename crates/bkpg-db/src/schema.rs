//! Model schemas and typed records.
//!
//! A [`ModelSchema`] is the named, ordered collection of [`FieldDef`]s bound
//! to a table. It validates candidate rows into typed [`Record`]s, maps
//! records to column/parameter pairs for writes and maps driver rows back
//! into records for reads.
//!
//! Schemas are declared once and never mutated afterwards; share them behind
//! an `Arc` across managers and tasks.
//!
//! # Examples
//!
//! ```
//! use std::collections::HashMap;
//! use bkpg_db::fields::{FieldDef, FieldType};
//! use bkpg_db::schema::ModelSchema;
//! use bkpg_db::value::Value;
//!
//! let schema = ModelSchema::builder("Persona", "personas")
//!     .field(FieldDef::new("id", FieldType::Integer).primary_key())
//!     .field(FieldDef::new("name", FieldType::String))
//!     .field(FieldDef::new("email", FieldType::String).nullable())
//!     .build()
//!     .unwrap();
//!
//! let raw = HashMap::from([
//!     ("id".to_string(), Value::Int(1)),
//!     ("name".to_string(), Value::from("Ana")),
//! ]);
//! let record = schema.validate_row(&raw).unwrap();
//! assert_eq!(record.get_value("email"), Some(&Value::Null));
//! ```

use std::collections::{HashMap, HashSet};

use bkpg_core::{BkError, BkResult, ValidationErrors};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::fields::{FieldDef, FieldType, TypeRegistry};
use crate::ident::is_valid_identifier;
use crate::row::{FromValue, Row};
use crate::value::Value;

/// A typed record: field names paired with typed values, in schema order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    values: Vec<(String, Value)>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a value, replacing any previous value for the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
    }

    /// Returns the value for a field, if present.
    pub fn get_value(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Gets a typed value by field name.
    pub fn get<T: FromValue>(&self, name: &str) -> BkResult<T> {
        let value = self.get_value(name).ok_or_else(|| {
            BkError::Serialization(format!("Field '{name}' not found in record"))
        })?;
        T::from_value(value)
    }

    /// Returns `true` if the record holds a value for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.get_value(name).is_some()
    }

    /// Iterates over `(field, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Returns the number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the record holds no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Converts the record to a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.values
                .iter()
                .map(|(n, v)| (n.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in &self.values {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

/// A named, ordered set of typed fields bound to a table.
#[derive(Debug, Clone)]
pub struct ModelSchema {
    name: String,
    table: String,
    fields: Vec<FieldDef>,
}

impl ModelSchema {
    /// Starts declaring a schema for `name` bound to `table`.
    pub fn builder(name: impl Into<String>, table: impl Into<String>) -> ModelSchemaBuilder {
        ModelSchemaBuilder {
            name: name.into(),
            table: table.into(),
            fields: Vec::new(),
        }
    }

    /// The model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The bound table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The declared fields, in declaration order.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Looks up a field by logical name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Looks up a field by database column name.
    pub fn field_by_column(&self, column: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.column == column)
    }

    /// Returns the primary key field, if one is declared.
    pub fn primary_key(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.primary_key)
    }

    /// Validates a candidate row for insertion.
    ///
    /// Every declared field is looked up by logical name, then by column
    /// name; a missing value is treated as NULL. All failures are collected
    /// rather than stopping at the first one. Keys that are not declared
    /// fields are ignored.
    pub fn validate_row(&self, raw: &HashMap<String, Value>) -> Result<Record, ValidationErrors> {
        let mut record = Record::new();
        let mut errors = ValidationErrors::default();
        for field in &self.fields {
            match field.clean(lookup(raw, field)) {
                Ok(value) => record.insert(field.name.clone(), value),
                Err(e) => errors.push(e),
            }
        }
        self.finish(record, errors)
    }

    /// Validates a partial row for an update.
    ///
    /// Only supplied fields are validated; defaults are not substituted and
    /// required fields may be absent.
    pub fn validate_patch(&self, raw: &HashMap<String, Value>) -> Result<Record, ValidationErrors> {
        let mut record = Record::new();
        let mut errors = ValidationErrors::default();
        for field in &self.fields {
            if let Some(value) = lookup(raw, field) {
                match field.clean_patch(value) {
                    Ok(typed) => record.insert(field.name.clone(), typed),
                    Err(e) => errors.push(e),
                }
            }
        }
        self.finish(record, errors)
    }

    fn finish(&self, record: Record, errors: ValidationErrors) -> Result<Record, ValidationErrors> {
        if errors.is_empty() {
            Ok(record)
        } else {
            tracing::debug!(model = %self.name, errors = %errors, "Row rejected by validation");
            Err(errors)
        }
    }

    /// Maps a typed record to `(column, parameter)` pairs in schema order.
    ///
    /// Fields absent from the record are skipped, as are record entries that
    /// are not declared fields.
    pub fn to_row_representation(&self, record: &Record) -> Vec<(String, Value)> {
        self.fields
            .iter()
            .filter_map(|field| {
                record
                    .get_value(&field.name)
                    .map(|value| (field.column.clone(), field.encode(value)))
            })
            .collect()
    }

    /// Maps a driver row back into a typed record.
    ///
    /// Columns are matched to fields by column name, then by logical name.
    /// Columns that match no field (computed columns from a custom select
    /// clause, for instance) are kept under their column name unchanged.
    pub fn from_row(&self, row: &Row) -> BkResult<Record> {
        let mut record = Record::new();
        for (column, value) in row.iter() {
            match self.field_by_column(column).or_else(|| self.field(column)) {
                Some(field) => {
                    let typed = field.field_type.decode(value).map_err(|reason| {
                        BkError::Serialization(format!(
                            "Column '{column}' of {}: {reason}",
                            self.name
                        ))
                    })?;
                    record.insert(field.name.clone(), typed);
                }
                None => record.insert(column, value.clone()),
            }
        }
        Ok(record)
    }

    /// Validates a JSON object as a candidate row.
    pub fn record_from_json(&self, json: &serde_json::Value) -> BkResult<Record> {
        let serde_json::Value::Object(map) = json else {
            return Err(BkError::Serialization(format!(
                "Expected a JSON object for {}, got {json}",
                self.name
            )));
        };
        let raw: HashMap<String, Value> = map
            .iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v.clone())))
            .collect();
        Ok(self.validate_row(&raw)?)
    }

    /// Declares a schema from a JSON model definition, resolving type tags
    /// against the process-wide registry.
    ///
    /// ```
    /// use bkpg_db::schema::ModelSchema;
    ///
    /// let schema = ModelSchema::from_definition(&serde_json::json!({
    ///     "model_name": "ProductoModel",
    ///     "table": "public.producto",
    ///     "id_field": "id",
    ///     "fields": {
    ///         "id": {"type": "integer", "nullable": false},
    ///         "nombre": {"type": "string"},
    ///         "precio": {"type": "float", "nullable": false, "min_value": 0}
    ///     }
    /// }))
    /// .unwrap();
    /// assert_eq!(schema.table(), "public.producto");
    /// assert!(schema.field("id").unwrap().primary_key);
    /// ```
    pub fn from_definition(definition: &serde_json::Value) -> BkResult<Self> {
        Self::from_definition_with(definition, TypeRegistry::global())
    }

    /// Declares a schema from a JSON model definition using `registry` for
    /// custom type tags.
    ///
    /// Fields in a definition are nullable unless `"nullable": false` is given.
    pub fn from_definition_with(
        definition: &serde_json::Value,
        registry: &TypeRegistry,
    ) -> BkResult<Self> {
        let def = ModelDefinition::deserialize(definition)
            .map_err(|e| BkError::ImproperlyConfigured(format!("Invalid model definition: {e}")))?;
        let mut builder = Self::builder(def.model_name, def.table);
        for (name, entry) in def.fields {
            let entry = FieldDefinition::deserialize(&entry).map_err(|e| {
                BkError::ImproperlyConfigured(format!("Invalid definition for field '{name}': {e}"))
            })?;
            let primary_key = entry.primary_key || def.id_field.as_deref() == Some(name.as_str());
            builder = builder.field(entry.into_field(name, primary_key, registry)?);
        }
        builder.build()
    }
}

fn lookup<'a>(raw: &'a HashMap<String, Value>, field: &FieldDef) -> Option<&'a Value> {
    raw.get(&field.name).or_else(|| raw.get(&field.column))
}

/// Builder for [`ModelSchema`].
#[derive(Debug)]
pub struct ModelSchemaBuilder {
    name: String,
    table: String,
    fields: Vec<FieldDef>,
}

impl ModelSchemaBuilder {
    /// Appends a field.
    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Checks the declaration and produces the schema.
    ///
    /// Fails with `ImproperlyConfigured` on an invalid table or column
    /// identifier, a duplicate field or column name, an empty field list or
    /// a default value its own field rejects.
    pub fn build(self) -> BkResult<ModelSchema> {
        let fail = |msg: String| Err(BkError::ImproperlyConfigured(msg));
        if !is_valid_identifier(&self.table) {
            return fail(format!("Invalid table name '{}'", self.table));
        }
        if self.fields.is_empty() {
            return fail(format!("Model {} declares no fields", self.name));
        }
        let mut names = HashSet::new();
        let mut columns = HashSet::new();
        for field in &self.fields {
            if !names.insert(field.name.as_str()) {
                return fail(format!("Duplicate field '{}' in {}", field.name, self.name));
            }
            if !columns.insert(field.column.as_str()) {
                return fail(format!("Duplicate column '{}' in {}", field.column, self.name));
            }
            if !is_valid_identifier(&field.column) || field.column.contains('.') {
                return fail(format!("Invalid column name '{}'", field.column));
            }
            match &field.default {
                Some(Value::Null) if !field.null => {
                    return fail(format!(
                        "Field '{}' of {} is not nullable but defaults to NULL",
                        field.name, self.name
                    ));
                }
                Some(default) if !default.is_null() => {
                    if let Err(e) = field.validate_value(default) {
                        return fail(format!("Invalid default for {}: {e}", self.name));
                    }
                }
                _ => {}
            }
        }
        Ok(ModelSchema {
            name: self.name,
            table: self.table,
            fields: self.fields,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ModelDefinition {
    #[serde(alias = "name")]
    model_name: String,
    table: String,
    #[serde(default)]
    id_field: Option<String>,
    fields: serde_json::Map<String, serde_json::Value>,
}

const fn default_nullable() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct FieldDefinition {
    #[serde(rename = "type")]
    type_tag: String,
    #[serde(default = "default_nullable")]
    nullable: bool,
    #[serde(default)]
    default: Option<Value>,
    #[serde(default)]
    doc: String,
    #[serde(default, alias = "dbname")]
    db_name: Option<String>,
    #[serde(default)]
    primary_key: bool,
    min_length: Option<usize>,
    max_length: Option<usize>,
    min_value: Option<f64>,
    max_value: Option<f64>,
    element: Option<String>,
    allow_empty: Option<bool>,
}

impl FieldDefinition {
    fn into_field(
        self,
        name: String,
        primary_key: bool,
        registry: &TypeRegistry,
    ) -> BkResult<FieldDef> {
        let mut field_type = match (self.type_tag.trim(), &self.element) {
            ("array", Some(element)) => FieldType::array_of(registry.resolve(element)?),
            (tag, _) => registry.resolve(tag)?,
        };
        if let (FieldType::Array { allow_empty, .. }, Some(flag)) =
            (&mut field_type, self.allow_empty)
        {
            *allow_empty = flag;
        }

        let mut field = FieldDef::new(name, field_type).doc(self.doc);
        if let Some(column) = self.db_name {
            field = field.column(column);
        }
        if primary_key {
            field = field.primary_key();
        }
        if self.nullable {
            field = field.nullable();
        }
        if let Some(default) = self.default {
            field = field.default(default);
        }
        if let Some(n) = self.min_length {
            field = field.min_length(n);
        }
        if let Some(n) = self.max_length {
            field = field.max_length(n);
        }
        if let Some(n) = self.min_value {
            field = field.min_value(n);
        }
        if let Some(n) = self.max_value {
            field = field.max_value(n);
        }
        Ok(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::CustomType;
    use bkpg_core::ValidationError;

    fn persona() -> ModelSchema {
        ModelSchema::builder("Persona", "personas")
            .field(FieldDef::new("id", FieldType::Integer).primary_key())
            .field(FieldDef::new("name", FieldType::String).max_length(20))
            .field(FieldDef::new("email", FieldType::String).nullable())
            .build()
            .unwrap()
    }

    fn raw(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    // ── validate_row tests ───────────────────────────────────────────

    #[test]
    fn test_validate_row_nullable_resolves_to_null() {
        let record = persona()
            .validate_row(&raw(&[
                ("id", Value::Int(1)),
                ("name", Value::from("Ana")),
                ("email", Value::Null),
            ]))
            .unwrap();
        assert_eq!(record.get::<i64>("id").unwrap(), 1);
        assert_eq!(record.get_value("email"), Some(&Value::Null));
        assert_eq!(record.len(), 3);
    }

    #[test]
    fn test_validate_row_missing_required() {
        let errors = persona()
            .validate_row(&raw(&[("name", Value::from("Ana"))]))
            .unwrap_err();
        assert_eq!(errors.0, vec![ValidationError::required("id")]);
    }

    #[test]
    fn test_validate_row_collects_all_errors() {
        let errors = persona()
            .validate_row(&raw(&[
                ("id", Value::from("abc")),
                ("name", Value::from("a name that is far too long")),
            ]))
            .unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.for_field("id").count(), 1);
        assert_eq!(errors.for_field("name").count(), 1);
    }

    #[test]
    fn test_validate_row_ignores_unknown_keys() {
        let record = persona()
            .validate_row(&raw(&[
                ("id", Value::Int(1)),
                ("name", Value::from("Ana")),
                ("nickname", Value::from("A")),
            ]))
            .unwrap();
        assert!(!record.contains("nickname"));
    }

    #[test]
    fn test_validate_row_falls_back_to_column_name() {
        let schema = ModelSchema::builder("Producto", "producto")
            .field(FieldDef::new("name", FieldType::String).column("nombre"))
            .build()
            .unwrap();
        let record = schema
            .validate_row(&raw(&[("nombre", Value::from("Mesa"))]))
            .unwrap();
        assert_eq!(record.get::<String>("name").unwrap(), "Mesa");
    }

    #[test]
    fn test_validate_patch_only_supplied_fields() {
        let record = persona()
            .validate_patch(&raw(&[("email", Value::from("a@b.c"))]))
            .unwrap();
        assert_eq!(record.len(), 1);
        let errors = persona()
            .validate_patch(&raw(&[("name", Value::Null)]))
            .unwrap_err();
        assert_eq!(errors.0[0].field, "name");
    }

    // ── row mapping tests ────────────────────────────────────────────

    #[test]
    fn test_to_row_representation_uses_columns() {
        let schema = ModelSchema::builder("Producto", "producto")
            .field(FieldDef::new("id", FieldType::Integer))
            .field(FieldDef::new("name", FieldType::String).column("nombre"))
            .build()
            .unwrap();
        let record: Record = [("name", Value::from("Mesa")), ("id", Value::Int(3))]
            .into_iter()
            .collect();
        assert_eq!(
            schema.to_row_representation(&record),
            vec![
                ("id".to_string(), Value::Int(3)),
                ("nombre".to_string(), Value::from("Mesa")),
            ]
        );
    }

    #[test]
    fn test_from_row_maps_columns_and_keeps_extras() {
        let schema = ModelSchema::builder("Producto", "producto")
            .field(FieldDef::new("name", FieldType::String).column("nombre"))
            .field(FieldDef::new("meta", FieldType::Json).nullable())
            .build()
            .unwrap();
        let row = Row::from_pairs([
            ("nombre", Value::from("Mesa")),
            ("meta", Value::from(r#"{"color": "red"}"#)),
            ("counter", Value::Int(7)),
        ]);
        let record = schema.from_row(&row).unwrap();
        assert_eq!(record.get::<String>("name").unwrap(), "Mesa");
        assert_eq!(
            record.get_value("meta"),
            Some(&Value::Json(serde_json::json!({"color": "red"})))
        );
        assert_eq!(record.get::<i64>("counter").unwrap(), 7);
    }

    #[test]
    fn test_from_row_type_mismatch() {
        let row = Row::from_pairs([("id", Value::from("x"))]);
        assert!(matches!(
            persona().from_row(&row),
            Err(BkError::Serialization(_))
        ));
    }

    #[test]
    fn test_record_json() {
        let schema = persona();
        let record = schema
            .record_from_json(&serde_json::json!({"id": 2, "name": "Luis"}))
            .unwrap();
        assert_eq!(
            record.to_json(),
            serde_json::json!({"id": 2, "name": "Luis", "email": null})
        );
        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"id":2,"name":"Luis","email":null}"#
        );
        assert!(schema.record_from_json(&serde_json::json!([1])).is_err());
        assert!(matches!(
            schema.record_from_json(&serde_json::json!({"name": "Luis"})),
            Err(BkError::Validation(_))
        ));
    }

    // ── declaration tests ────────────────────────────────────────────

    #[test]
    fn test_build_rejects_duplicates() {
        let result = ModelSchema::builder("M", "m")
            .field(FieldDef::new("a", FieldType::Integer))
            .field(FieldDef::new("a", FieldType::String))
            .build();
        assert!(matches!(result, Err(BkError::ImproperlyConfigured(_))));

        let result = ModelSchema::builder("M", "m")
            .field(FieldDef::new("a", FieldType::Integer))
            .field(FieldDef::new("b", FieldType::String).column("a"))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_build_rejects_bad_identifiers() {
        let bad_table = ModelSchema::builder("M", "m; DROP TABLE m")
            .field(FieldDef::new("a", FieldType::Integer))
            .build();
        assert!(bad_table.is_err());
        let bad_column = ModelSchema::builder("M", "m")
            .field(FieldDef::new("a", FieldType::Integer).column("a b"))
            .build();
        assert!(bad_column.is_err());
    }

    #[test]
    fn test_build_rejects_invalid_default() {
        let result = ModelSchema::builder("M", "m")
            .field(FieldDef::new("n", FieldType::Integer).default("many"))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_from_definition() {
        let schema = ModelSchema::from_definition(&serde_json::json!({
            "model_name": "ProductoModel",
            "table": "public.producto",
            "id_field": "id",
            "fields": {
                "id": {"type": "integer", "nullable": false},
                "nombre": {"type": "string", "max_length": 10, "db_name": "nombre_producto"},
                "precio": {"type": "float", "nullable": false, "min_value": 0},
                "tags": {"type": "array", "element": "string", "allow_empty": false}
            }
        }))
        .unwrap();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "nombre", "precio", "tags"]);
        assert_eq!(schema.primary_key().unwrap().name, "id");
        assert_eq!(schema.field("nombre").unwrap().column, "nombre_producto");
        assert!(schema.field("nombre").unwrap().null);
        assert!(matches!(
            schema.field("tags").unwrap().field_type,
            FieldType::Array {
                allow_empty: false,
                ..
            }
        ));

        let errors = schema
            .validate_row(&raw(&[("id", Value::Int(1)), ("precio", Value::Float(-1.0))]))
            .unwrap_err();
        assert_eq!(errors.0[0].reason, "must be >= 0");
    }

    #[test]
    fn test_from_definition_custom_type() {
        let registry = TypeRegistry::new();
        registry
            .register(CustomType::new("cp", |v| match v {
                Value::String(s) if s.len() == 5 => Ok(v.clone()),
                _ => Err("expected a 5-digit postal code".to_string()),
            }))
            .unwrap();
        let definition = serde_json::json!({
            "model_name": "Direccion",
            "table": "direccion",
            "fields": {"cp": {"type": "cp", "nullable": false}}
        });
        let schema = ModelSchema::from_definition_with(&definition, &registry).unwrap();
        assert!(schema
            .validate_row(&raw(&[("cp", Value::from("28001"))]))
            .is_ok());
        assert!(ModelSchema::from_definition(&serde_json::json!({
            "model_name": "X",
            "table": "x",
            "fields": {"a": {"type": "no_such_type"}}
        }))
        .is_err());
    }
}
