//! Schema export.
//!
//! [`export_schema`] is a pure read of [`ModelSchema`] metadata producing a
//! serializable description that web or serialization layers can turn into
//! their own request/response validation schemas.

use serde::Serialize;

use crate::fields::FieldDef;
use crate::schema::ModelSchema;

/// Exported description of one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldExport {
    /// Logical field name.
    pub name: String,
    /// Database column name.
    pub db_name: String,
    /// Stable type tag (`"integer"`, `"array<date>"`, custom type name, ...).
    #[serde(rename = "type")]
    pub type_tag: String,
    /// PostgreSQL column type.
    pub sql_type: String,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Whether a value must be supplied on insert.
    pub required: bool,
    /// Whether this field is the primary key.
    pub primary_key: bool,
    /// Default value as JSON, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Documentation string.
    pub doc: String,
    /// Constraint descriptions (`"max_length=50"`, `"min_value=0"`).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
}

impl From<&FieldDef> for FieldExport {
    fn from(field: &FieldDef) -> Self {
        Self {
            name: field.name.clone(),
            db_name: field.column.clone(),
            type_tag: field.field_type.tag(),
            sql_type: field.field_type.pg_column_type(),
            nullable: field.null,
            required: field.is_required(),
            primary_key: field.primary_key,
            default: field.default.as_ref().map(crate::value::Value::to_json),
            doc: field.doc.clone(),
            constraints: field.validators.iter().map(|v| v.describe()).collect(),
        }
    }
}

/// Exported description of a model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaExport {
    /// Model name.
    pub model: String,
    /// Bound table.
    pub table: String,
    /// Fields in declaration order.
    pub fields: Vec<FieldExport>,
}

impl SchemaExport {
    /// Looks up an exported field by name.
    pub fn field(&self, name: &str) -> Option<&FieldExport> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Converts the export to JSON.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Describes `schema` for external consumers.
///
/// # Examples
///
/// ```
/// use bkpg_db::export::export_schema;
/// use bkpg_db::fields::{FieldDef, FieldType};
/// use bkpg_db::schema::ModelSchema;
///
/// let schema = ModelSchema::builder("Persona", "personas")
///     .field(FieldDef::new("id", FieldType::Integer).primary_key())
///     .build()
///     .unwrap();
/// let export = export_schema(&schema);
/// assert_eq!(export.field("id").unwrap().type_tag, "integer");
/// ```
pub fn export_schema(schema: &ModelSchema) -> SchemaExport {
    SchemaExport {
        model: schema.name().to_string(),
        table: schema.table().to_string(),
        fields: schema.fields().iter().map(FieldExport::from).collect(),
    }
}
