//! Custom field type registry.
//!
//! Custom types are registered once at process start and resolved by name
//! when models are declared dynamically (see
//! [`ModelSchema::from_definition`](crate::schema::ModelSchema::from_definition)).
//! The registry is append-only: a name can be registered once and is never
//! removed or replaced.
//!
//! # Examples
//!
//! ```
//! use bkpg_db::fields::{CustomType, FieldType, TypeRegistry};
//! use bkpg_db::value::Value;
//!
//! let registry = TypeRegistry::new();
//! registry
//!     .register(CustomType::new("slug", |v| match v {
//!         Value::String(s) if s.chars().all(|c| c.is_ascii_lowercase() || c == '-') => {
//!             Ok(v.clone())
//!         }
//!         _ => Err("expected a lowercase slug".to_string()),
//!     }))
//!     .unwrap();
//!
//! let ty = registry.resolve("array<slug>").unwrap();
//! assert_eq!(ty.tag(), "array<slug>");
//! ```

use std::collections::HashMap;
use std::sync::{OnceLock, PoisonError, RwLock};

use bkpg_core::{BkError, BkResult};

use super::types::{CustomType, FieldType};

/// A set of named custom types plus the built-in type tags.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    custom: RwLock<HashMap<String, CustomType>>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide registry.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<TypeRegistry> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }

    /// Registers a custom type.
    ///
    /// Fails when the name shadows a built-in tag or is already registered.
    pub fn register(&self, custom: CustomType) -> BkResult<()> {
        let name = custom.name().to_string();
        if builtin(&name.to_ascii_lowercase()).is_some() || name.starts_with("array<") {
            return Err(BkError::ImproperlyConfigured(format!(
                "Custom type '{name}' shadows a built-in type"
            )));
        }
        let mut custom_types = self.custom.write().unwrap_or_else(PoisonError::into_inner);
        if custom_types.contains_key(&name) {
            return Err(BkError::ImproperlyConfigured(format!(
                "Custom type '{name}' is already registered"
            )));
        }
        tracing::debug!(type_name = %name, "Registered custom field type");
        custom_types.insert(name, custom);
        Ok(())
    }

    /// Looks up a registered custom type by name.
    pub fn get(&self, name: &str) -> Option<CustomType> {
        self.custom
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Returns `true` if a custom type with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.custom
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Resolves a type tag to a [`FieldType`].
    ///
    /// Accepts built-in tags (and their common aliases), `array<tag>` for
    /// arrays and the names of registered custom types.
    pub fn resolve(&self, tag: &str) -> BkResult<FieldType> {
        let tag = tag.trim();
        if let Some(inner) = tag
            .strip_prefix("array<")
            .and_then(|rest| rest.strip_suffix('>'))
        {
            return Ok(FieldType::array_of(self.resolve(inner)?));
        }
        if let Some(ty) = builtin(&tag.to_ascii_lowercase()) {
            return Ok(ty);
        }
        self.get(tag).map(FieldType::Custom).ok_or_else(|| {
            BkError::ImproperlyConfigured(format!("Unknown field type '{tag}'"))
        })
    }
}

fn builtin(tag: &str) -> Option<FieldType> {
    let ty = match tag {
        "string" | "str" | "text" => FieldType::String,
        "integer" | "int" => FieldType::Integer,
        "float" | "decimal" | "number" => FieldType::Float,
        "boolean" | "bool" => FieldType::Boolean,
        "date" => FieldType::Date,
        "datetime" => FieldType::DateTime,
        "time" => FieldType::Time,
        "uuid" => FieldType::Uuid,
        "binary" | "bytes" => FieldType::Binary,
        "base64" => FieldType::Base64,
        "inet" => FieldType::Inet,
        "json" => FieldType::Json,
        "array" => FieldType::array_of(FieldType::String),
        _ => return None,
    };
    Some(ty)
}

/// Registers a custom type in the process-wide registry.
pub fn register_custom_type(custom: CustomType) -> BkResult<()> {
    TypeRegistry::global().register(custom)
}

/// Resolves a type tag against the built-ins and the process-wide registry.
pub fn resolve_type(tag: &str) -> BkResult<FieldType> {
    TypeRegistry::global().resolve(tag)
}
