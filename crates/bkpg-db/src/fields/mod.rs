//! Field definitions and types.
//!
//! This module provides the [`FieldDef`] struct and [`FieldType`] enum that
//! describe model fields and their column mappings, plus the [`TypeRegistry`]
//! holding caller-defined [`CustomType`]s.

pub mod registry;
pub mod types;

pub use registry::{register_custom_type, resolve_type, TypeRegistry};
pub use types::{CustomType, EncodeFn, FieldDef, FieldType, ValidateFn};
