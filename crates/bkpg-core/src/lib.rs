//! # bkpg-core
//!
//! Error types, settings and logging shared by the bkpg crates.
//! This crate has no database dependencies.
//!
//! ## Modules
//!
//! - [`error`] - Validation, query-build and executor errors
//! - [`settings`] - Connection and logging settings
//! - [`settings_loader`] - TOML / JSON / environment loading
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{
    BkError, BkResult, BuildStage, ExecutorError, QueryBuildError, ValidationError,
    ValidationErrors,
};
pub use settings::{DatabaseSettings, Settings};
