//! # bkpg-db-backends
//!
//! Executor implementations for bkpg. The `postgres` feature (on by
//! default) provides [`PostgresExecutor`], which runs compiled statements
//! over `tokio-postgres`, optionally through a `deadpool-postgres` pool.
//!
//! ```ignore
//! let settings = bkpg_core::settings_loader::from_env();
//! let executor = PostgresExecutor::from_settings(&settings.database)?;
//! let manager = Manager::new(schema, executor);
//! ```

// These clippy lints are intentionally allowed for this crate:
// - cast_precision_loss: integer parameters may be bound to float columns
// - cast_possible_truncation: float parameters may be bound to `real` columns
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]

#[cfg(feature = "postgres")]
pub mod postgresql;

#[cfg(feature = "postgres")]
pub use postgresql::{PgParam, PostgresExecutor};
