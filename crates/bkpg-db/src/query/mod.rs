//! Statement compilation.
//!
//! - [`compiler`] - [`SqlCompiler`] and [`CompiledQuery`]
//! - [`pagination`] - [`Pagination`] and [`OrderBy`]

pub mod compiler;
pub mod pagination;

pub use compiler::{CompiledQuery, JsonMode, QueryOptions, SqlCompiler};
pub use pagination::{Direction, OrderBy, Pagination};
