//! Ordering and pagination options for select statements.

use std::fmt;
use std::str::FromStr;

use bkpg_core::{BuildStage, QueryBuildError};
use serde::{Deserialize, Serialize};

/// Sort direction of an `ORDER BY` term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// Ascending order.
    #[default]
    #[serde(alias = "asc")]
    Asc,
    /// Descending order.
    #[serde(alias = "desc")]
    Desc,
}

impl Direction {
    /// SQL keyword for this direction.
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql())
    }
}

impl FromStr for Direction {
    type Err = QueryBuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ASC" => Ok(Self::Asc),
            "DESC" => Ok(Self::Desc),
            _ => Err(QueryBuildError::new(
                BuildStage::Pagination,
                format!("Unknown sort direction '{s}'"),
            )),
        }
    }
}

/// One `ORDER BY` term: a logical field name and a direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    /// The logical field to order by.
    pub field: String,
    /// Sort direction.
    #[serde(default)]
    pub direction: Direction,
}

impl OrderBy {
    /// Creates an ascending order.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    /// Creates a descending order.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

/// Limit, offset and ordering for a select statement.
///
/// # Examples
///
/// ```
/// use bkpg_db::query::{OrderBy, Pagination};
///
/// let p = Pagination::new().limit(10).offset(20).order_by(OrderBy::desc("id"));
/// assert_eq!(p.limit, Some(10));
///
/// let page = Pagination::page(3, 25).unwrap();
/// assert_eq!((page.limit, page.offset), (Some(25), Some(50)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of rows.
    #[serde(default)]
    pub limit: Option<u64>,
    /// Number of rows to skip.
    #[serde(default)]
    pub offset: Option<u64>,
    /// Ordering terms, applied in order.
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
}

impl Pagination {
    /// Creates empty pagination (no limit, no offset, no ordering).
    pub fn new() -> Self {
        Self::default()
    }

    /// Pagination for a 1-indexed page of `page_size` rows.
    pub fn page(page: u64, page_size: u64) -> Result<Self, QueryBuildError> {
        if page == 0 || page_size == 0 {
            return Err(QueryBuildError::new(
                BuildStage::Pagination,
                format!("Page and page size must be at least 1 (got page {page}, size {page_size})"),
            ));
        }
        let offset = (page - 1).checked_mul(page_size).ok_or_else(|| {
            QueryBuildError::new(BuildStage::Pagination, "Page offset overflows")
        })?;
        Ok(Self {
            limit: Some(page_size),
            offset: Some(offset),
            order_by: Vec::new(),
        })
    }

    /// Sets the limit.
    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the offset.
    #[must_use]
    pub const fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Appends an ordering term.
    #[must_use]
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    /// Returns `true` when no clause would be rendered.
    pub fn is_empty(&self) -> bool {
        self.limit.is_none() && self.offset.is_none() && self.order_by.is_empty()
    }
}
