//! Filter descriptors and validated filter expressions.
//!
//! Callers describe filters as an ordered list of [`FilterDescriptor`]s, the
//! wire format accepted from HTTP handlers, CLIs and tests:
//!
//! ```json
//! [
//!   {"field": "name", "op": "ILIKE", "value": "%an%"},
//!   {"logic": "OR", "children": [
//!     {"field": "id", "op": "=", "value": 1},
//!     {"field": "id", "op": "=", "value": 2}
//!   ]}
//! ]
//! ```
//!
//! [`FilterExpression::build`] resolves every field against a
//! [`ModelSchema`], checks that the operator is legal for the field's type
//! and validates the operand. `=` or `!=` with a list operand on a
//! non-array field is read as `IN` / `NOT IN`. Nothing here produces SQL; the compiler only
//! ever sees expressions that passed these checks.

use std::fmt;
use std::str::FromStr;

use bkpg_core::{BkError, BkResult, BuildStage, QueryBuildError, ValidationError};
use serde::{Deserialize, Serialize};

use crate::fields::{FieldDef, FieldType};
use crate::schema::ModelSchema;
use crate::value::Value;

fn default_op() -> String {
    "=".to_string()
}

/// One caller-supplied filter description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterDescriptor {
    /// A boolean group of nested descriptors.
    Group {
        /// `AND` or `OR` (case-insensitive).
        logic: String,
        /// The grouped descriptors, in order.
        children: Vec<FilterDescriptor>,
    },
    /// A single comparison.
    Leaf {
        /// Logical field name.
        field: String,
        /// Operator, as SQL (`=`, `ILIKE`, `NOT IN`, ...) or as a wire alias
        /// (`equal`, `gt`, `like`, ...). Defaults to equality.
        #[serde(default = "default_op")]
        op: String,
        /// Operand; a list for `IN`, `NOT IN` and `BETWEEN`.
        #[serde(default)]
        value: Value,
        /// Optional column function (`UPPER`, `LOWER`, `TRIM`).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        function: Option<String>,
    },
}

impl FilterDescriptor {
    /// Creates a comparison descriptor.
    pub fn leaf(field: impl Into<String>, op: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Leaf {
            field: field.into(),
            op: op.into(),
            value: value.into(),
            function: None,
        }
    }

    /// Creates an `IS NULL` descriptor.
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::leaf(field, "IS NULL", Value::Null)
    }

    /// Creates an `IS NOT NULL` descriptor.
    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::leaf(field, "IS NOT NULL", Value::Null)
    }

    /// Creates an `AND` group.
    pub fn and(children: Vec<Self>) -> Self {
        Self::Group {
            logic: "AND".to_string(),
            children,
        }
    }

    /// Creates an `OR` group.
    pub fn or(children: Vec<Self>) -> Self {
        Self::Group {
            logic: "OR".to_string(),
            children,
        }
    }

    /// Applies a column function to a comparison descriptor.
    #[must_use]
    pub fn with_function(self, name: impl Into<String>) -> Self {
        match self {
            Self::Leaf {
                field, op, value, ..
            } => Self::Leaf {
                field,
                op,
                value,
                function: Some(name.into()),
            },
            group @ Self::Group { .. } => group,
        }
    }
}

/// Logical connective of a filter group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logic {
    /// Every child must hold.
    And,
    /// At least one child must hold.
    Or,
}

impl Logic {
    /// SQL keyword for this connective.
    pub const fn sql(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

impl FromStr for Logic {
    type Err = QueryBuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AND" => Ok(Self::And),
            "OR" => Ok(Self::Or),
            _ => Err(QueryBuildError::new(
                BuildStage::Filter,
                format!("Unknown logical operator '{s}'"),
            )),
        }
    }
}

/// Comparison operator of a filter leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `LIKE`
    Like,
    /// `ILIKE`
    ILike,
    /// `NOT ILIKE`
    NotILike,
    /// `IN`
    In,
    /// `NOT IN`
    NotIn,
    /// `BETWEEN`
    Between,
    /// `IS NULL`
    IsNull,
    /// `IS NOT NULL`
    IsNotNull,
}

impl Operator {
    /// All operators, in table order.
    pub const ALL: [Self; 14] = [
        Self::Eq,
        Self::Ne,
        Self::Gt,
        Self::Gte,
        Self::Lt,
        Self::Lte,
        Self::Like,
        Self::ILike,
        Self::NotILike,
        Self::In,
        Self::NotIn,
        Self::Between,
        Self::IsNull,
        Self::IsNotNull,
    ];

    /// Parses an operator.
    ///
    /// Lowercase wire aliases are matched first (`like` is the
    /// case-insensitive `ILIKE`), then SQL spellings in any case.
    pub fn parse(op: &str) -> Option<Self> {
        let op = op.trim();
        let alias = match op {
            "equal" | "eq" => Some(Self::Eq),
            "not_equal" | "ne" => Some(Self::Ne),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "like" | "ilike" => Some(Self::ILike),
            "not_ilike" => Some(Self::NotILike),
            "in" => Some(Self::In),
            "not_in" => Some(Self::NotIn),
            "between" => Some(Self::Between),
            "is_null" => Some(Self::IsNull),
            "is_not_null" => Some(Self::IsNotNull),
            _ => None,
        };
        if alias.is_some() {
            return alias;
        }
        let normalized = op.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_uppercase().as_str() {
            "=" | "==" => Some(Self::Eq),
            "!=" | "<>" => Some(Self::Ne),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Gte),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Lte),
            "LIKE" => Some(Self::Like),
            "ILIKE" => Some(Self::ILike),
            "NOT ILIKE" => Some(Self::NotILike),
            "IN" => Some(Self::In),
            "NOT IN" => Some(Self::NotIn),
            "BETWEEN" => Some(Self::Between),
            "IS NULL" => Some(Self::IsNull),
            "IS NOT NULL" => Some(Self::IsNotNull),
            _ => None,
        }
    }

    /// SQL spelling of the operator.
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Like => "LIKE",
            Self::ILike => "ILIKE",
            Self::NotILike => "NOT ILIKE",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Between => "BETWEEN",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }

    /// Whether the operator may be applied to a field of type `ty`.
    ///
    /// Equality, membership and null tests are legal everywhere, pattern
    /// operators only on strings and range operators only on ordered types.
    pub const fn is_legal_for(self, ty: &FieldType) -> bool {
        match self {
            Self::Eq | Self::Ne | Self::In | Self::NotIn | Self::IsNull | Self::IsNotNull => true,
            Self::Like | Self::ILike | Self::NotILike => ty.is_text(),
            Self::Gt | Self::Gte | Self::Lt | Self::Lte | Self::Between => ty.is_ordered(),
        }
    }

    const fn is_pattern(self) -> bool {
        matches!(self, Self::Like | Self::ILike | Self::NotILike)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql())
    }
}

/// A function applied to the column before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnFunction {
    /// `UPPER(col)`
    Upper,
    /// `LOWER(col)`
    Lower,
    /// `TRIM(col)`
    Trim,
}

impl ColumnFunction {
    /// Parses a function name, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "UPPER" => Some(Self::Upper),
            "LOWER" => Some(Self::Lower),
            "TRIM" => Some(Self::Trim),
            _ => None,
        }
    }

    /// SQL name of the function.
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Upper => "UPPER",
            Self::Lower => "LOWER",
            Self::Trim => "TRIM",
        }
    }
}

/// The validated operand of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand (`IS NULL`, `IS NOT NULL`).
    None,
    /// One typed value.
    Single(Value),
    /// Lower and upper bound (`BETWEEN`).
    Pair(Value, Value),
    /// A non-empty set of typed values (`IN`, `NOT IN`).
    List(Vec<Value>),
}

impl Operand {
    /// Number of parameters the operand binds.
    pub fn param_count(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Single(_) => 1,
            Self::Pair(..) => 2,
            Self::List(values) => values.len(),
        }
    }
}

/// A validated comparison against one field.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Logical field name.
    pub field: String,
    /// Database column the field is stored in.
    pub column: String,
    /// The comparison operator.
    pub operator: Operator,
    /// Optional column function.
    pub function: Option<ColumnFunction>,
    /// Typed operand.
    pub operand: Operand,
}

/// A node of a validated filter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpression {
    /// A single comparison.
    Leaf(Condition),
    /// A non-empty boolean group.
    Group {
        /// The connective joining the children.
        logic: Logic,
        /// The children, in order.
        children: Vec<FilterExpression>,
    },
}

impl FilterExpression {
    /// Builds a validated expression tree from descriptors.
    ///
    /// Returns `Ok(None)` for an empty list. Several top-level descriptors
    /// are combined into one `AND` group. Unknown fields, illegal operators,
    /// malformed operands and empty groups are reported as
    /// [`QueryBuildError`]s; operand values rejected by the field type are
    /// reported as [`ValidationError`]s.
    pub fn build(schema: &ModelSchema, descriptors: &[FilterDescriptor]) -> BkResult<Option<Self>> {
        match descriptors {
            [] => Ok(None),
            [single] => build_node(schema, single).map(Some),
            many => Ok(Some(Self::Group {
                logic: Logic::And,
                children: many
                    .iter()
                    .map(|d| build_node(schema, d))
                    .collect::<BkResult<_>>()?,
            })),
        }
    }

    /// Total number of parameters the tree binds.
    pub fn param_count(&self) -> usize {
        match self {
            Self::Leaf(condition) => condition.operand.param_count(),
            Self::Group { children, .. } => children.iter().map(Self::param_count).sum(),
        }
    }

    /// Iterates over the leaves in left-to-right order.
    pub fn conditions(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        collect_conditions(self, &mut out);
        out
    }
}

fn collect_conditions<'a>(expr: &'a FilterExpression, out: &mut Vec<&'a Condition>) {
    match expr {
        FilterExpression::Leaf(condition) => out.push(condition),
        FilterExpression::Group { children, .. } => {
            for child in children {
                collect_conditions(child, out);
            }
        }
    }
}

fn filter_error(detail: impl Into<String>) -> BkError {
    QueryBuildError::new(BuildStage::Filter, detail).into()
}

fn build_node(schema: &ModelSchema, descriptor: &FilterDescriptor) -> BkResult<FilterExpression> {
    match descriptor {
        FilterDescriptor::Group { logic, children } => {
            let logic: Logic = logic.parse()?;
            if children.is_empty() {
                return Err(filter_error(format!("Empty {} group", logic.sql())));
            }
            Ok(FilterExpression::Group {
                logic,
                children: children
                    .iter()
                    .map(|c| build_node(schema, c))
                    .collect::<BkResult<_>>()?,
            })
        }
        FilterDescriptor::Leaf {
            field,
            op,
            value,
            function,
        } => build_leaf(schema, field, op, value, function.as_deref()).map(FilterExpression::Leaf),
    }
}

fn build_leaf(
    schema: &ModelSchema,
    field_name: &str,
    op: &str,
    value: &Value,
    function: Option<&str>,
) -> BkResult<Condition> {
    let field = schema.field(field_name).ok_or_else(|| {
        filter_error(format!("Unknown field '{field_name}' for {}", schema.name()))
    })?;
    let operator =
        Operator::parse(op).ok_or_else(|| filter_error(format!("Unknown operator '{op}'")))?;
    // Equality against a list on a scalar field is set membership
    let operator = match (operator, value) {
        (Operator::Eq, Value::List(_)) if !matches!(field.field_type, FieldType::Array { .. }) => {
            Operator::In
        }
        (Operator::Ne, Value::List(_)) if !matches!(field.field_type, FieldType::Array { .. }) => {
            Operator::NotIn
        }
        (operator, _) => operator,
    };
    if !operator.is_legal_for(&field.field_type) {
        return Err(filter_error(format!(
            "Operator {operator} is not legal for field '{field_name}' of type {}",
            field.field_type.tag()
        )));
    }
    let function = match function.map(str::trim).filter(|f| !f.is_empty()) {
        None => None,
        Some(name) => {
            let func = ColumnFunction::parse(name)
                .ok_or_else(|| filter_error(format!("Unknown column function '{name}'")))?;
            if !field.field_type.is_text() {
                return Err(filter_error(format!(
                    "Column function {} requires a string field, '{field_name}' is {}",
                    func.sql(),
                    field.field_type.tag()
                )));
            }
            Some(func)
        }
    };

    let operand = build_operand(field, operator, function.is_some(), value)?;
    Ok(Condition {
        field: field.name.clone(),
        column: field.column.clone(),
        operator,
        function,
        operand,
    })
}

fn build_operand(
    field: &FieldDef,
    operator: Operator,
    has_function: bool,
    value: &Value,
) -> BkResult<Operand> {
    let name = field.name.as_str();
    let check = |v: &Value| -> BkResult<Value> {
        if operator.is_pattern() || has_function {
            match v {
                Value::String(_) => Ok(v.clone()),
                other => Err(ValidationError::new(
                    name,
                    format!("expected text, got {}", other.kind()),
                )
                .into()),
            }
        } else {
            field
                .field_type
                .validate(v)
                .map_err(|reason| ValidationError::new(name, reason).into())
        }
    };

    match operator {
        Operator::IsNull | Operator::IsNotNull => {
            if value.is_null() {
                Ok(Operand::None)
            } else {
                Err(filter_error(format!("{operator} on '{name}' takes no value")))
            }
        }
        Operator::In | Operator::NotIn => match value {
            Value::List(items) if items.is_empty() => {
                Err(filter_error(format!("Empty value set for {operator} on '{name}'")))
            }
            Value::List(items) => items
                .iter()
                .map(check)
                .collect::<BkResult<Vec<_>>>()
                .map(Operand::List),
            other => Err(filter_error(format!(
                "{operator} on '{name}' requires a list, got {}",
                other.kind()
            ))),
        },
        Operator::Between => match value {
            Value::List(items) if items.len() == 2 => {
                Ok(Operand::Pair(check(&items[0])?, check(&items[1])?))
            }
            _ => Err(filter_error(format!(
                "BETWEEN on '{name}' requires exactly 2 values"
            ))),
        },
        _ if value.is_null() => Err(filter_error(format!(
            "{operator} on '{name}' cannot compare with NULL; use IS NULL or IS NOT NULL"
        ))),
        _ => check(value).map(Operand::Single),
    }
}
