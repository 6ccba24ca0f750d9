//! Query conditions and options.

use crate::error::{CoreError, CoreResult};
use lexidb_codec::{Key, Value};
use lexidb_storage::{Direction, KeyRange};
use std::fmt;

/// Comparison applied to one indexed field.
///
/// Values are compared with host key ordering, so a condition can only
/// match values that are valid keys.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Equal to the value.
    Eq(Value),
    /// Strictly greater than the value.
    Gt(Value),
    /// Greater than or equal to the value.
    Gte(Value),
    /// Strictly less than the value.
    Lt(Value),
    /// Less than or equal to the value.
    Lte(Value),
    /// Between two bounds; each bound is inclusive unless marked open.
    Range {
        /// Lower bound.
        lower: Value,
        /// Upper bound.
        upper: Value,
        /// Exclude the lower bound itself.
        lower_open: bool,
        /// Exclude the upper bound itself.
        upper_open: bool,
    },
}

impl Condition {
    /// Returns true for `Eq`.
    pub fn is_eq(&self) -> bool {
        matches!(self, Condition::Eq(_))
    }

    /// Operator tag, as used in logs.
    pub fn operator(&self) -> &'static str {
        match self {
            Condition::Eq(_) => "eq",
            Condition::Gt(_) => "gt",
            Condition::Gte(_) => "gte",
            Condition::Lt(_) => "lt",
            Condition::Lte(_) => "lte",
            Condition::Range { .. } => "range",
        }
    }

    /// Builds the key range this condition selects.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParams` if a bound is not a valid key or the range
    /// bounds are inverted.
    pub fn key_range(&self) -> CoreResult<KeyRange> {
        Ok(match self {
            Condition::Eq(v) => KeyRange::only(to_key(v)?),
            Condition::Gt(v) => KeyRange::lower_bound(to_key(v)?, true),
            Condition::Gte(v) => KeyRange::lower_bound(to_key(v)?, false),
            Condition::Lt(v) => KeyRange::upper_bound(to_key(v)?, true),
            Condition::Lte(v) => KeyRange::upper_bound(to_key(v)?, false),
            Condition::Range {
                lower,
                upper,
                lower_open,
                upper_open,
            } => KeyRange::bound(to_key(lower)?, to_key(upper)?, *lower_open, *upper_open)
                .map_err(|err| CoreError::invalid_params(err.to_string()))?,
        })
    }
}

pub(crate) fn to_key(value: &Value) -> CoreResult<Key> {
    Key::from_value(value).ok_or_else(|| {
        CoreError::invalid_params(format!(
            "{} value {value} cannot be used as an index key",
            value.type_name()
        ))
    })
}

/// A condition on a named field.
///
/// `field` is a key path or an index name from the collection's schema.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCondition {
    /// Field the condition applies to.
    pub field: String,
    /// The comparison.
    pub condition: Condition,
}

impl QueryCondition {
    /// Creates a condition.
    pub fn new(field: impl Into<String>, condition: Condition) -> Self {
        Self {
            field: field.into(),
            condition,
        }
    }

    /// `field == value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Condition::Eq(value.into()))
    }

    /// `field > value`.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Condition::Gt(value.into()))
    }

    /// `field >= value`.
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Condition::Gte(value.into()))
    }

    /// `field < value`.
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Condition::Lt(value.into()))
    }

    /// `field <= value`.
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Condition::Lte(value.into()))
    }

    /// `lower <= field <= upper`.
    pub fn between(field: impl Into<String>, lower: impl Into<Value>, upper: impl Into<Value>) -> Self {
        Self::range(field, lower, upper, false, false)
    }

    /// A range with explicit bound openness.
    pub fn range(
        field: impl Into<String>,
        lower: impl Into<Value>,
        upper: impl Into<Value>,
        lower_open: bool,
        upper_open: bool,
    ) -> Self {
        Self::new(
            field,
            Condition::Range {
                lower: lower.into(),
                upper: upper.into(),
                lower_open,
                upper_open,
            },
        )
    }
}

impl fmt::Display for QueryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.condition {
            Condition::Range {
                lower,
                upper,
                lower_open,
                upper_open,
            } => write!(
                f,
                "{} in {}{lower}, {upper}{}",
                self.field,
                if *lower_open { '(' } else { '[' },
                if *upper_open { ')' } else { ']' },
            ),
            Condition::Eq(v) | Condition::Gt(v) | Condition::Gte(v) | Condition::Lt(v) | Condition::Lte(v) => {
                write!(f, "{} {} {v}", self.field, self.condition.operator())
            }
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl SortDirection {
    pub(crate) fn cursor_direction(self) -> Direction {
        match self {
            SortDirection::Asc => Direction::Next,
            SortDirection::Desc => Direction::Prev,
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => f.write_str("asc"),
            SortDirection::Desc => f.write_str("desc"),
        }
    }
}

/// Result ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Indexed field to order by.
    pub field: String,
    /// Direction.
    pub direction: SortDirection,
}

/// Options for [`Repository::find_all`](crate::Repository::find_all).
///
/// ```rust
/// use lexidb_core::{QueryCondition, QueryOptions, SortDirection};
///
/// let options = QueryOptions::new()
///     .filter(QueryCondition::eq("packId", 3))
///     .filter(QueryCondition::gte("level", 2))
///     .order_by("createdAt", SortDirection::Desc)
///     .limit(20);
/// assert_eq!(options.conditions.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// Conditions, all of which must hold.
    pub conditions: Vec<QueryCondition>,
    /// Result ordering.
    pub order_by: Option<OrderBy>,
    /// Maximum number of results.
    pub limit: Option<usize>,
    /// Number of leading results to skip.
    pub offset: Option<usize>,
}

impl QueryOptions {
    /// Creates empty options: every record, in store order.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a condition.
    #[must_use]
    pub fn filter(mut self, condition: QueryCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Sets the ordering.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    /// Sets the result limit.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the number of results to skip.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Options for [`Repository::find_by_range`](crate::Repository::find_by_range).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeOptions {
    /// Exclude the lower bound itself.
    pub lower_open: bool,
    /// Exclude the upper bound itself.
    pub upper_open: bool,
    /// Stop after this many records.
    pub limit: Option<usize>,
    /// Scan direction.
    pub direction: SortDirection,
}

impl RangeOptions {
    /// Closed bounds, ascending, no limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the lower bound is excluded.
    #[must_use]
    pub const fn lower_open(mut self, value: bool) -> Self {
        self.lower_open = value;
        self
    }

    /// Sets whether the upper bound is excluded.
    #[must_use]
    pub const fn upper_open(mut self, value: bool) -> Self {
        self.upper_open = value;
        self
    }

    /// Sets the result limit.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the scan direction.
    #[must_use]
    pub const fn direction(mut self, direction: SortDirection) -> Self {
        self.direction = direction;
        self
    }
}
