//! Query planning.
//!
//! Strategies, cheapest first:
//!
//! 1. no conditions, no ordering: full scan of the collection
//! 2. no conditions, ordering: cursor over the ordering field's index,
//!    paginating while it walks
//! 3. a single `eq` condition: index lookup, then in-memory sort and slice
//! 4. anything else: one *driving* condition bounds the index scan (the first
//!    `eq` if there is one, else the first range), the remaining conditions
//!    filter candidates in memory, then sort and slice
//!
//! Every referenced field is resolved against the schema before a plan is
//! returned, so an unindexed field fails before any store access.

use super::query::{QueryOptions, SortDirection};
use crate::error::CoreResult;
use crate::schema::{FieldAccess, SchemaDescriptor};
use lexidb_codec::{Key, Value};
use lexidb_storage::KeyRange;
use std::cmp::Ordering;
use std::fmt;

/// The strategy the planner picked, as reported by
/// [`Repository::explain`](crate::Repository::explain).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPlan {
    /// Unordered scan of every record.
    FullScan,
    /// Cursor over an index in the requested direction.
    OrderedScan {
        /// Ordering field.
        field: String,
        /// Cursor direction.
        direction: SortDirection,
    },
    /// Point lookup on one index.
    IndexLookup {
        /// Looked-up field.
        field: String,
    },
    /// Index scan bounded by one condition, the rest filtered in memory.
    DrivingIndex {
        /// Field of the driving condition.
        field: String,
        /// Number of conditions applied in memory.
        residual: usize,
    },
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryPlan::FullScan => f.write_str("full scan"),
            QueryPlan::OrderedScan { field, direction } => {
                write!(f, "ordered scan on {field} {direction}")
            }
            QueryPlan::IndexLookup { field } => write!(f, "index lookup on {field}"),
            QueryPlan::DrivingIndex { field, residual } => {
                write!(f, "driving index on {field} with {residual} residual filter(s)")
            }
        }
    }
}

/// A field resolved against the schema.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Resolved {
    pub(crate) key_path: &'static str,
    pub(crate) access: FieldAccess,
}

impl Resolved {
    pub(crate) fn new(schema: &SchemaDescriptor, field: &str) -> CoreResult<Self> {
        let access = schema.require(field)?;
        let key_path = match access {
            FieldAccess::PrimaryKey => schema.primary_key,
            FieldAccess::Index(index) => index.key_path,
        };
        Ok(Self { key_path, access })
    }

    pub(crate) fn index(&self) -> Option<&'static str> {
        self.access.index_name()
    }

    /// The record's key for this field, if it has a valid one.
    pub(crate) fn key_of(&self, record: &Value) -> Option<Key> {
        record.get_path(self.key_path).and_then(Key::from_value)
    }
}

/// A condition with its field resolved and its key range built.
#[derive(Debug, Clone)]
pub(crate) struct Filter {
    pub(crate) field: Resolved,
    pub(crate) range: KeyRange,
    pub(crate) is_eq: bool,
}

impl Filter {
    /// Same semantics as an index scan over `range`: records whose field is
    /// missing or not a valid key never match.
    pub(crate) fn matches(&self, record: &Value) -> bool {
        self.field
            .key_of(record)
            .is_some_and(|key| self.range.contains(&key))
    }
}

/// Resolved ordering.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Order {
    pub(crate) field: Resolved,
    pub(crate) direction: SortDirection,
}

impl Order {
    /// Stable in-memory sort. Records without a valid key sort last in
    /// either direction.
    pub(crate) fn sort(&self, records: &mut [Value]) {
        let direction = self.direction;
        let field = self.field;
        records.sort_by_cached_key(|record| SortKey {
            key: field.key_of(record),
            direction,
        });
    }
}

#[derive(PartialEq, Eq)]
struct SortKey {
    key: Option<Key>,
    direction: SortDirection,
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.key, &other.key) {
            (Some(a), Some(b)) => match self.direction {
                SortDirection::Asc => a.cmp(b),
                SortDirection::Desc => b.cmp(a),
            },
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Chosen access path.
#[derive(Debug, Clone)]
pub(crate) enum Strategy {
    FullScan,
    OrderedScan,
    IndexLookup,
    /// Index into `Plan::filters` of the driving condition.
    DrivingIndex(usize),
}

/// An executable plan.
#[derive(Debug, Clone)]
pub(crate) struct Plan {
    pub(crate) strategy: Strategy,
    pub(crate) filters: Vec<Filter>,
    pub(crate) order: Option<Order>,
    pub(crate) offset: usize,
    pub(crate) limit: Option<usize>,
}

impl Plan {
    /// Public description of the plan.
    pub(crate) fn describe(&self) -> QueryPlan {
        match self.strategy {
            Strategy::FullScan => QueryPlan::FullScan,
            Strategy::OrderedScan => QueryPlan::OrderedScan {
                field: self.order.map_or("", |o| o.field.key_path).to_string(),
                direction: self.order.map_or(SortDirection::Asc, |o| o.direction),
            },
            Strategy::IndexLookup => QueryPlan::IndexLookup {
                field: self.filters[0].field.key_path.to_string(),
            },
            Strategy::DrivingIndex(driving) => QueryPlan::DrivingIndex {
                field: self.filters[driving].field.key_path.to_string(),
                residual: self.filters.len() - 1,
            },
        }
    }

    /// Every filter except the driving one.
    pub(crate) fn residual(&self, driving: usize) -> impl Iterator<Item = &Filter> {
        self.filters
            .iter()
            .enumerate()
            .filter(move |(i, _)| *i != driving)
            .map(|(_, f)| f)
    }

    /// Sorts, then applies offset and limit.
    pub(crate) fn finish(&self, mut records: Vec<Value>) -> Vec<Value> {
        if let Some(order) = &self.order {
            order.sort(&mut records);
        }
        paginate(records, self.offset, self.limit)
    }
}

pub(crate) fn paginate(records: Vec<Value>, offset: usize, limit: Option<usize>) -> Vec<Value> {
    let rest = records.into_iter().skip(offset);
    match limit {
        Some(n) => rest.take(n).collect(),
        None => rest.collect(),
    }
}

/// Validates `options` against `schema` and picks a strategy.
///
/// Fields are checked in order (conditions first, then ordering); the first
/// unknown field fails with `FieldNotIndexed`.
pub(crate) fn plan(schema: &SchemaDescriptor, options: &QueryOptions) -> CoreResult<Plan> {
    let resolved = options
        .conditions
        .iter()
        .map(|c| Resolved::new(schema, &c.field))
        .collect::<CoreResult<Vec<_>>>()?;
    let order = options
        .order_by
        .as_ref()
        .map(|o| {
            Resolved::new(schema, &o.field).map(|field| Order {
                field,
                direction: o.direction,
            })
        })
        .transpose()?;

    let filters = options
        .conditions
        .iter()
        .zip(resolved)
        .map(|(c, field)| {
            Ok(Filter {
                field,
                range: c.condition.key_range()?,
                is_eq: c.condition.is_eq(),
            })
        })
        .collect::<CoreResult<Vec<_>>>()?;

    let strategy = match (filters.as_slice(), order) {
        ([], None) => Strategy::FullScan,
        ([], Some(_)) => Strategy::OrderedScan,
        ([only], _) if only.is_eq => Strategy::IndexLookup,
        (many, _) => Strategy::DrivingIndex(many.iter().position(|f| f.is_eq).unwrap_or(0)),
    };

    Ok(Plan {
        strategy,
        filters,
        order,
        offset: options.offset.unwrap_or(0),
        limit: options.limit,
    })
}
