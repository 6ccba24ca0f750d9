//! Core type definitions for the host store.

use std::fmt;

/// Unique identifier for a host transaction.
///
/// Transaction IDs are monotonically increasing per database and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionMode {
    /// Reads only; never takes the writer lock.
    ReadOnly,
    /// Reads and writes; serialized with other read-write transactions.
    ReadWrite,
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionMode::ReadOnly => write!(f, "readonly"),
            TransactionMode::ReadWrite => write!(f, "readwrite"),
        }
    }
}

/// Iteration direction of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    /// Ascending key order.
    #[default]
    Next,
    /// Descending key order.
    Prev,
}

/// Parameters for creating an object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStoreParams {
    /// Dotted path of the primary key inside each record.
    pub key_path: String,
    /// Whether missing primary keys are generated.
    pub auto_increment: bool,
}

impl ObjectStoreParams {
    /// Creates parameters with the given key path and no key generator.
    pub fn new(key_path: impl Into<String>) -> Self {
        Self {
            key_path: key_path.into(),
            auto_increment: false,
        }
    }

    /// Enables the key generator.
    #[must_use]
    pub fn auto_increment(mut self, value: bool) -> Self {
        self.auto_increment = value;
        self
    }
}

/// Parameters for creating an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexParams {
    /// Dotted path of the indexed field inside each record.
    pub key_path: String,
    /// Whether the index rejects duplicate keys.
    pub unique: bool,
}

impl IndexParams {
    /// Creates non-unique index parameters.
    pub fn new(key_path: impl Into<String>) -> Self {
        Self {
            key_path: key_path.into(),
            unique: false,
        }
    }

    /// Makes this a unique index.
    #[must_use]
    pub fn unique(mut self, value: bool) -> Self {
        self.unique = value;
        self
    }
}
