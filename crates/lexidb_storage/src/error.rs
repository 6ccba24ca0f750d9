//! Storage error types.

use thiserror::Error;

/// Result type for host store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in host store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The named object store does not exist.
    #[error("object store not found: {name}")]
    ObjectStoreNotFound {
        /// Name of the object store.
        name: String,
    },

    /// An object store with this name already exists.
    #[error("object store already exists: {name}")]
    ObjectStoreExists {
        /// Name of the object store.
        name: String,
    },

    /// The named index does not exist on the object store.
    #[error("index {index} not found on object store {store}")]
    IndexNotFound {
        /// Object store name.
        store: String,
        /// Index name.
        index: String,
    },

    /// An index with this name already exists on the object store.
    #[error("index {index} already exists on object store {store}")]
    IndexExists {
        /// Object store name.
        store: String,
        /// Index name.
        index: String,
    },

    /// A unique constraint was violated.
    #[error("constraint violation in {store}: {message}")]
    Constraint {
        /// Object store name.
        store: String,
        /// Description of the violation.
        message: String,
    },

    /// A key or record is malformed.
    #[error("data error: {message}")]
    Data {
        /// Description of the problem.
        message: String,
    },

    /// A write was attempted in a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// The transaction was already committed or aborted.
    #[error("transaction is no longer active")]
    TransactionInactive,

    /// The object store exists but is not part of the transaction scope.
    #[error("object store {name} is outside the transaction scope")]
    NotInScope {
        /// Name of the object store.
        name: String,
    },

    /// The requested version is lower than the stored version.
    #[error("version {requested} of {name} is lower than the existing version {current}")]
    VersionTooLow {
        /// Database name.
        name: String,
        /// Requested version.
        requested: u32,
        /// Stored version.
        current: u32,
    },

    /// Versions start at 1.
    #[error("invalid version {0}; versions start at 1")]
    InvalidVersion(u32),

    /// An upgrade cannot run while other connections are open.
    #[error("upgrade of {name} to version {requested} blocked by {open} open connection(s)")]
    Blocked {
        /// Database name.
        name: String,
        /// Requested version.
        requested: u32,
        /// Number of open connections holding the old version.
        open: usize,
    },

    /// The connection was closed.
    #[error("connection to {name} is closed")]
    ConnectionClosed {
        /// Database name.
        name: String,
    },
}

impl StorageError {
    /// Creates an object store not found error.
    pub fn store_not_found(name: impl Into<String>) -> Self {
        Self::ObjectStoreNotFound { name: name.into() }
    }

    /// Creates an index not found error.
    pub fn index_not_found(store: impl Into<String>, index: impl Into<String>) -> Self {
        Self::IndexNotFound {
            store: store.into(),
            index: index.into(),
        }
    }

    /// Creates a constraint violation error.
    pub fn constraint(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Constraint {
            store: store.into(),
            message: message.into(),
        }
    }

    /// Creates a data error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data {
            message: message.into(),
        }
    }
}
