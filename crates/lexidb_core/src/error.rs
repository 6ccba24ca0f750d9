//! Error types for LexiDB core.

use lexidb_codec::CodecError;
use lexidb_storage::StorageError;
use std::fmt;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Stable, machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Store accessed before it was opened.
    NotInitialized,
    /// Query or order field without a backing index.
    FieldNotIndexed,
    /// Malformed call arguments.
    InvalidParams,
    /// Unsupported operation.
    InvalidOperation,
    /// A bulk save failed and was rolled back.
    SaveManyFailed,
    /// A bulk delete failed and was rolled back.
    DeleteManyFailed,
    /// An index range scan failed.
    RangeQueryFailed,
    /// A filtered multi-condition query failed.
    ComplexQueryFailed,
    /// A transaction body or commit failed.
    TransactionFailed,
    /// An ordered cursor scan failed.
    CursorQueryFailed,
    /// The host store could not be opened.
    StoreOpenFailed,
    /// Unwrapped host store failure.
    StorageError,
    /// Unwrapped record conversion failure.
    CodecError,
}

impl ErrorCode {
    /// Returns the code as a constant string.
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NotInitialized => "NOT_INITIALIZED",
            ErrorCode::FieldNotIndexed => "FIELD_NOT_INDEXED",
            ErrorCode::InvalidParams => "INVALID_PARAMS",
            ErrorCode::InvalidOperation => "INVALID_OPERATION",
            ErrorCode::SaveManyFailed => "SAVE_MANY_FAILED",
            ErrorCode::DeleteManyFailed => "DELETE_MANY_FAILED",
            ErrorCode::RangeQueryFailed => "RANGE_QUERY_FAILED",
            ErrorCode::ComplexQueryFailed => "COMPLEX_QUERY_FAILED",
            ErrorCode::TransactionFailed => "TRANSACTION_FAILED",
            ErrorCode::CursorQueryFailed => "CURSOR_QUERY_FAILED",
            ErrorCode::StoreOpenFailed => "STORE_OPEN_FAILED",
            ErrorCode::StorageError => "STORAGE_ERROR",
            ErrorCode::CodecError => "CODEC_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in LexiDB core operations.
///
/// Host store and codec failures surface either unwrapped (`Storage`,
/// `Codec`) or wrapped in the variant naming the operation that failed.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The store has not been opened yet.
    #[error("store is not initialized; open it before use")]
    NotInitialized,

    /// A query referenced a field that has no index.
    #[error("field '{field}' is not indexed in {collection}; indexed fields: [{}]", .indexed.join(", "))]
    FieldNotIndexed {
        /// Collection queried.
        collection: String,
        /// The offending field.
        field: String,
        /// Fields that can be queried.
        indexed: Vec<String>,
    },

    /// Malformed call arguments.
    #[error("invalid parameters: {message}")]
    InvalidParams {
        /// Description of the problem.
        message: String,
    },

    /// Unsupported operation.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of the problem.
        message: String,
    },

    /// A bulk save failed; none of its records were written.
    #[error("save_many on {collection} failed: {source}")]
    SaveManyFailed {
        /// Collection written.
        collection: String,
        /// Underlying failure.
        #[source]
        source: Box<CoreError>,
    },

    /// A bulk delete failed; none of its deletions were applied.
    #[error("delete_many on {collection} failed: {source}")]
    DeleteManyFailed {
        /// Collection written.
        collection: String,
        /// Underlying failure.
        #[source]
        source: Box<CoreError>,
    },

    /// An index range scan failed.
    #[error("range query on {collection}.{field} failed: {source}")]
    RangeQueryFailed {
        /// Collection queried.
        collection: String,
        /// Indexed field scanned.
        field: String,
        /// Underlying failure.
        #[source]
        source: Box<CoreError>,
    },

    /// A filtered multi-condition query failed.
    #[error("query on {collection} failed: {source}")]
    ComplexQueryFailed {
        /// Collection queried.
        collection: String,
        /// Underlying failure.
        #[source]
        source: Box<CoreError>,
    },

    /// A transaction failed and was rolled back.
    #[error("transaction over [{}] failed: {source}", .collections.join(", "))]
    TransactionFailed {
        /// Collections in scope.
        collections: Vec<String>,
        /// Underlying failure.
        #[source]
        source: Box<CoreError>,
    },

    /// An ordered cursor scan failed.
    #[error("ordered scan of {collection} by {field} failed: {source}")]
    CursorQueryFailed {
        /// Collection queried.
        collection: String,
        /// Ordering field.
        field: String,
        /// Underlying failure.
        #[source]
        source: Box<CoreError>,
    },

    /// The host store could not be opened.
    #[error("failed to open store {name} at version {version}: {source}")]
    StoreOpenFailed {
        /// Store name.
        name: String,
        /// Requested version.
        version: u32,
        /// Underlying failure.
        #[source]
        source: Box<CoreError>,
    },

    /// Host store error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Record conversion error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl CoreError {
    /// Creates an invalid parameters error.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns the stable code of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::FieldNotIndexed { .. } => ErrorCode::FieldNotIndexed,
            Self::InvalidParams { .. } => ErrorCode::InvalidParams,
            Self::InvalidOperation { .. } => ErrorCode::InvalidOperation,
            Self::SaveManyFailed { .. } => ErrorCode::SaveManyFailed,
            Self::DeleteManyFailed { .. } => ErrorCode::DeleteManyFailed,
            Self::RangeQueryFailed { .. } => ErrorCode::RangeQueryFailed,
            Self::ComplexQueryFailed { .. } => ErrorCode::ComplexQueryFailed,
            Self::TransactionFailed { .. } => ErrorCode::TransactionFailed,
            Self::CursorQueryFailed { .. } => ErrorCode::CursorQueryFailed,
            Self::StoreOpenFailed { .. } => ErrorCode::StoreOpenFailed,
            Self::Storage(_) => ErrorCode::StorageError,
            Self::Codec(_) => ErrorCode::CodecError,
        }
    }

    /// Returns true for errors raised by this crate, as opposed to raw host
    /// store or codec failures.
    pub fn is_structured(&self) -> bool {
        !matches!(self, Self::Storage(_) | Self::Codec(_))
    }

    /// Wraps a raw failure with operation context. Structured errors are
    /// returned unchanged.
    pub(crate) fn wrap(self, context: impl FnOnce(Box<CoreError>) -> CoreError) -> CoreError {
        if self.is_structured() {
            self
        } else {
            context(Box::new(self))
        }
    }

    /// Finds the host store error at the root of this error, if any.
    pub fn storage_error(&self) -> Option<&StorageError> {
        match self {
            Self::Storage(err) => Some(err),
            Self::SaveManyFailed { source, .. }
            | Self::DeleteManyFailed { source, .. }
            | Self::RangeQueryFailed { source, .. }
            | Self::ComplexQueryFailed { source, .. }
            | Self::TransactionFailed { source, .. }
            | Self::CursorQueryFailed { source, .. }
            | Self::StoreOpenFailed { source, .. } => source.storage_error(),
            _ => None,
        }
    }
}
