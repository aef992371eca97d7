//! Error types for table storage operations

use strum::Display;
use thiserror::Error;

use crate::schema::AttributeType;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Store operation kinds, used for error context and log records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    /// Single item write
    PutItem,
    /// Single item read
    GetItem,
    /// Single item update
    UpdateItem,
    /// Single item delete
    DeleteItem,
    /// Full table scan
    Scan,
    /// Partition-restricted query
    Query,
    /// Table creation
    CreateTable,
}

/// How an item or key failed to match the table it was addressed to
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaViolation {
    /// Item carries an attribute the table does not declare
    #[error("unexpected attribute `{0}`")]
    UnexpectedAttribute(String),

    /// Item is missing a declared attribute
    #[error("missing attribute `{0}`")]
    MissingAttribute(String),

    /// Attribute value carries the wrong type tag
    #[error("attribute `{attribute}` expected {expected}, found {found}")]
    TypeMismatch {
        /// Attribute name
        attribute: String,
        /// Declared type
        expected: AttributeType,
        /// Tag found on the value
        found: String,
    },

    /// Number attribute does not hold a finite decimal number
    #[error("attribute `{attribute}` is not a number: {value:?}")]
    InvalidNumber {
        /// Attribute name
        attribute: String,
        /// Value found
        value: String,
    },

    /// Key carries an attribute that is not part of the table key
    #[error("unexpected key attribute `{0}`")]
    UnexpectedKeyAttribute(String),

    /// Key is missing a partition or sort key attribute
    #[error("missing key attribute `{0}`")]
    MissingKeyAttribute(String),
}

/// Storage error types
#[derive(Debug, Error)]
pub enum StorageError {
    /// Item or key shape does not match the table, raised before any store call
    #[error("Item does not match schema of table {table}: {violation}")]
    SchemaMismatch {
        /// Table the payload was addressed to
        table: String,
        /// First violation found
        violation: SchemaViolation,
    },

    /// Table is not part of the configured registry
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// Two registered tables share a name
    #[error("Duplicate table name: {0}")]
    DuplicateTable(String),

    /// Transport or service failure reported by the store client
    #[error("Failed to {operation} on table {table}: {code}: {message}")]
    StoreOperationFailed {
        /// Operation that failed
        operation: Operation,
        /// Table the operation targeted
        table: String,
        /// Machine readable error code from the store
        code: String,
        /// Human readable error message from the store
        message: String,
    },

    /// Failed to convert between a record and a `DynamoDB` item
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl StorageError {
    /// Error code of a store failure, if this is one
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::StoreOperationFailed { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<serde_dynamo::Error> for StorageError {
    fn from(err: serde_dynamo::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
