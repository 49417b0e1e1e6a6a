//! Storage error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::schema::DataType;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by the table-file storage layer.
///
/// Missing files and real I/O failures are separate variants: a permission
/// problem or a full disk surfaces as [`StorageError::Io`], never as
/// "not found".
#[derive(Debug, Error)]
pub enum StorageError {
    /// The table file does not exist.
    #[error("table {database}/{table} does not exist")]
    TableNotFound { database: String, table: String },

    /// A table file already exists at the target path.
    #[error("table {database}/{table} already exists")]
    TableExists { database: String, table: String },

    /// The database directory (or registry row) does not exist.
    #[error("database {0} does not exist")]
    DatabaseNotFound(String),

    /// The database is already registered.
    #[error("database {0} already exists")]
    DatabaseExists(String),

    /// A referenced column is not part of the table schema.
    #[error("unknown column {0}")]
    AttributeNotFound(String),

    /// Two columns share a name.
    #[error("duplicate column {0}")]
    DuplicateAttribute(String),

    /// More columns than a table file can describe.
    #[error("too many columns: {count} (limit {limit})")]
    TooManyAttributes { count: usize, limit: usize },

    /// A schema with no columns.
    #[error("table must have at least one column")]
    EmptySchema,

    /// A database, table or column name that is not alphanumeric.
    #[error("invalid identifier {0:?}")]
    InvalidIdentifier(String),

    /// An unrecognized column type declaration.
    #[error("unsupported column type {0:?}")]
    InvalidType(String),

    /// A literal that does not parse as the column's declared type.
    #[error("value {literal:?} is not a valid {data_type}")]
    InvalidValue { literal: String, data_type: DataType },

    /// An INSERT carrying more values than the table has columns.
    #[error("too many values: {given} given for {expected} columns")]
    TooManyValues { given: usize, expected: usize },

    /// A payload whose length does not match the table's record size.
    #[error("record is {actual} bytes, table expects {expected}")]
    RecordSize { expected: usize, actual: usize },

    /// The table file header or attribute slots are unreadable.
    #[error("corrupt table file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// Underlying I/O failure.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}
