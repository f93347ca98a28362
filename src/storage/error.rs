//! Storage layer error types
//!
//! Defines all errors that can occur while reading, writing or decoding
//! record rows.

use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// SQLite operation failed
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization of a payload failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A row did not carry a column the schema requires
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// A column held a value of an unexpected storage class
    #[error("Column {column} is not {expected}")]
    ColumnType {
        column: String,
        expected: &'static str,
    },

    /// Record failed construction-time validation
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Record type identifier is not part of the catalogue
    #[error("Unknown record type: {0}")]
    UnknownRecordType(u32),

    /// Record with the given id does not exist
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::MissingColumn("start_time".to_string());
        assert_eq!(err.to_string(), "Missing column: start_time");

        let err = StorageError::ColumnType {
            column: "count".to_string(),
            expected: "an integer",
        };
        assert_eq!(err.to_string(), "Column count is not an integer");
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<Vec<i64>>("not json").unwrap_err();
        let storage_err: StorageError = json_err.into();
        assert!(matches!(storage_err, StorageError::Serialization(_)));
    }
}
