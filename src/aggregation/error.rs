//! Aggregation error types

use crate::aggregation::types::AggregationType;
use crate::records::RecordType;
use thiserror::Error;

/// Errors that can occur while building or evaluating an aggregation
#[derive(Error, Debug)]
pub enum AggregationError {
    /// The record type does not answer this aggregation
    #[error("Unsupported aggregation: {0}")]
    UnsupportedAggregation(AggregationType),

    /// A priority-resolved aggregation found no priority list for its type
    #[error("Missing priority list for {0}")]
    MissingPriorityList(RecordType),

    /// Grouping parameters are inconsistent
    #[error("Invalid grouping: {0}")]
    InvalidGrouping(String),

    /// Request is malformed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

/// Result type for aggregation operations
pub type AggregationResult<T> = Result<T, AggregationError>;
