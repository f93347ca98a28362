//! Rate limiter error types

use crate::ratelimit::limiter::QuotaBucket;
use thiserror::Error;

/// Rejections raised by the rate limiter
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RateLimitError {
    /// The caller passed the placeholder category
    #[error("Quota category not defined")]
    UndefinedCategory,

    #[error("API call quota exceeded for {bucket}, available quota: {available} requested: {requested}")]
    QuotaExceeded {
        bucket: QuotaBucket,
        requested: f64,
        available: f64,
    },

    #[error("Records chunk size exceeded the max chunk limit: {limit}, was: {actual}")]
    ChunkSizeExceeded { limit: u64, actual: u64 },

    #[error("Record size exceeded the single record size limit: {limit}, was: {actual}")]
    RecordSizeExceeded { limit: u64, actual: u64 },

    #[error("Lock error: {0}")]
    Lock(String),
}

impl RateLimitError {
    /// True for rejections a caller may retry later
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, RateLimitError::QuotaExceeded { .. })
    }
}

/// Result type for rate limiter operations
pub type RateLimitResult<T> = Result<T, RateLimitError>;
