//! Query executor contract
//!
//! The aggregation engine never talks to SQLite directly. It hands query text
//! to a [`QueryExecutor`] and reads back rows in the order the query asked
//! for (always time ascending for aggregation queries).

use crate::storage::error::StorageResult;
use crate::storage::row::Row;

/// Executes textual queries against the row store and resolves origins
pub trait QueryExecutor: Send + Sync {
    /// Run a query and return every row it produced
    fn query(&self, sql: &str) -> StorageResult<Vec<Row>>;

    /// Map origin ids to package names, preserving input order and skipping
    /// ids with no registered origin
    fn package_names(&self, origin_ids: &[i64]) -> StorageResult<Vec<String>>;

    /// Map package names to origin ids, skipping unknown packages
    fn origin_ids(&self, package_names: &[String]) -> StorageResult<Vec<i64>>;
}
