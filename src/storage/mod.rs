//! Record storage
//!
//! - **row**: named column values exchanged with the query layer
//! - **executor**: the query executor contract the aggregation engine runs on
//! - **app_info**: origin registry (package name ⇔ integer id)
//! - **sqlite**: SQLite-backed store implementing the executor
//! - **error**: error types
//!
//! # Layout
//!
//! ```text
//! app_info(row_id, package_name)
//!     ▲
//!     │ app_info_id
//! <record>_table(row_id, uuid, app_info_id, last_modified_time, ...,
//!                time | start_time/end_time, zone offsets, payload columns)
//! ```
//!
//! # Example
//!
//! ```rust
//! use healthstore::records::*;
//! use healthstore::storage::SqliteStore;
//!
//! let store = SqliteStore::open_in_memory().unwrap();
//! let record = Record::new(
//!     Metadata::new("com.example.scale"),
//!     RecordTime::instant(1_700_000_000_000, ZoneOffset::UTC),
//!     RecordData::Weight { grams: 72_500.0 },
//! )
//! .unwrap();
//!
//! store.insert_records(&[record]).unwrap();
//! assert_eq!(store.count(RecordType::Weight).unwrap(), 1);
//! ```

pub mod app_info;
pub mod error;
pub mod executor;
pub mod row;
pub mod sqlite;

pub use error::{StorageError, StorageResult};
pub use executor::QueryExecutor;
pub use row::{Row, Value};
pub use sqlite::SqliteStore;
