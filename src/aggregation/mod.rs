//! Time-bucketed aggregation engine
//!
//! - **types**: aggregation catalogue, parameters and results
//! - **request**: per-table query construction and result dispatch
//! - **priority**: reconciliation of overlapping records by origin priority
//! - **priority_list**: per-record-type origin priority lists
//! - **engine**: evaluation of several aggregations over one range
//!
//! # Flow
//!
//! ```text
//! AggregateRequest
//!   └─ per aggregation: AggregateTableRequest
//!        ├─ aggregation_command ─▶ QueryExecutor ─▶ rows (time ascending)
//!        │     ├─ derived  ─▶ RecordHelper::derive_aggregate
//!        │     ├─ priority ─▶ PriorityRecordsAggregator
//!        │     └─ direct   ─▶ RecordHelper::compute_aggregate
//!        └─ metadata_command ─▶ origin ids ─▶ package names
//! ```
//!
//! # Example
//!
//! ```rust
//! use healthstore::aggregation::*;
//! use healthstore::records::*;
//! use healthstore::storage::SqliteStore;
//!
//! let store = SqliteStore::open_in_memory().unwrap();
//! store
//!     .insert_records(&[Record::new(
//!         Metadata::new("com.example.fitness"),
//!         RecordTime::interval(0, 60_000, ZoneOffset::UTC),
//!         RecordData::Steps { count: 100 },
//!     )
//!     .unwrap()])
//!     .unwrap();
//!
//! let mut priorities = OriginPriorities::new();
//! let origin = store.get_or_create_origin("com.example.fitness").unwrap();
//! priorities.set(RecordType::Steps, vec![origin]);
//!
//! let request = AggregateRequest::new(
//!     vec![AggregationType::StepsCountTotal],
//!     TimeRange::try_new(0, 60_000).unwrap(),
//! );
//! let response = aggregate(&store, &priorities, &request).unwrap();
//! assert_eq!(
//!     response.get(AggregationType::StepsCountTotal).unwrap().value,
//!     AggregateValue::Long(100)
//! );
//! ```

mod engine;
mod error;
mod priority;
mod priority_list;
mod request;
mod types;

pub use engine::{aggregate, AggregateGroup, AggregateRequest, AggregateResponse};
pub use error::{AggregationError, AggregationResult};
pub use priority::{GroupValue, PriorityRecordsAggregator};
pub use priority_list::OriginPriorities;
pub use request::{AggregateTableRequest, GroupBy, Period, GROUP_BY_COLUMN, MAX_GROUPS};
pub use types::{
    AggregateOperation, AggregateParams, AggregateResult, AggregateValue, AggregationContext,
    AggregationType, PriorityAggregationParams, ResultKind,
};
