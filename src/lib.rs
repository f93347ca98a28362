//! # Healthstore
//!
//! On-device health record store: typed record schemas, time-bucketed
//! aggregation with origin priorities, and per-caller rate limiting.
//!
//! ## Modules
//!
//! - [`records`]: record catalogue, validation and per-type table schemas
//! - [`storage`]: SQLite record store and the query executor contract
//! - [`aggregation`]: aggregation queries, priority resolution and grouping
//! - [`ratelimit`]: multi-window token buckets and payload ceilings
//! - [`service`]: async facade tying the pieces together
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use healthstore::aggregation::{AggregateRequest, AggregationType};
//! use healthstore::records::*;
//! use healthstore::{Config, HealthService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = HealthService::open(&Config::load_default()).await?;
//!
//!     let steps = Record::new(
//!         Metadata::new("com.example.watch"),
//!         RecordTime::interval(0, 3_600_000, ZoneOffset::UTC),
//!         RecordData::Steps { count: 4200 },
//!     )?;
//!     service.insert_records(10_001, true, vec![steps]).await?;
//!
//!     let request = AggregateRequest::new(
//!         vec![AggregationType::StepsCountTotal],
//!         TimeRange::last_days(1),
//!     );
//!     let response = service.aggregate(10_001, true, request).await?;
//!     println!("{:?}", response.get(AggregationType::StepsCountTotal));
//!
//!     Ok(())
//! }
//! ```

pub mod aggregation;
pub mod config;
pub mod ratelimit;
pub mod records;
pub mod service;
pub mod storage;

// Re-export top-level types for convenience
pub use aggregation::{
    aggregate, AggregateRequest, AggregateResponse, AggregationError, AggregationResult,
    AggregationType, OriginPriorities,
};

pub use config::{Config, ConfigError, LoggingConfig, RateLimiterConfig, StorageConfig};

pub use ratelimit::{QuotaBucket, QuotaCategory, RateLimitError, RateLimiter, RateLimiterState};

pub use records::{Metadata, Record, RecordData, RecordTime, RecordType, TimeRange, ZoneOffset};

pub use service::{HealthService, ServiceError, ServiceResult};

pub use storage::{QueryExecutor, SqliteStore, StorageError, StorageResult};
