//! Health Service
//!
//! Async facade over the record store, the aggregation engine and the rate
//! limiter. Every call is metered for its caller first, then the synchronous
//! core runs on Tokio's blocking pool.

use crate::aggregation::{
    self, AggregateRequest, AggregateResponse, AggregationError, OriginPriorities,
};
use crate::config::Config;
use crate::ratelimit::{CallerId, QuotaCategory, RateLimitError, RateLimiter, RateLimiterState};
use crate::records::{Record, RecordType, TimeRange};
use crate::storage::{SqliteStore, StorageError};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors surfaced to service callers
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Aggregation error: {0}")]
    Aggregation(#[from] AggregationError),

    #[error("Rate limit error: {0}")]
    RateLimit(#[from] RateLimitError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The blocking worker panicked or was cancelled
    #[error("Task error: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Stored records plus each distinct (type, package, origin id) they wrote
type InsertOutcome = (Vec<Record>, Vec<(RecordType, String, i64)>);

/// Shared service handle
#[derive(Clone)]
pub struct HealthService {
    store: Arc<SqliteStore>,
    limiter: Arc<RateLimiter>,
    priorities: Arc<RwLock<OriginPriorities>>,
}

impl HealthService {
    pub fn new(
        store: Arc<SqliteStore>,
        limiter: Arc<RateLimiter>,
        priorities: OriginPriorities,
    ) -> Self {
        Self {
            store,
            limiter,
            priorities: Arc::new(RwLock::new(priorities)),
        }
    }

    /// Open the configured database and seed origin priorities
    pub async fn open(config: &Config) -> ServiceResult<Self> {
        let path = config.storage.resolved_path();
        let store = tokio::task::spawn_blocking(move || SqliteStore::open(&path)).await??;
        Self::with_store(Arc::new(store), config).await
    }

    /// Build a service around an existing store
    pub async fn with_store(store: Arc<SqliteStore>, config: &Config) -> ServiceResult<Self> {
        let mut seeds = Vec::with_capacity(config.priorities.len());
        for (name, packages) in &config.priorities {
            let record_type = RecordType::from_name(name).ok_or_else(|| {
                ServiceError::InvalidConfig(format!("unknown record type in priorities: {}", name))
            })?;
            seeds.push((record_type, packages.clone()));
        }

        let seed_store = store.clone();
        let priorities = tokio::task::spawn_blocking(move || -> ServiceResult<OriginPriorities> {
            let mut priorities = OriginPriorities::new();
            for (record_type, packages) in seeds {
                let ids = packages
                    .iter()
                    .map(|package| seed_store.get_or_create_origin(package))
                    .collect::<Result<Vec<_>, _>>()?;
                priorities.set(record_type, ids);
            }
            Ok(priorities)
        })
        .await??;

        let limiter = RateLimiter::new(
            Arc::new(RateLimiterState::new()),
            config.rate_limiter.clone(),
        );

        tracing::info!(
            path = ?store.path(),
            seeded_types = config.priorities.len(),
            rate_limiting = config.rate_limiter.enabled,
            "Health service ready"
        );
        Ok(Self::new(store, Arc::new(limiter), priorities))
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Snapshot of the current priority lists
    pub async fn priorities(&self) -> OriginPriorities {
        self.priorities.read().await.clone()
    }

    /// Replace the priority list of a record type by package names
    pub async fn set_priority(
        &self,
        record_type: RecordType,
        packages: Vec<String>,
    ) -> ServiceResult<()> {
        let store = self.store.clone();
        let ids = tokio::task::spawn_blocking(move || {
            packages
                .iter()
                .map(|package| store.get_or_create_origin(package))
                .collect::<Result<Vec<_>, _>>()
        })
        .await??;

        self.priorities.write().await.set(record_type, ids);
        Ok(())
    }

    /// Insert records and register their origins in the priority lists
    pub async fn insert_records(
        &self,
        caller: CallerId,
        foreground: bool,
        records: Vec<Record>,
    ) -> ServiceResult<Vec<Record>> {
        // The call is charged even when the payload is then rejected
        self.limiter
            .try_acquire_api_call(caller, QuotaCategory::Write, foreground)?;
        self.check_payload(&records)?;

        let store = self.store.clone();
        let (stored, origins) = tokio::task::spawn_blocking(move || -> ServiceResult<InsertOutcome> {
            let stored = store.insert_records(&records)?;
            let mut origins: Vec<(RecordType, String, i64)> = Vec::new();
            for record in &stored {
                let key = (record.record_type(), record.metadata().data_origin.as_str());
                if !origins.iter().any(|(t, o, _)| (*t, o.as_str()) == key) {
                    let id = store.get_or_create_origin(key.1)?;
                    origins.push((key.0, key.1.to_string(), id));
                }
            }
            Ok((stored, origins))
        })
        .await??;

        let mut priorities = self.priorities.write().await;
        for (record_type, package, id) in origins {
            if priorities.append_if_absent(record_type, id) {
                tracing::info!(
                    record_type = %record_type,
                    package = %package,
                    "Appended origin to priority list"
                );
            }
        }

        Ok(stored)
    }

    /// Replace stored records matched by id
    pub async fn update_records(
        &self,
        caller: CallerId,
        foreground: bool,
        records: Vec<Record>,
    ) -> ServiceResult<Vec<Record>> {
        self.limiter
            .try_acquire_api_call(caller, QuotaCategory::Write, foreground)?;
        self.check_payload(&records)?;

        let store = self.store.clone();
        let stored = tokio::task::spawn_blocking(move || store.update_records(&records)).await??;
        Ok(stored)
    }

    pub async fn read_records(
        &self,
        caller: CallerId,
        foreground: bool,
        record_type: RecordType,
        range: TimeRange,
    ) -> ServiceResult<Vec<Record>> {
        self.limiter
            .try_acquire_api_call(caller, QuotaCategory::Read, foreground)?;

        let store = self.store.clone();
        let records =
            tokio::task::spawn_blocking(move || store.read_records(record_type, &range)).await??;
        Ok(records)
    }

    pub async fn delete_records(
        &self,
        caller: CallerId,
        foreground: bool,
        record_type: RecordType,
        ids: Vec<String>,
    ) -> ServiceResult<usize> {
        self.limiter
            .try_acquire_api_call(caller, QuotaCategory::Write, foreground)?;

        let store = self.store.clone();
        let deleted =
            tokio::task::spawn_blocking(move || store.delete_records(record_type, &ids)).await??;
        Ok(deleted)
    }

    pub async fn aggregate(
        &self,
        caller: CallerId,
        foreground: bool,
        request: AggregateRequest,
    ) -> ServiceResult<AggregateResponse> {
        self.limiter
            .try_acquire_api_call(caller, QuotaCategory::Read, foreground)?;

        let priorities = self.priorities().await;
        let store = self.store.clone();
        let response = tokio::task::spawn_blocking(move || {
            aggregation::aggregate(store.as_ref(), &priorities, &request)
        })
        .await??;

        tracing::debug!(
            caller,
            groups = response.groups.len(),
            "Aggregated records"
        );
        Ok(response)
    }

    fn check_payload(&self, records: &[Record]) -> ServiceResult<()> {
        let mut chunk = 0u64;
        for record in records {
            let size = record.estimated_size()?;
            self.limiter.check_max_record_memory_usage(size)?;
            chunk += size;
        }
        self.limiter.check_max_chunk_memory_usage(chunk)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::{AggregateValue, AggregationType, GroupBy};
    use crate::config::RateLimiterConfig;
    use crate::ratelimit::QuotaBucket;
    use crate::records::{Metadata, RecordData, RecordTime, ZoneOffset};
    use tempfile::TempDir;

    const CALLER: CallerId = 10_042;
    const HOUR: i64 = 3_600_000;

    fn steps(origin: &str, start: i64, end: i64, count: i64) -> Record {
        Record::new(
            Metadata::new(origin),
            RecordTime::interval(start, end, ZoneOffset::UTC),
            RecordData::Steps { count },
        )
        .unwrap()
    }

    async fn service_with(config: Config) -> HealthService {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        HealthService::with_store(store, &config).await.unwrap()
    }

    #[tokio::test]
    async fn test_first_writer_ranks_first() {
        let service = service_with(Config::default()).await;
        service
            .insert_records(CALLER, true, vec![steps("com.watch", 0, HOUR, 1000)])
            .await
            .unwrap();
        service
            .insert_records(CALLER, true, vec![steps("com.phone", 0, HOUR, 1500)])
            .await
            .unwrap();

        let request = AggregateRequest::new(
            vec![AggregationType::StepsCountTotal],
            TimeRange::try_new(0, HOUR).unwrap(),
        );
        let response = service.aggregate(CALLER, true, request).await.unwrap();
        assert_eq!(
            response.get(AggregationType::StepsCountTotal).unwrap().value,
            AggregateValue::Long(1000)
        );
        assert_eq!(service.priorities().await.get(RecordType::Steps).len(), 2);
    }

    #[tokio::test]
    async fn test_configured_priorities_win() {
        let mut config = Config::default();
        config.priorities.insert(
            "steps".to_string(),
            vec!["com.phone".to_string(), "com.watch".to_string()],
        );
        let service = service_with(config).await;
        service
            .insert_records(
                CALLER,
                true,
                vec![
                    steps("com.watch", 0, HOUR, 1000),
                    steps("com.phone", 0, HOUR, 1500),
                ],
            )
            .await
            .unwrap();

        let request = AggregateRequest::new(
            vec![AggregationType::StepsCountTotal],
            TimeRange::try_new(0, 2 * HOUR).unwrap(),
        )
        .group_by(GroupBy::Duration(chrono::Duration::hours(1)));
        let response = service.aggregate(CALLER, true, request).await.unwrap();

        assert_eq!(response.groups.len(), 2);
        assert_eq!(
            response.groups[0]
                .get(AggregationType::StepsCountTotal)
                .unwrap()
                .value,
            AggregateValue::Long(1500)
        );
        assert!(response.groups[1].results.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_priority_type_rejected() {
        let mut config = Config::default();
        config
            .priorities
            .insert("sleep".to_string(), vec!["com.a".to_string()]);
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        assert!(matches!(
            HealthService::with_store(store, &config).await,
            Err(ServiceError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_read_and_delete() {
        let service = service_with(Config::default()).await;
        let stored = service
            .insert_records(
                CALLER,
                false,
                vec![steps("com.a", 0, 10, 5), steps("com.a", 20, 30, 6)],
            )
            .await
            .unwrap();

        let range = TimeRange::try_new(0, 100).unwrap();
        let read = service
            .read_records(CALLER, false, RecordType::Steps, range)
            .await
            .unwrap();
        assert_eq!(read.len(), 2);

        let id = stored[0].id().unwrap().to_string();
        let deleted = service
            .delete_records(CALLER, false, RecordType::Steps, vec![id])
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(service.store().count(RecordType::Steps).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_write_quota_enforced() {
        let mut config = Config::default();
        config.rate_limiter = RateLimiterConfig {
            background_max_per_15m: 2.0,
            ..RateLimiterConfig::default()
        };
        let service = service_with(config).await;

        for i in 0..2 {
            service
                .insert_records(CALLER, false, vec![steps("com.a", i * 10, i * 10 + 5, 1)])
                .await
                .unwrap();
        }
        let err = service
            .insert_records(CALLER, false, vec![steps("com.a", 40, 45, 1)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::RateLimit(RateLimitError::QuotaExceeded { .. })
        ));

        // Reads draw from separate buckets
        service
            .read_records(
                CALLER,
                false,
                RecordType::Steps,
                TimeRange::try_new(0, 100).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(service.store().count(RecordType::Steps).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_oversized_chunk_rejected() {
        let mut config = Config::default();
        config.rate_limiter.chunk_size_limit_in_bytes = 400;
        let service = service_with(config).await;

        let records: Vec<Record> = (0..10)
            .map(|i| steps("com.a", i * 10, i * 10 + 5, 1))
            .collect();
        let err = service
            .insert_records(CALLER, true, records)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::RateLimit(RateLimitError::ChunkSizeExceeded { limit: 400, .. })
        ));
        assert_eq!(service.store().count(RecordType::Steps).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rejected_chunk_still_costs_a_write() {
        let mut config = Config::default();
        config.rate_limiter.chunk_size_limit_in_bytes = 400;
        let service = service_with(config).await;

        let records: Vec<Record> = (0..10)
            .map(|i| steps("com.a", i * 10, i * 10 + 5, 1))
            .collect();
        assert!(service.insert_records(CALLER, true, records).await.is_err());

        let available = service
            .rate_limiter()
            .available_quota(CALLER, QuotaBucket::WritesPer15mForeground)
            .unwrap();
        assert!(available < 1000.0);
        assert!(available > 998.0);
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.database_path = dir
            .path()
            .join("nested")
            .join("health.db")
            .to_string_lossy()
            .to_string();

        let service = HealthService::open(&config).await.unwrap();
        service
            .insert_records(CALLER, true, vec![steps("com.a", 0, 10, 5)])
            .await
            .unwrap();
        drop(service);

        let reopened = HealthService::open(&config).await.unwrap();
        assert_eq!(reopened.store().count(RecordType::Steps).unwrap(), 1);
    }
}
