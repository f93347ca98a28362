//! Multi-window token buckets per caller

use crate::config::RateLimiterConfig;
use crate::ratelimit::clock::{Clock, SystemClock};
use crate::ratelimit::error::{RateLimitError, RateLimitResult};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Numeric identity of the calling application
pub type CallerId = u32;

/// Cost of a single metered API call
pub const DEFAULT_API_CALL_COST: u32 = 1;

const WINDOW_15M_MILLIS: i64 = 15 * 60 * 1000;
const WINDOW_24H_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// What kind of call is being metered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuotaCategory {
    Undefined,
    Unmetered,
    Read,
    Write,
}

impl QuotaCategory {
    pub fn code(&self) -> u8 {
        match self {
            QuotaCategory::Undefined => 0,
            QuotaCategory::Unmetered => 1,
            QuotaCategory::Read => 2,
            QuotaCategory::Write => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(QuotaCategory::Undefined),
            1 => Some(QuotaCategory::Unmetered),
            2 => Some(QuotaCategory::Read),
            3 => Some(QuotaCategory::Write),
            _ => None,
        }
    }

    /// Buckets drawn from by a metered call; `None` for unmetered or undefined
    pub fn buckets(&self, foreground: bool) -> Option<[QuotaBucket; 2]> {
        use QuotaBucket::*;
        match (self, foreground) {
            (QuotaCategory::Read, true) => Some([ReadsPer15mForeground, ReadsPer24hForeground]),
            (QuotaCategory::Read, false) => Some([ReadsPer15mBackground, ReadsPer24hBackground]),
            (QuotaCategory::Write, true) => Some([WritesPer15mForeground, WritesPer24hForeground]),
            (QuotaCategory::Write, false) => {
                Some([WritesPer15mBackground, WritesPer24hBackground])
            }
            _ => None,
        }
    }
}

/// One token bucket per category, foreground state and window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuotaBucket {
    ReadsPer15mForeground,
    ReadsPer24hForeground,
    ReadsPer15mBackground,
    ReadsPer24hBackground,
    WritesPer15mForeground,
    WritesPer24hForeground,
    WritesPer15mBackground,
    WritesPer24hBackground,
}

impl QuotaBucket {
    pub fn all() -> &'static [QuotaBucket] {
        use QuotaBucket::*;
        &[
            ReadsPer15mForeground,
            ReadsPer24hForeground,
            ReadsPer15mBackground,
            ReadsPer24hBackground,
            WritesPer15mForeground,
            WritesPer24hForeground,
            WritesPer15mBackground,
            WritesPer24hBackground,
        ]
    }

    pub fn code(&self) -> u8 {
        match self {
            QuotaBucket::ReadsPer15mForeground => 1,
            QuotaBucket::ReadsPer24hForeground => 2,
            QuotaBucket::ReadsPer15mBackground => 3,
            QuotaBucket::ReadsPer24hBackground => 4,
            QuotaBucket::WritesPer15mForeground => 5,
            QuotaBucket::WritesPer24hForeground => 6,
            QuotaBucket::WritesPer15mBackground => 7,
            QuotaBucket::WritesPer24hBackground => 8,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::all().iter().copied().find(|b| b.code() == code)
    }

    pub fn is_foreground(&self) -> bool {
        matches!(
            self,
            QuotaBucket::ReadsPer15mForeground
                | QuotaBucket::ReadsPer24hForeground
                | QuotaBucket::WritesPer15mForeground
                | QuotaBucket::WritesPer24hForeground
        )
    }

    pub fn window_millis(&self) -> i64 {
        match self {
            QuotaBucket::ReadsPer15mForeground
            | QuotaBucket::ReadsPer15mBackground
            | QuotaBucket::WritesPer15mForeground
            | QuotaBucket::WritesPer15mBackground => WINDOW_15M_MILLIS,
            _ => WINDOW_24H_MILLIS,
        }
    }
}

impl fmt::Display for QuotaBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QuotaBucket::ReadsPer15mForeground => "QUOTA_BUCKET_READS_PER_15M_FOREGROUND",
            QuotaBucket::ReadsPer24hForeground => "QUOTA_BUCKET_READS_PER_24H_FOREGROUND",
            QuotaBucket::ReadsPer15mBackground => "QUOTA_BUCKET_READS_PER_15M_BACKGROUND",
            QuotaBucket::ReadsPer24hBackground => "QUOTA_BUCKET_READS_PER_24H_BACKGROUND",
            QuotaBucket::WritesPer15mForeground => "QUOTA_BUCKET_WRITES_PER_15M_FOREGROUND",
            QuotaBucket::WritesPer24hForeground => "QUOTA_BUCKET_WRITES_PER_24H_FOREGROUND",
            QuotaBucket::WritesPer15mBackground => "QUOTA_BUCKET_WRITES_PER_15M_BACKGROUND",
            QuotaBucket::WritesPer24hBackground => "QUOTA_BUCKET_WRITES_PER_24H_BACKGROUND",
        };
        write!(f, "{}", name)
    }
}

/// Bucket level as of its last spend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quota {
    pub last_updated: i64,
    pub remaining: f64,
}

type CallerQuotas = Arc<Mutex<HashMap<QuotaBucket, Quota>>>;

/// Process-wide quota table
///
/// Each caller gets its own lock on first use. Lock objects are never removed.
#[derive(Debug, Default)]
pub struct RateLimiterState {
    callers: DashMap<CallerId, CallerQuotas>,
}

impl RateLimiterState {
    pub fn new() -> Self {
        Self::default()
    }

    fn caller_quotas(&self, caller: CallerId) -> CallerQuotas {
        Arc::clone(&self.callers.entry(caller).or_default())
    }

    /// Forget every caller's bucket levels
    pub fn clear(&self) -> RateLimitResult<()> {
        for entry in self.callers.iter() {
            entry
                .value()
                .lock()
                .map_err(|e| RateLimitError::Lock(format!("Failed to acquire quota lock: {}", e)))?
                .clear();
        }
        tracing::debug!(callers = self.callers.len(), "Cleared rate limiter state");
        Ok(())
    }

    /// Callers seen so far
    pub fn caller_count(&self) -> usize {
        self.callers.len()
    }
}

/// Token-bucket rate limiter over [`RateLimiterState`]
pub struct RateLimiter {
    state: Arc<RateLimiterState>,
    config: RateLimiterConfig,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(state: Arc<RateLimiterState>, config: RateLimiterConfig) -> Self {
        Self::with_clock(state, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        state: Arc<RateLimiterState>,
        config: RateLimiterConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state,
            config,
            clock,
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    pub fn state(&self) -> &Arc<RateLimiterState> {
        &self.state
    }

    /// Configured ceiling of a bucket
    pub fn max_quota(&self, bucket: QuotaBucket) -> f64 {
        let long_window = bucket.window_millis() == WINDOW_24H_MILLIS;
        match (bucket.is_foreground(), long_window) {
            (true, false) => self.config.foreground_max_per_15m,
            (true, true) => self.config.foreground_max_per_24h,
            (false, false) => self.config.background_max_per_15m,
            (false, true) => self.config.background_max_per_24h,
        }
    }

    /// Spend `cost` from both buckets of `category`, or from neither
    pub fn try_acquire(
        &self,
        caller: CallerId,
        category: QuotaCategory,
        foreground: bool,
        cost: u32,
    ) -> RateLimitResult<()> {
        if category == QuotaCategory::Undefined {
            return Err(RateLimitError::UndefinedCategory);
        }
        let buckets = match category.buckets(foreground) {
            Some(buckets) if self.config.enabled => buckets,
            _ => return Ok(()),
        };
        let cost = f64::from(cost);

        let quotas = self.state.caller_quotas(caller);
        let mut quotas = quotas
            .lock()
            .map_err(|e| RateLimitError::Lock(format!("Failed to acquire quota lock: {}", e)))?;
        let now = self.clock.now_millis();

        let available =
            buckets.map(|bucket| (bucket, self.available(bucket, quotas.get(&bucket), now)));

        for (bucket, quota) in available {
            if quota < cost {
                tracing::warn!(
                    caller,
                    bucket = %bucket,
                    requested = cost,
                    available = quota,
                    "API call quota exceeded"
                );
                return Err(RateLimitError::QuotaExceeded {
                    bucket,
                    requested: cost,
                    available: quota,
                });
            }
        }

        for (bucket, quota) in available {
            quotas.insert(
                bucket,
                Quota {
                    last_updated: now,
                    remaining: quota - cost,
                },
            );
        }
        Ok(())
    }

    /// Spend the cost of one API call
    pub fn try_acquire_api_call(
        &self,
        caller: CallerId,
        category: QuotaCategory,
        foreground: bool,
    ) -> RateLimitResult<()> {
        self.try_acquire(caller, category, foreground, DEFAULT_API_CALL_COST)
    }

    /// Current level of one bucket without spending from it
    pub fn available_quota(&self, caller: CallerId, bucket: QuotaBucket) -> RateLimitResult<f64> {
        let quotas = self.state.caller_quotas(caller);
        let quotas = quotas
            .lock()
            .map_err(|e| RateLimitError::Lock(format!("Failed to acquire quota lock: {}", e)))?;
        Ok(self.available(bucket, quotas.get(&bucket), self.clock.now_millis()))
    }

    pub fn check_max_chunk_memory_usage(&self, bytes: u64) -> RateLimitResult<()> {
        let limit = self.config.chunk_size_limit_in_bytes;
        if bytes > limit {
            tracing::warn!(limit, actual = bytes, "Records chunk size exceeded");
            return Err(RateLimitError::ChunkSizeExceeded {
                limit,
                actual: bytes,
            });
        }
        Ok(())
    }

    pub fn check_max_record_memory_usage(&self, bytes: u64) -> RateLimitResult<()> {
        let limit = self.config.record_size_limit_in_bytes;
        if bytes > limit {
            tracing::warn!(limit, actual = bytes, "Record size exceeded");
            return Err(RateLimitError::RecordSizeExceeded {
                limit,
                actual: bytes,
            });
        }
        Ok(())
    }

    pub fn clear(&self) -> RateLimitResult<()> {
        self.state.clear()
    }

    fn available(&self, bucket: QuotaBucket, quota: Option<&Quota>, now: i64) -> f64 {
        let max = self.max_quota(bucket);
        match quota {
            None => max,
            Some(quota) => {
                let elapsed = (now - quota.last_updated).max(0) as f64;
                let refill = elapsed * max / bucket.window_millis() as f64;
                (quota.remaining + refill).min(max)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;

    const CALLER: CallerId = 10_001;

    fn limiter_with(config: RateLimiterConfig) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let limiter = RateLimiter::with_clock(
            Arc::new(RateLimiterState::new()),
            config,
            clock.clone(),
        );
        (limiter, clock)
    }

    fn limiter() -> (RateLimiter, Arc<ManualClock>) {
        limiter_with(RateLimiterConfig::default())
    }

    #[test]
    fn test_bucket_codes() {
        for bucket in QuotaBucket::all() {
            assert_eq!(QuotaBucket::from_code(bucket.code()), Some(*bucket));
        }
        assert_eq!(QuotaBucket::from_code(0), None);
        assert_eq!(QuotaCategory::from_code(3), Some(QuotaCategory::Write));
        assert_eq!(QuotaCategory::from_code(4), None);
    }

    #[test]
    fn test_first_use_starts_at_max() {
        let (limiter, _) = limiter();
        for bucket in QuotaBucket::all() {
            assert_eq!(
                limiter.available_quota(CALLER, *bucket).unwrap(),
                limiter.max_quota(*bucket)
            );
        }
        assert_eq!(limiter.max_quota(QuotaBucket::WritesPer24hBackground), 600.0);
    }

    #[test]
    fn test_spend_and_replenish_to_max() {
        let (limiter, clock) = limiter();
        limiter
            .try_acquire(CALLER, QuotaCategory::Read, true, 1000)
            .unwrap();
        assert_eq!(
            limiter
                .available_quota(CALLER, QuotaBucket::ReadsPer15mForeground)
                .unwrap(),
            0.0
        );
        assert_eq!(
            limiter
                .available_quota(CALLER, QuotaBucket::ReadsPer24hForeground)
                .unwrap(),
            1000.0
        );

        clock.advance(WINDOW_15M_MILLIS);
        assert_eq!(
            limiter
                .available_quota(CALLER, QuotaBucket::ReadsPer15mForeground)
                .unwrap(),
            1000.0
        );
    }

    #[test]
    fn test_quota_never_exceeds_max() {
        let (limiter, clock) = limiter();
        limiter
            .try_acquire(CALLER, QuotaCategory::Write, false, 100)
            .unwrap();
        clock.advance(2 * WINDOW_24H_MILLIS);
        for bucket in [
            QuotaBucket::WritesPer15mBackground,
            QuotaBucket::WritesPer24hBackground,
        ] {
            assert_eq!(
                limiter.available_quota(CALLER, bucket).unwrap(),
                limiter.max_quota(bucket)
            );
        }
    }

    #[test]
    fn test_partial_replenishment() {
        let (limiter, clock) = limiter();
        limiter
            .try_acquire(CALLER, QuotaCategory::Write, false, 300)
            .unwrap();
        clock.advance(WINDOW_15M_MILLIS / 3);
        let available = limiter
            .available_quota(CALLER, QuotaBucket::WritesPer15mBackground)
            .unwrap();
        assert!((available - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_multi_bucket_spend_is_atomic() {
        let (limiter, clock) = limiter();
        limiter
            .try_acquire(CALLER, QuotaCategory::Read, true, 1000)
            .unwrap();
        clock.advance(WINDOW_15M_MILLIS);
        limiter
            .try_acquire(CALLER, QuotaCategory::Read, true, 1000)
            .unwrap();
        clock.advance(WINDOW_15M_MILLIS);

        // 15m bucket is full again, the daily bucket holds about 41
        let err = limiter
            .try_acquire(CALLER, QuotaCategory::Read, true, 500)
            .unwrap_err();
        match err {
            RateLimitError::QuotaExceeded {
                bucket,
                requested,
                available,
            } => {
                assert_eq!(bucket, QuotaBucket::ReadsPer24hForeground);
                assert_eq!(requested, 500.0);
                assert!(available < 50.0);
            }
            other => panic!("unexpected error: {:?}", other),
        }

        assert_eq!(
            limiter
                .available_quota(CALLER, QuotaBucket::ReadsPer15mForeground)
                .unwrap(),
            1000.0
        );
    }

    #[test]
    fn test_categories_are_independent() {
        let (limiter, _) = limiter();
        limiter
            .try_acquire(CALLER, QuotaCategory::Write, false, 300)
            .unwrap();
        assert!(limiter
            .try_acquire_api_call(CALLER, QuotaCategory::Write, false)
            .unwrap_err()
            .is_quota_exceeded());

        limiter
            .try_acquire_api_call(CALLER, QuotaCategory::Write, true)
            .unwrap();
        limiter
            .try_acquire_api_call(CALLER, QuotaCategory::Read, false)
            .unwrap();
        limiter
            .try_acquire_api_call(CALLER + 1, QuotaCategory::Write, false)
            .unwrap();
    }

    #[test]
    fn test_undefined_and_unmetered() {
        let (limiter, _) = limiter();
        assert_eq!(
            limiter.try_acquire_api_call(CALLER, QuotaCategory::Undefined, true),
            Err(RateLimitError::UndefinedCategory)
        );
        for _ in 0..5_000 {
            limiter
                .try_acquire_api_call(CALLER, QuotaCategory::Unmetered, false)
                .unwrap();
        }
        assert_eq!(limiter.state().caller_count(), 0);
    }

    #[test]
    fn test_disabled_limiter_skips_quotas() {
        let (limiter, _) = limiter_with(RateLimiterConfig {
            enabled: false,
            ..RateLimiterConfig::default()
        });
        for _ in 0..1_000 {
            limiter
                .try_acquire_api_call(CALLER, QuotaCategory::Write, false)
                .unwrap();
        }
        assert!(limiter.check_max_record_memory_usage(1_000_001).is_err());
    }

    #[test]
    fn test_memory_ceilings() {
        let (limiter, _) = limiter();
        assert!(limiter.check_max_chunk_memory_usage(5_000_000).is_ok());
        assert_eq!(
            limiter.check_max_chunk_memory_usage(5_000_001),
            Err(RateLimitError::ChunkSizeExceeded {
                limit: 5_000_000,
                actual: 5_000_001
            })
        );

        assert!(limiter.check_max_record_memory_usage(1_000_000).is_ok());
        assert_eq!(
            limiter.check_max_record_memory_usage(1_000_001),
            Err(RateLimitError::RecordSizeExceeded {
                limit: 1_000_000,
                actual: 1_000_001
            })
        );
    }

    #[test]
    fn test_clear_restores_full_quota() {
        let (limiter, _) = limiter();
        limiter
            .try_acquire(CALLER, QuotaCategory::Write, true, 1000)
            .unwrap();
        limiter.clear().unwrap();
        assert_eq!(
            limiter
                .available_quota(CALLER, QuotaBucket::WritesPer15mForeground)
                .unwrap(),
            1000.0
        );
    }

    #[test]
    fn test_concurrent_spend_never_overdraws() {
        let (limiter, _) = limiter();
        let limiter = Arc::new(limiter);

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|_| {
                            limiter
                                .try_acquire_api_call(CALLER, QuotaCategory::Write, false)
                                .is_ok()
                        })
                        .count()
                })
            })
            .collect();

        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 300);
    }
}
