//! Time types shared by records and aggregation
//!
//! - `TimeRange`: half-open query window in epoch milliseconds
//! - `ZoneOffset`: UTC offset of the user when a measurement was taken
//! - `RecordTime`: instant or interval placement of a record

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

/// Largest offset accepted, matching the ±18:00 bound of ISO-8601 offsets
const MAX_OFFSET_SECONDS: i32 = 18 * 3600;

/// Time range for queries (half-open interval: [start, end))
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start timestamp (inclusive), in milliseconds
    pub start: i64,
    /// End timestamp (exclusive), in milliseconds
    pub end: i64,
}

impl TimeRange {
    /// Create a time range, returning None if start >= end
    pub fn try_new(start: i64, end: i64) -> Option<Self> {
        if start < end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    /// Create a range for the last N hours from now
    pub fn last_hours(hours: i64) -> Self {
        let end = Utc::now().timestamp_millis();
        let start = end - (hours * 3600 * 1000);
        Self { start, end }
    }

    /// Create a range for the last N days from now
    pub fn last_days(days: i64) -> Self {
        Self::last_hours(days * 24)
    }

    /// Check if a timestamp falls within this range
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    /// Get the duration in milliseconds
    pub fn duration_millis(&self) -> i64 {
        self.end.saturating_sub(self.start)
    }
}

/// Offset from UTC in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ZoneOffset(i32);

impl ZoneOffset {
    pub const UTC: ZoneOffset = ZoneOffset(0);

    pub fn from_seconds(seconds: i32) -> Option<Self> {
        if seconds.abs() <= MAX_OFFSET_SECONDS {
            Some(Self(seconds))
        } else {
            None
        }
    }

    pub fn from_hours(hours: i32) -> Option<Self> {
        Self::from_seconds(hours.checked_mul(3600)?)
    }

    pub fn seconds(&self) -> i32 {
        self.0
    }

    pub fn to_fixed_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.0).unwrap_or_else(|| Utc.fix())
    }
}

impl From<FixedOffset> for ZoneOffset {
    fn from(offset: FixedOffset) -> Self {
        Self(offset.local_minus_utc())
    }
}

impl std::fmt::Display for ZoneOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_fixed_offset())
    }
}

/// Where a record sits on the time line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RecordTime {
    /// Single point-in-time measurement
    Instant { time: i64, zone_offset: ZoneOffset },
    /// Measurement over [start_time, end_time]
    Interval {
        start_time: i64,
        start_zone_offset: ZoneOffset,
        end_time: i64,
        end_zone_offset: ZoneOffset,
    },
}

impl RecordTime {
    pub fn instant(time: i64, zone_offset: ZoneOffset) -> Self {
        RecordTime::Instant { time, zone_offset }
    }

    /// Interval with the same offset at both ends
    pub fn interval(start_time: i64, end_time: i64, zone_offset: ZoneOffset) -> Self {
        RecordTime::Interval {
            start_time,
            start_zone_offset: zone_offset,
            end_time,
            end_zone_offset: zone_offset,
        }
    }

    pub fn is_interval(&self) -> bool {
        matches!(self, RecordTime::Interval { .. })
    }

    pub fn start_time(&self) -> i64 {
        match self {
            RecordTime::Instant { time, .. } => *time,
            RecordTime::Interval { start_time, .. } => *start_time,
        }
    }

    pub fn end_time(&self) -> i64 {
        match self {
            RecordTime::Instant { time, .. } => *time,
            RecordTime::Interval { end_time, .. } => *end_time,
        }
    }

    /// Offset at the start of the record
    pub fn zone_offset(&self) -> ZoneOffset {
        match self {
            RecordTime::Instant { zone_offset, .. } => *zone_offset,
            RecordTime::Interval {
                start_zone_offset, ..
            } => *start_zone_offset,
        }
    }

    /// Check if this record's span overlaps a query range
    ///
    /// Interval records match when `start < range.end && end >= range.start`.
    pub fn overlaps(&self, range: &TimeRange) -> bool {
        match self {
            RecordTime::Instant { time, .. } => range.contains(*time),
            RecordTime::Interval {
                start_time,
                end_time,
                ..
            } => *start_time < range.end && *end_time >= range.start,
        }
    }
}
