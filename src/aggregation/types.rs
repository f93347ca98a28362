//! Aggregation catalogue and result values

use crate::records::{RecordType, ZoneOffset};
use serde::{Deserialize, Serialize};

/// How the values of matching rows are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateOperation {
    Sum,
    Avg,
    Min,
    Max,
    Count,
    /// Computed by a record-type formula over raw rows
    Derived,
}

impl AggregateOperation {
    /// SQL aggregate function, `None` for derived aggregates
    pub fn sql_function(&self) -> Option<&'static str> {
        match self {
            AggregateOperation::Sum => Some("SUM"),
            AggregateOperation::Avg => Some("AVG"),
            AggregateOperation::Min => Some("MIN"),
            AggregateOperation::Max => Some("MAX"),
            AggregateOperation::Count => Some("COUNT"),
            AggregateOperation::Derived => None,
        }
    }
}

/// Numeric shape of an aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Long,
    Double,
}

/// Every aggregate the store can answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregationType {
    StepsCountTotal,
    DistanceTotal,
    ActiveCaloriesTotal,
    EnergyTotal,
    FloorsClimbedTotal,
    WheelChairPushesCountTotal,
    RestingHeartRateBpmMin,
    RestingHeartRateBpmMax,
    RestingHeartRateBpmAvg,
    RestingHeartRateMeasurementsCount,
    WeightMin,
    WeightMax,
    WeightAvg,
    BasalCaloriesTotal,
    /// Basal calories plus priority-resolved active calories
    CaloriesBurnedTotal,
}

impl AggregationType {
    pub fn all() -> &'static [AggregationType] {
        &[
            AggregationType::StepsCountTotal,
            AggregationType::DistanceTotal,
            AggregationType::ActiveCaloriesTotal,
            AggregationType::EnergyTotal,
            AggregationType::FloorsClimbedTotal,
            AggregationType::WheelChairPushesCountTotal,
            AggregationType::RestingHeartRateBpmMin,
            AggregationType::RestingHeartRateBpmMax,
            AggregationType::RestingHeartRateBpmAvg,
            AggregationType::RestingHeartRateMeasurementsCount,
            AggregationType::WeightMin,
            AggregationType::WeightMax,
            AggregationType::WeightAvg,
            AggregationType::BasalCaloriesTotal,
            AggregationType::CaloriesBurnedTotal,
        ]
    }

    /// Record type whose table the aggregate reads
    pub fn record_type(&self) -> RecordType {
        match self {
            AggregationType::StepsCountTotal => RecordType::Steps,
            AggregationType::DistanceTotal => RecordType::Distance,
            AggregationType::ActiveCaloriesTotal => RecordType::ActiveCaloriesBurned,
            AggregationType::EnergyTotal => RecordType::TotalCaloriesBurned,
            AggregationType::FloorsClimbedTotal => RecordType::FloorsClimbed,
            AggregationType::WheelChairPushesCountTotal => RecordType::WheelchairPushes,
            AggregationType::RestingHeartRateBpmMin
            | AggregationType::RestingHeartRateBpmMax
            | AggregationType::RestingHeartRateBpmAvg
            | AggregationType::RestingHeartRateMeasurementsCount => RecordType::RestingHeartRate,
            AggregationType::WeightMin | AggregationType::WeightMax | AggregationType::WeightAvg => {
                RecordType::Weight
            }
            AggregationType::BasalCaloriesTotal | AggregationType::CaloriesBurnedTotal => {
                RecordType::BasalMetabolicRate
            }
        }
    }

    pub fn operation(&self) -> AggregateOperation {
        match self {
            AggregationType::StepsCountTotal
            | AggregationType::DistanceTotal
            | AggregationType::ActiveCaloriesTotal
            | AggregationType::EnergyTotal
            | AggregationType::FloorsClimbedTotal
            | AggregationType::WheelChairPushesCountTotal => AggregateOperation::Sum,
            AggregationType::RestingHeartRateBpmMin | AggregationType::WeightMin => {
                AggregateOperation::Min
            }
            AggregationType::RestingHeartRateBpmMax | AggregationType::WeightMax => {
                AggregateOperation::Max
            }
            AggregationType::RestingHeartRateBpmAvg | AggregationType::WeightAvg => {
                AggregateOperation::Avg
            }
            AggregationType::RestingHeartRateMeasurementsCount => AggregateOperation::Count,
            AggregationType::BasalCaloriesTotal | AggregationType::CaloriesBurnedTotal => {
                AggregateOperation::Derived
            }
        }
    }

    pub fn result_kind(&self) -> ResultKind {
        match self {
            AggregationType::StepsCountTotal
            | AggregationType::WheelChairPushesCountTotal
            | AggregationType::RestingHeartRateBpmMin
            | AggregationType::RestingHeartRateBpmMax
            | AggregationType::RestingHeartRateBpmAvg
            | AggregationType::RestingHeartRateMeasurementsCount => ResultKind::Long,
            _ => ResultKind::Double,
        }
    }

    /// Upper-case name, e.g. `STEPS_COUNT_TOTAL`
    pub fn name(&self) -> &'static str {
        match self {
            AggregationType::StepsCountTotal => "STEPS_COUNT_TOTAL",
            AggregationType::DistanceTotal => "DISTANCE_TOTAL",
            AggregationType::ActiveCaloriesTotal => "ACTIVE_CALORIES_TOTAL",
            AggregationType::EnergyTotal => "ENERGY_TOTAL",
            AggregationType::FloorsClimbedTotal => "FLOORS_CLIMBED_TOTAL",
            AggregationType::WheelChairPushesCountTotal => "WHEEL_CHAIR_PUSHES_COUNT_TOTAL",
            AggregationType::RestingHeartRateBpmMin => "RESTING_HEART_RATE_BPM_MIN",
            AggregationType::RestingHeartRateBpmMax => "RESTING_HEART_RATE_BPM_MAX",
            AggregationType::RestingHeartRateBpmAvg => "RESTING_HEART_RATE_BPM_AVG",
            AggregationType::RestingHeartRateMeasurementsCount => {
                "RESTING_HEART_RATE_MEASUREMENTS_COUNT"
            }
            AggregationType::WeightMin => "WEIGHT_MIN",
            AggregationType::WeightMax => "WEIGHT_MAX",
            AggregationType::WeightAvg => "WEIGHT_AVG",
            AggregationType::BasalCaloriesTotal => "BASAL_CALORIES_TOTAL",
            AggregationType::CaloriesBurnedTotal => "CALORIES_BURNED_TOTAL",
        }
    }

    /// Aggregation whose per-group values a derived formula adds to its own
    pub fn added_aggregation(&self) -> Option<AggregationType> {
        match self {
            AggregationType::CaloriesBurnedTotal => Some(AggregationType::ActiveCaloriesTotal),
            _ => None,
        }
    }

    /// Parse a name case-insensitively, accepting `-` for `_`
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_uppercase().replace('-', "_");
        Self::all().iter().copied().find(|a| a.name() == name)
    }
}

impl std::fmt::Display for AggregationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A computed aggregate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AggregateValue {
    Long(i64),
    Double(f64),
}

impl AggregateValue {
    /// Shape a raw number by result kind; longs are truncated toward zero
    pub fn from_f64(kind: ResultKind, value: f64) -> Self {
        match kind {
            ResultKind::Long => AggregateValue::Long(value.trunc() as i64),
            ResultKind::Double => AggregateValue::Double(value),
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            AggregateValue::Long(v) => *v as f64,
            AggregateValue::Double(v) => *v,
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            AggregateValue::Long(v) => *v,
            AggregateValue::Double(v) => v.trunc() as i64,
        }
    }
}

impl std::fmt::Display for AggregateValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregateValue::Long(v) => write!(f, "{}", v),
            AggregateValue::Double(v) => write!(f, "{:.2}", v),
        }
    }
}

/// Result for one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub value: AggregateValue,
    pub zone_offset: Option<ZoneOffset>,
    /// Package names of the origins that had data in the queried range
    pub data_origins: Vec<String>,
}

impl AggregateResult {
    pub fn new(value: AggregateValue, zone_offset: Option<ZoneOffset>) -> Self {
        Self {
            value,
            zone_offset,
            data_origins: Vec::new(),
        }
    }
}

/// Columns the priority resolver reads from raw rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityAggregationParams {
    pub value_column: &'static str,
    pub start_time_column: &'static str,
    pub end_time_column: &'static str,
}

/// Query shape for one aggregation over one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateParams {
    pub table_name: &'static str,
    pub columns_to_aggregate: Vec<&'static str>,
    /// `time` for instant records, `start_time` for interval records
    pub time_column: &'static str,
    pub end_time_column: Option<&'static str>,
    pub zone_offset_column: &'static str,
    pub priority: Option<PriorityAggregationParams>,
}

/// Read-only view of a request handed to derived aggregate formulas
#[derive(Debug, Clone, Copy)]
pub struct AggregationContext<'a> {
    pub time_column: &'a str,
    pub zone_offset_column: &'a str,
    /// Group boundaries: `group_splits[k]..group_splits[k + 1]` is group `k`
    pub group_splits: &'a [i64],
    /// Per-group values of [`AggregationType::added_aggregation`], empty when unused
    pub added_values: &'a [f64],
}

impl<'a> AggregationContext<'a> {
    pub fn group_count(&self) -> usize {
        self.group_splits.len().saturating_sub(1)
    }

    /// Added value for group `k`, zero when absent
    pub fn added_value(&self, group: usize) -> f64 {
        self.added_values.get(group).copied().unwrap_or(0.0)
    }
}
