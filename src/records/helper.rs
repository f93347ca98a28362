//! Per-record-type storage schemas
//!
//! Every record type owns one table. The columns, supported aggregates and
//! priority capability of each type live in a static [`RecordCapabilities`]
//! entry; [`capabilities`] is the single exhaustive dispatch point from a
//! [`RecordType`] to its entry. [`RecordHelper`] wraps an entry and turns
//! records into rows, rows into records, and aggregation requests into query
//! parameters.

use crate::aggregation::{
    AggregateOperation, AggregateParams, AggregateResult, AggregateValue, AggregationContext,
    AggregationType, PriorityAggregationParams,
};
use crate::records::data::{
    BodyTemperatureLocation, HeartRateSample, MealType, RecordData, RelationToMeal,
    SpecimenSource,
};
use crate::records::record::{Device, DeviceType, Metadata, Record, RecordType};
use crate::records::time::{RecordTime, ZoneOffset};
use crate::storage::{Row, StorageError, StorageResult};

pub const ROW_ID_COLUMN: &str = "row_id";
pub const UUID_COLUMN: &str = "uuid";
pub const APP_INFO_ID_COLUMN: &str = "app_info_id";
pub const LAST_MODIFIED_TIME_COLUMN: &str = "last_modified_time";
pub const CLIENT_RECORD_ID_COLUMN: &str = "client_record_id";
pub const CLIENT_RECORD_VERSION_COLUMN: &str = "client_record_version";
pub const MANUFACTURER_COLUMN: &str = "manufacturer";
pub const MODEL_COLUMN: &str = "model";
pub const DEVICE_TYPE_COLUMN: &str = "device_type";
pub const TIME_COLUMN: &str = "time";
pub const ZONE_OFFSET_COLUMN: &str = "zone_offset";
pub const START_TIME_COLUMN: &str = "start_time";
pub const START_ZONE_OFFSET_COLUMN: &str = "start_zone_offset";
pub const END_TIME_COLUMN: &str = "end_time";
pub const END_ZONE_OFFSET_COLUMN: &str = "end_zone_offset";
/// Joined from `app_info` when reading records back
pub const PACKAGE_NAME_COLUMN: &str = "package_name";

const COUNT_COLUMN: &str = "count";
const SAMPLES_COLUMN: &str = "samples";
const BASAL_METABOLIC_RATE_COLUMN: &str = "basal_metabolic_rate";
const DISTANCE_COLUMN: &str = "distance";
const ENERGY_COLUMN: &str = "energy";
const FLOORS_COLUMN: &str = "floors";
const LEVEL_COLUMN: &str = "level";
const SPECIMEN_SOURCE_COLUMN: &str = "specimen_source";
const MEAL_TYPE_COLUMN: &str = "meal_type";
const RELATION_TO_MEAL_COLUMN: &str = "relation_to_meal";
const MEASUREMENT_LOCATION_COLUMN: &str = "measurement_location";
const TEMPERATURE_COLUMN: &str = "temperature";
const BEATS_PER_MINUTE_COLUMN: &str = "beats_per_minute";
const WEIGHT_COLUMN: &str = "weight";

/// Joules in one calorie
const JOULES_PER_CALORIE: f64 = 4.184;

/// SQLite storage class of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Real,
    Text,
    Blob,
}

impl SqlType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Text => "TEXT",
            SqlType::Blob => "BLOB",
        }
    }
}

/// A type-specific column declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: &'static str,
    pub sql_type: SqlType,
}

impl ColumnInfo {
    pub const fn new(name: &'static str, sql_type: SqlType) -> Self {
        Self { name, sql_type }
    }
}

/// Static description of what one record type stores and can aggregate
#[derive(Debug)]
pub struct RecordCapabilities {
    pub record_type: RecordType,
    pub table_name: &'static str,
    /// Type-specific columns, after the common ones
    pub columns: &'static [ColumnInfo],
    /// Supported aggregations and the column each one reads
    pub aggregations: &'static [(AggregationType, &'static str)],
    /// SUM aggregates are reconciled across origins by priority
    pub priority_sum: bool,
}

static STEPS: RecordCapabilities = RecordCapabilities {
    record_type: RecordType::Steps,
    table_name: "steps_record_table",
    columns: &[ColumnInfo::new(COUNT_COLUMN, SqlType::Integer)],
    aggregations: &[(AggregationType::StepsCountTotal, COUNT_COLUMN)],
    priority_sum: true,
};

static HEART_RATE: RecordCapabilities = RecordCapabilities {
    record_type: RecordType::HeartRate,
    table_name: "heart_rate_record_table",
    columns: &[ColumnInfo::new(SAMPLES_COLUMN, SqlType::Blob)],
    aggregations: &[],
    priority_sum: false,
};

static BASAL_METABOLIC_RATE: RecordCapabilities = RecordCapabilities {
    record_type: RecordType::BasalMetabolicRate,
    table_name: "basal_metabolic_rate_record_table",
    columns: &[ColumnInfo::new(BASAL_METABOLIC_RATE_COLUMN, SqlType::Real)],
    aggregations: &[
        (
            AggregationType::BasalCaloriesTotal,
            BASAL_METABOLIC_RATE_COLUMN,
        ),
        (
            AggregationType::CaloriesBurnedTotal,
            BASAL_METABOLIC_RATE_COLUMN,
        ),
    ],
    priority_sum: false,
};

static DISTANCE: RecordCapabilities = RecordCapabilities {
    record_type: RecordType::Distance,
    table_name: "distance_record_table",
    columns: &[ColumnInfo::new(DISTANCE_COLUMN, SqlType::Real)],
    aggregations: &[(AggregationType::DistanceTotal, DISTANCE_COLUMN)],
    priority_sum: true,
};

static WHEELCHAIR_PUSHES: RecordCapabilities = RecordCapabilities {
    record_type: RecordType::WheelchairPushes,
    table_name: "wheelchair_pushes_record_table",
    columns: &[ColumnInfo::new(COUNT_COLUMN, SqlType::Integer)],
    aggregations: &[(AggregationType::WheelChairPushesCountTotal, COUNT_COLUMN)],
    priority_sum: false,
};

static TOTAL_CALORIES_BURNED: RecordCapabilities = RecordCapabilities {
    record_type: RecordType::TotalCaloriesBurned,
    table_name: "total_calories_burned_record_table",
    columns: &[ColumnInfo::new(ENERGY_COLUMN, SqlType::Real)],
    aggregations: &[(AggregationType::EnergyTotal, ENERGY_COLUMN)],
    priority_sum: true,
};

static FLOORS_CLIMBED: RecordCapabilities = RecordCapabilities {
    record_type: RecordType::FloorsClimbed,
    table_name: "floors_climbed_record_table",
    columns: &[ColumnInfo::new(FLOORS_COLUMN, SqlType::Real)],
    aggregations: &[(AggregationType::FloorsClimbedTotal, FLOORS_COLUMN)],
    priority_sum: true,
};

static ACTIVE_CALORIES_BURNED: RecordCapabilities = RecordCapabilities {
    record_type: RecordType::ActiveCaloriesBurned,
    table_name: "active_calories_burned_record_table",
    columns: &[ColumnInfo::new(ENERGY_COLUMN, SqlType::Real)],
    aggregations: &[(AggregationType::ActiveCaloriesTotal, ENERGY_COLUMN)],
    priority_sum: true,
};

static BLOOD_GLUCOSE: RecordCapabilities = RecordCapabilities {
    record_type: RecordType::BloodGlucose,
    table_name: "blood_glucose_record_table",
    columns: &[
        ColumnInfo::new(LEVEL_COLUMN, SqlType::Real),
        ColumnInfo::new(SPECIMEN_SOURCE_COLUMN, SqlType::Integer),
        ColumnInfo::new(MEAL_TYPE_COLUMN, SqlType::Integer),
        ColumnInfo::new(RELATION_TO_MEAL_COLUMN, SqlType::Integer),
    ],
    aggregations: &[],
    priority_sum: false,
};

static BODY_TEMPERATURE: RecordCapabilities = RecordCapabilities {
    record_type: RecordType::BodyTemperature,
    table_name: "body_temperature_record_table",
    columns: &[
        ColumnInfo::new(MEASUREMENT_LOCATION_COLUMN, SqlType::Integer),
        ColumnInfo::new(TEMPERATURE_COLUMN, SqlType::Real),
    ],
    aggregations: &[],
    priority_sum: false,
};

static RESTING_HEART_RATE: RecordCapabilities = RecordCapabilities {
    record_type: RecordType::RestingHeartRate,
    table_name: "resting_heart_rate_record_table",
    columns: &[ColumnInfo::new(BEATS_PER_MINUTE_COLUMN, SqlType::Integer)],
    aggregations: &[
        (AggregationType::RestingHeartRateBpmMin, BEATS_PER_MINUTE_COLUMN),
        (AggregationType::RestingHeartRateBpmMax, BEATS_PER_MINUTE_COLUMN),
        (AggregationType::RestingHeartRateBpmAvg, BEATS_PER_MINUTE_COLUMN),
        (
            AggregationType::RestingHeartRateMeasurementsCount,
            BEATS_PER_MINUTE_COLUMN,
        ),
    ],
    priority_sum: false,
};

static WEIGHT: RecordCapabilities = RecordCapabilities {
    record_type: RecordType::Weight,
    table_name: "weight_record_table",
    columns: &[ColumnInfo::new(WEIGHT_COLUMN, SqlType::Real)],
    aggregations: &[
        (AggregationType::WeightMin, WEIGHT_COLUMN),
        (AggregationType::WeightMax, WEIGHT_COLUMN),
        (AggregationType::WeightAvg, WEIGHT_COLUMN),
    ],
    priority_sum: false,
};

/// Capability entry for a record type
pub fn capabilities(record_type: RecordType) -> &'static RecordCapabilities {
    match record_type {
        RecordType::Steps => &STEPS,
        RecordType::HeartRate => &HEART_RATE,
        RecordType::BasalMetabolicRate => &BASAL_METABOLIC_RATE,
        RecordType::Distance => &DISTANCE,
        RecordType::WheelchairPushes => &WHEELCHAIR_PUSHES,
        RecordType::TotalCaloriesBurned => &TOTAL_CALORIES_BURNED,
        RecordType::FloorsClimbed => &FLOORS_CLIMBED,
        RecordType::ActiveCaloriesBurned => &ACTIVE_CALORIES_BURNED,
        RecordType::BloodGlucose => &BLOOD_GLUCOSE,
        RecordType::BodyTemperature => &BODY_TEMPERATURE,
        RecordType::RestingHeartRate => &RESTING_HEART_RATE,
        RecordType::Weight => &WEIGHT,
    }
}

/// Schema operations for one record type
#[derive(Debug, Clone, Copy)]
pub struct RecordHelper {
    caps: &'static RecordCapabilities,
}

impl RecordHelper {
    pub fn for_type(record_type: RecordType) -> Self {
        Self {
            caps: capabilities(record_type),
        }
    }

    pub fn record_type(&self) -> RecordType {
        self.caps.record_type
    }

    pub fn table_name(&self) -> &'static str {
        self.caps.table_name
    }

    pub fn capabilities(&self) -> &'static RecordCapabilities {
        self.caps
    }

    fn is_interval(&self) -> bool {
        self.caps.record_type.is_interval()
    }

    /// Column used for time ordering and filtering
    pub fn time_column(&self) -> &'static str {
        if self.is_interval() {
            START_TIME_COLUMN
        } else {
            TIME_COLUMN
        }
    }

    /// End column of interval records
    pub fn end_time_column(&self) -> Option<&'static str> {
        self.is_interval().then_some(END_TIME_COLUMN)
    }

    pub fn zone_offset_column(&self) -> &'static str {
        if self.is_interval() {
            START_ZONE_OFFSET_COLUMN
        } else {
            ZONE_OFFSET_COLUMN
        }
    }

    /// Common columns with their declarations, in table order
    fn common_column_definitions(&self) -> Vec<(&'static str, &'static str)> {
        let mut columns = vec![
            (ROW_ID_COLUMN, "INTEGER PRIMARY KEY AUTOINCREMENT"),
            (UUID_COLUMN, "TEXT NOT NULL UNIQUE"),
            (
                APP_INFO_ID_COLUMN,
                "INTEGER NOT NULL REFERENCES app_info(row_id)",
            ),
            (LAST_MODIFIED_TIME_COLUMN, "INTEGER NOT NULL"),
            (CLIENT_RECORD_ID_COLUMN, "TEXT"),
            (CLIENT_RECORD_VERSION_COLUMN, "INTEGER NOT NULL DEFAULT 0"),
            (MANUFACTURER_COLUMN, "TEXT"),
            (MODEL_COLUMN, "TEXT"),
            (DEVICE_TYPE_COLUMN, "INTEGER NOT NULL DEFAULT 0"),
        ];
        if self.is_interval() {
            columns.extend([
                (START_TIME_COLUMN, "INTEGER NOT NULL"),
                (START_ZONE_OFFSET_COLUMN, "INTEGER NOT NULL"),
                (END_TIME_COLUMN, "INTEGER NOT NULL"),
                (END_ZONE_OFFSET_COLUMN, "INTEGER NOT NULL"),
            ]);
        } else {
            columns.extend([
                (TIME_COLUMN, "INTEGER NOT NULL"),
                (ZONE_OFFSET_COLUMN, "INTEGER NOT NULL"),
            ]);
        }
        columns
    }

    /// Every column name written by [`RecordHelper::serialize`], minus `row_id`
    pub fn column_names(&self) -> Vec<&'static str> {
        self.common_column_definitions()
            .into_iter()
            .map(|(name, _)| name)
            .filter(|name| *name != ROW_ID_COLUMN)
            .chain(self.caps.columns.iter().map(|c| c.name))
            .collect()
    }

    pub fn create_table_sql(&self) -> String {
        let definitions: Vec<String> = self
            .common_column_definitions()
            .into_iter()
            .map(|(name, decl)| format!("{} {}", name, decl))
            .chain(
                self.caps
                    .columns
                    .iter()
                    .map(|c| format!("{} {}", c.name, c.sql_type.as_sql())),
            )
            .collect();

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.table_name(),
            definitions.join(", ")
        )
    }

    /// Index on the time column used by range filters
    pub fn create_index_sql(&self) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_{} ON {}({})",
            self.table_name(),
            self.time_column(),
            self.table_name(),
            self.time_column()
        )
    }

    /// Convert a record into column values for its table
    pub fn serialize(&self, record: &Record, app_info_id: i64) -> StorageResult<Row> {
        if record.record_type() != self.record_type() {
            return Err(StorageError::InvalidRecord(format!(
                "{} cannot be stored in {}",
                record.record_type(),
                self.table_name()
            )));
        }

        let metadata = record.metadata();
        let mut row = Row::new()
            .with(UUID_COLUMN, metadata.id.clone())
            .with(APP_INFO_ID_COLUMN, app_info_id)
            .with(LAST_MODIFIED_TIME_COLUMN, metadata.last_modified_time)
            .with(CLIENT_RECORD_ID_COLUMN, metadata.client_record_id.clone())
            .with(CLIENT_RECORD_VERSION_COLUMN, metadata.client_record_version)
            .with(MANUFACTURER_COLUMN, metadata.device.manufacturer.clone())
            .with(MODEL_COLUMN, metadata.device.model.clone())
            .with(DEVICE_TYPE_COLUMN, metadata.device.device_type.code());

        match *record.time() {
            RecordTime::Instant { time, zone_offset } => {
                row.push(TIME_COLUMN, time);
                row.push(ZONE_OFFSET_COLUMN, zone_offset.seconds());
            }
            RecordTime::Interval {
                start_time,
                start_zone_offset,
                end_time,
                end_zone_offset,
            } => {
                row.push(START_TIME_COLUMN, start_time);
                row.push(START_ZONE_OFFSET_COLUMN, start_zone_offset.seconds());
                row.push(END_TIME_COLUMN, end_time);
                row.push(END_ZONE_OFFSET_COLUMN, end_zone_offset.seconds());
            }
        }

        write_payload(record.data(), &mut row)?;
        Ok(row)
    }

    /// Rebuild a record from a table row joined with its package name
    pub fn deserialize(&self, row: &Row) -> StorageResult<Record> {
        let metadata = Metadata {
            id: row.get_opt_string(UUID_COLUMN)?,
            data_origin: row.get_string(PACKAGE_NAME_COLUMN)?,
            last_modified_time: row.get_i64(LAST_MODIFIED_TIME_COLUMN)?,
            client_record_id: row.get_opt_string(CLIENT_RECORD_ID_COLUMN)?,
            client_record_version: row.get_i64(CLIENT_RECORD_VERSION_COLUMN)?,
            device: Device {
                manufacturer: row.get_opt_string(MANUFACTURER_COLUMN)?,
                model: row.get_opt_string(MODEL_COLUMN)?,
                device_type: DeviceType::from_code(read_code(row, DEVICE_TYPE_COLUMN)?),
            },
        };

        let time = if self.is_interval() {
            RecordTime::Interval {
                start_time: row.get_i64(START_TIME_COLUMN)?,
                start_zone_offset: read_zone_offset(row, START_ZONE_OFFSET_COLUMN)?,
                end_time: row.get_i64(END_TIME_COLUMN)?,
                end_zone_offset: read_zone_offset(row, END_ZONE_OFFSET_COLUMN)?,
            }
        } else {
            RecordTime::Instant {
                time: row.get_i64(TIME_COLUMN)?,
                zone_offset: read_zone_offset(row, ZONE_OFFSET_COLUMN)?,
            }
        };

        let data = read_payload(self.record_type(), row)?;
        Record::new(metadata, time, data)
    }

    /// Column the aggregation reads, if this type supports it
    fn aggregation_column(&self, aggregation: AggregationType) -> Option<&'static str> {
        self.caps
            .aggregations
            .iter()
            .find(|(agg, _)| *agg == aggregation)
            .map(|(_, column)| *column)
    }

    pub fn supports(&self, aggregation: AggregationType) -> bool {
        self.aggregation_column(aggregation).is_some()
    }

    /// Whether overlapping rows must be reconciled by origin priority
    pub fn supports_priority(&self, aggregation: AggregationType) -> bool {
        self.caps.priority_sum
            && aggregation.operation() == AggregateOperation::Sum
            && self.supports(aggregation)
    }

    pub fn is_derived(&self, aggregation: AggregationType) -> bool {
        aggregation.operation() == AggregateOperation::Derived && self.supports(aggregation)
    }

    /// Query shape for an aggregation, `None` when unsupported
    pub fn aggregate_params(&self, aggregation: AggregationType) -> Option<AggregateParams> {
        let column = self.aggregation_column(aggregation)?;
        let priority = self
            .supports_priority(aggregation)
            .then_some(PriorityAggregationParams {
                value_column: column,
                start_time_column: START_TIME_COLUMN,
                end_time_column: END_TIME_COLUMN,
            });

        Some(AggregateParams {
            table_name: self.table_name(),
            columns_to_aggregate: vec![column],
            time_column: self.time_column(),
            end_time_column: self.end_time_column(),
            zone_offset_column: self.zone_offset_column(),
            priority,
        })
    }

    /// Read a pre-aggregated value from one result row
    ///
    /// Returns `None` when the aggregate column is NULL, i.e. no rows matched.
    pub fn compute_aggregate(
        &self,
        row: &Row,
        aggregation: AggregationType,
    ) -> StorageResult<Option<AggregateResult>> {
        let column = match self.aggregation_column(aggregation) {
            Some(column) => column,
            None => return Ok(None),
        };

        let value = match row.get_opt_f64(column)? {
            Some(value) => AggregateValue::from_f64(aggregation.result_kind(), value),
            None => return Ok(None),
        };

        let zone_offset = if row.is_null(self.zone_offset_column()) {
            None
        } else {
            Some(read_zone_offset(row, self.zone_offset_column())?)
        };

        Ok(Some(AggregateResult::new(value, zone_offset)))
    }

    /// Compute a derived aggregate over raw time-ordered rows, one value per
    /// group. `None` when this type has no derived formula for `aggregation`.
    pub fn derive_aggregate(
        &self,
        rows: &[Row],
        context: &AggregationContext<'_>,
        aggregation: AggregationType,
    ) -> StorageResult<Option<Vec<f64>>> {
        if !self.is_derived(aggregation) {
            return Ok(None);
        }

        match (self.record_type(), aggregation) {
            (RecordType::BasalMetabolicRate, AggregationType::BasalCaloriesTotal) => {
                basal_calories(rows, context).map(Some)
            }
            (RecordType::BasalMetabolicRate, AggregationType::CaloriesBurnedTotal) => {
                let mut totals = basal_calories(rows, context)?;
                for (group, total) in totals.iter_mut().enumerate() {
                    *total += context.added_value(group);
                }
                Ok(Some(totals))
            }
            _ => Ok(None),
        }
    }
}

/// Energy burned at rest per group
///
/// Each reading holds from its own time until the next reading, or until the
/// end of the last group.
fn basal_calories(rows: &[Row], context: &AggregationContext<'_>) -> StorageResult<Vec<f64>> {
    let splits = context.group_splits;
    let mut totals = vec![0.0; context.group_count()];
    let range_end = match splits.last() {
        Some(end) => *end,
        None => return Ok(totals),
    };

    let mut readings = Vec::with_capacity(rows.len());
    for row in rows {
        readings.push((
            row.get_i64(context.time_column)?,
            row.get_f64(BASAL_METABOLIC_RATE_COLUMN)?,
        ));
    }

    for (i, (start, watts)) in readings.iter().enumerate() {
        let end = readings
            .get(i + 1)
            .map(|(next, _)| *next)
            .unwrap_or(range_end)
            .min(range_end);

        for (group, total) in totals.iter_mut().enumerate() {
            let overlap_start = (*start).max(splits[group]);
            let overlap_end = end.min(splits[group + 1]);
            if overlap_end > overlap_start {
                let seconds = (overlap_end - overlap_start) as f64 / 1000.0;
                *total += watts * seconds / JOULES_PER_CALORIE;
            }
        }
    }

    Ok(totals)
}

fn write_payload(data: &RecordData, row: &mut Row) -> StorageResult<()> {
    match data {
        RecordData::Steps { count } | RecordData::WheelchairPushes { count } => {
            row.push(COUNT_COLUMN, *count);
        }
        RecordData::HeartRate { samples } => {
            row.push(SAMPLES_COLUMN, serde_json::to_vec(samples)?);
        }
        RecordData::BasalMetabolicRate { watts } => {
            row.push(BASAL_METABOLIC_RATE_COLUMN, *watts);
        }
        RecordData::Distance { meters } => {
            row.push(DISTANCE_COLUMN, *meters);
        }
        RecordData::TotalCaloriesBurned { calories }
        | RecordData::ActiveCaloriesBurned { calories } => {
            row.push(ENERGY_COLUMN, *calories);
        }
        RecordData::FloorsClimbed { floors } => {
            row.push(FLOORS_COLUMN, *floors);
        }
        RecordData::BloodGlucose {
            millimoles_per_liter,
            specimen_source,
            meal_type,
            relation_to_meal,
        } => {
            row.push(LEVEL_COLUMN, *millimoles_per_liter);
            row.push(SPECIMEN_SOURCE_COLUMN, specimen_source.code());
            row.push(MEAL_TYPE_COLUMN, meal_type.code());
            row.push(RELATION_TO_MEAL_COLUMN, relation_to_meal.code());
        }
        RecordData::BodyTemperature {
            celsius,
            measurement_location,
        } => {
            row.push(MEASUREMENT_LOCATION_COLUMN, measurement_location.code());
            row.push(TEMPERATURE_COLUMN, *celsius);
        }
        RecordData::RestingHeartRate { beats_per_minute } => {
            row.push(BEATS_PER_MINUTE_COLUMN, *beats_per_minute);
        }
        RecordData::Weight { grams } => {
            row.push(WEIGHT_COLUMN, *grams);
        }
    }
    Ok(())
}

fn read_payload(record_type: RecordType, row: &Row) -> StorageResult<RecordData> {
    let data = match record_type {
        RecordType::Steps => RecordData::Steps {
            count: row.get_i64(COUNT_COLUMN)?,
        },
        RecordType::HeartRate => RecordData::HeartRate {
            samples: serde_json::from_slice::<Vec<HeartRateSample>>(
                row.get_blob(SAMPLES_COLUMN)?,
            )?,
        },
        RecordType::BasalMetabolicRate => RecordData::BasalMetabolicRate {
            watts: row.get_f64(BASAL_METABOLIC_RATE_COLUMN)?,
        },
        RecordType::Distance => RecordData::Distance {
            meters: row.get_f64(DISTANCE_COLUMN)?,
        },
        RecordType::WheelchairPushes => RecordData::WheelchairPushes {
            count: row.get_i64(COUNT_COLUMN)?,
        },
        RecordType::TotalCaloriesBurned => RecordData::TotalCaloriesBurned {
            calories: row.get_f64(ENERGY_COLUMN)?,
        },
        RecordType::FloorsClimbed => RecordData::FloorsClimbed {
            floors: row.get_f64(FLOORS_COLUMN)?,
        },
        RecordType::ActiveCaloriesBurned => RecordData::ActiveCaloriesBurned {
            calories: row.get_f64(ENERGY_COLUMN)?,
        },
        RecordType::BloodGlucose => RecordData::BloodGlucose {
            millimoles_per_liter: row.get_f64(LEVEL_COLUMN)?,
            specimen_source: SpecimenSource::from_code(read_code(row, SPECIMEN_SOURCE_COLUMN)?),
            meal_type: MealType::from_code(read_code(row, MEAL_TYPE_COLUMN)?),
            relation_to_meal: RelationToMeal::from_code(read_code(row, RELATION_TO_MEAL_COLUMN)?),
        },
        RecordType::BodyTemperature => RecordData::BodyTemperature {
            celsius: row.get_f64(TEMPERATURE_COLUMN)?,
            measurement_location: BodyTemperatureLocation::from_code(read_code(
                row,
                MEASUREMENT_LOCATION_COLUMN,
            )?),
        },
        RecordType::RestingHeartRate => RecordData::RestingHeartRate {
            beats_per_minute: row.get_i64(BEATS_PER_MINUTE_COLUMN)?,
        },
        RecordType::Weight => RecordData::Weight {
            grams: row.get_f64(WEIGHT_COLUMN)?,
        },
    };
    Ok(data)
}

/// Enum codes outside the i32 range decode as unknown
fn read_code(row: &Row, column: &str) -> StorageResult<i32> {
    Ok(row
        .get_opt_i64(column)?
        .and_then(|code| i32::try_from(code).ok())
        .unwrap_or(0))
}

pub(crate) fn read_zone_offset(row: &Row, column: &str) -> StorageResult<ZoneOffset> {
    let seconds = row.get_i64(column)?;
    i32::try_from(seconds)
        .ok()
        .and_then(ZoneOffset::from_seconds)
        .ok_or_else(|| StorageError::ColumnType {
            column: column.to_string(),
            expected: "a zone offset",
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> Metadata {
        Metadata {
            id: Some("3f1c2a9e-0000-4000-8000-000000000001".to_string()),
            data_origin: "com.example.tracker".to_string(),
            last_modified_time: 1_700_000_000_123,
            client_record_id: Some("client-7".to_string()),
            client_record_version: 3,
            device: Device::new("Acme", "Band 2", DeviceType::FitnessBand),
        }
    }

    fn interval() -> RecordTime {
        RecordTime::Interval {
            start_time: 1_700_000_000_000,
            start_zone_offset: ZoneOffset::from_hours(2).unwrap(),
            end_time: 1_700_000_600_000,
            end_zone_offset: ZoneOffset::from_seconds(-19_800).unwrap(),
        }
    }

    fn instant() -> RecordTime {
        RecordTime::instant(
            1_700_000_000_000,
            ZoneOffset::from_seconds(34_200).unwrap(),
        )
    }

    fn sample_records() -> Vec<Record> {
        let payloads = vec![
            (interval(), RecordData::Steps { count: 1234 }),
            (
                interval(),
                RecordData::HeartRate {
                    samples: vec![
                        HeartRateSample {
                            beats_per_minute: 72,
                            time: 1_700_000_000_000,
                        },
                        HeartRateSample {
                            beats_per_minute: 118,
                            time: 1_700_000_300_000,
                        },
                    ],
                },
            ),
            (instant(), RecordData::BasalMetabolicRate { watts: 81.25 }),
            (interval(), RecordData::Distance { meters: 1609.344 }),
            (interval(), RecordData::WheelchairPushes { count: 88 }),
            (
                interval(),
                RecordData::TotalCaloriesBurned {
                    calories: 254_000.5,
                },
            ),
            (interval(), RecordData::FloorsClimbed { floors: 4.5 }),
            (
                interval(),
                RecordData::ActiveCaloriesBurned {
                    calories: 120_000.25,
                },
            ),
            (
                instant(),
                RecordData::BloodGlucose {
                    millimoles_per_liter: 5.4,
                    specimen_source: SpecimenSource::CapillaryBlood,
                    meal_type: MealType::Dinner,
                    relation_to_meal: RelationToMeal::AfterMeal,
                },
            ),
            (
                instant(),
                RecordData::BodyTemperature {
                    celsius: 36.85,
                    measurement_location: BodyTemperatureLocation::TemporalArtery,
                },
            ),
            (
                instant(),
                RecordData::RestingHeartRate {
                    beats_per_minute: 58,
                },
            ),
            (instant(), RecordData::Weight { grams: 71_350.0 }),
        ];

        payloads
            .into_iter()
            .map(|(time, data)| Record::new(metadata(), time, data).unwrap())
            .collect()
    }

    #[test]
    fn test_every_type_has_a_sample() {
        let covered: Vec<RecordType> = sample_records().iter().map(|r| r.record_type()).collect();
        for record_type in RecordType::all() {
            assert!(covered.contains(record_type), "{} not covered", record_type);
        }
    }

    #[test]
    fn test_serialize_deserialize_round_trip() {
        for record in sample_records() {
            let helper = RecordHelper::for_type(record.record_type());
            let mut row = helper.serialize(&record, 7).unwrap();

            assert_eq!(row.get_i64(APP_INFO_ID_COLUMN).unwrap(), 7);

            row.push(PACKAGE_NAME_COLUMN, "com.example.tracker");
            let restored = helper.deserialize(&row).unwrap();
            assert_eq!(restored, record, "{} did not round trip", record.record_type());
        }
    }

    #[test]
    fn test_serialize_rejects_foreign_type() {
        let record = &sample_records()[0];
        let helper = RecordHelper::for_type(RecordType::Weight);
        assert!(matches!(
            helper.serialize(record, 1),
            Err(StorageError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_unknown_enum_codes_read_as_unknown() {
        let record = Record::new(
            metadata(),
            instant(),
            RecordData::BodyTemperature {
                celsius: 37.0,
                measurement_location: BodyTemperatureLocation::Mouth,
            },
        )
        .unwrap();
        let helper = RecordHelper::for_type(RecordType::BodyTemperature);
        let mut row = helper.serialize(&record, 1).unwrap();
        row.push(MEASUREMENT_LOCATION_COLUMN, 400i64);
        row.push(DEVICE_TYPE_COLUMN, 99i64);
        row.push(PACKAGE_NAME_COLUMN, "com.example.tracker");

        let restored = helper.deserialize(&row).unwrap();
        assert_eq!(restored.metadata().device.device_type, DeviceType::Unknown);
        assert!(matches!(
            restored.data(),
            RecordData::BodyTemperature {
                measurement_location: BodyTemperatureLocation::Unknown,
                ..
            }
        ));
    }

    #[test]
    fn test_table_names_follow_record_names() {
        for record_type in RecordType::all() {
            let helper = RecordHelper::for_type(*record_type);
            assert_eq!(
                helper.table_name(),
                format!("{}_table", record_type.snake_name())
            );
            assert_eq!(capabilities(*record_type).record_type, *record_type);
        }
    }

    #[test]
    fn test_create_table_sql() {
        let sql = RecordHelper::for_type(RecordType::ActiveCaloriesBurned).create_table_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS active_calories_burned_record_table"));
        assert!(sql.contains("start_time INTEGER NOT NULL"));
        assert!(sql.contains("energy REAL"));

        let sql = RecordHelper::for_type(RecordType::Weight).create_table_sql();
        assert!(sql.contains("time INTEGER NOT NULL"));
        assert!(!sql.contains("end_time"));
    }

    #[test]
    fn test_aggregate_params() {
        let steps = RecordHelper::for_type(RecordType::Steps);
        let params = steps
            .aggregate_params(AggregationType::StepsCountTotal)
            .unwrap();
        assert_eq!(params.table_name, "steps_record_table");
        assert_eq!(params.columns_to_aggregate, vec!["count"]);
        assert_eq!(params.time_column, START_TIME_COLUMN);
        assert!(params.priority.is_some());

        let pushes = RecordHelper::for_type(RecordType::WheelchairPushes);
        let params = pushes
            .aggregate_params(AggregationType::WheelChairPushesCountTotal)
            .unwrap();
        assert!(params.priority.is_none());

        assert!(steps.aggregate_params(AggregationType::WeightAvg).is_none());
        assert!(RecordHelper::for_type(RecordType::HeartRate)
            .aggregate_params(AggregationType::StepsCountTotal)
            .is_none());
    }

    #[test]
    fn test_compute_aggregate_from_row() {
        let helper = RecordHelper::for_type(RecordType::RestingHeartRate);
        let row = Row::new()
            .with(BEATS_PER_MINUTE_COLUMN, 61.6)
            .with(ZONE_OFFSET_COLUMN, 3600i64);

        let result = helper
            .compute_aggregate(&row, AggregationType::RestingHeartRateBpmAvg)
            .unwrap()
            .unwrap();
        assert_eq!(result.value, AggregateValue::Long(61));
        assert_eq!(result.zone_offset, ZoneOffset::from_hours(1));

        let empty = Row::new().with(BEATS_PER_MINUTE_COLUMN, None::<i64>);
        assert!(helper
            .compute_aggregate(&empty, AggregationType::RestingHeartRateBpmAvg)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_basal_calories_hold_until_next_reading() {
        let helper = RecordHelper::for_type(RecordType::BasalMetabolicRate);
        let rows = vec![
            Row::new()
                .with(TIME_COLUMN, 0i64)
                .with(BASAL_METABOLIC_RATE_COLUMN, 41.84)
                .with(ZONE_OFFSET_COLUMN, 0i64),
            Row::new()
                .with(TIME_COLUMN, 15_000i64)
                .with(BASAL_METABOLIC_RATE_COLUMN, 83.68)
                .with(ZONE_OFFSET_COLUMN, 0i64),
        ];
        let splits = [0, 10_000, 20_000];
        let context = AggregationContext {
            time_column: TIME_COLUMN,
            zone_offset_column: ZONE_OFFSET_COLUMN,
            group_splits: &splits,
            added_values: &[],
        };

        let values = helper
            .derive_aggregate(&rows, &context, AggregationType::BasalCaloriesTotal)
            .unwrap()
            .unwrap();

        // Group 0: 10 s at 41.84 W; group 1: 5 s at 41.84 W then 5 s at 83.68 W
        assert_eq!(values.len(), 2);
        assert!((values[0] - 100.0).abs() < 1e-9);
        assert!((values[1] - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_calories_burned_total_is_basal_plus_active() {
        let helper = RecordHelper::for_type(RecordType::BasalMetabolicRate);
        let rows = vec![Row::new()
            .with(TIME_COLUMN, 0i64)
            .with(BASAL_METABOLIC_RATE_COLUMN, 41.84)
            .with(ZONE_OFFSET_COLUMN, 0i64)];
        let splits = [0, 10_000, 20_000];
        let active = [25.0, 7.5];
        let context = AggregationContext {
            time_column: TIME_COLUMN,
            zone_offset_column: ZONE_OFFSET_COLUMN,
            group_splits: &splits,
            added_values: &active,
        };

        let basal = helper
            .derive_aggregate(&rows, &context, AggregationType::BasalCaloriesTotal)
            .unwrap()
            .unwrap();
        let total = helper
            .derive_aggregate(&rows, &context, AggregationType::CaloriesBurnedTotal)
            .unwrap()
            .unwrap();

        assert_eq!(total.len(), 2);
        for group in 0..2 {
            assert!((total[group] - (basal[group] + active[group])).abs() < 1e-9);
        }
        assert!((total[0] - 125.0).abs() < 1e-9);
    }

    #[test]
    fn test_basal_calories_empty_groups_are_zero() {
        let helper = RecordHelper::for_type(RecordType::BasalMetabolicRate);
        let splits = [0, 10_000, 20_000, 30_000];
        let context = AggregationContext {
            time_column: TIME_COLUMN,
            zone_offset_column: ZONE_OFFSET_COLUMN,
            group_splits: &splits,
            added_values: &[],
        };

        let values = helper
            .derive_aggregate(&[], &context, AggregationType::BasalCaloriesTotal)
            .unwrap()
            .unwrap();
        assert_eq!(values, vec![0.0, 0.0, 0.0]);

        assert!(RecordHelper::for_type(RecordType::Steps)
            .derive_aggregate(&[], &context, AggregationType::StepsCountTotal)
            .unwrap()
            .is_none());
    }
}
