//! Record type catalogue and the immutable `Record` value
//!
//! Every record carries common metadata (id, owning package, device, client
//! ids), a placement on the time line and a type-specific payload. The record
//! type is implied by the payload variant, so a record can never disagree
//! with its own tag.

use crate::records::data::RecordData;
use crate::records::time::RecordTime;
use crate::storage::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};

/// Record type identifiers, stable across releases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Steps,
    HeartRate,
    BasalMetabolicRate,
    Distance,
    WheelchairPushes,
    TotalCaloriesBurned,
    FloorsClimbed,
    ActiveCaloriesBurned,
    BloodGlucose,
    BodyTemperature,
    RestingHeartRate,
    Weight,
}

impl RecordType {
    /// Get all record types for iteration
    pub fn all() -> &'static [RecordType] {
        &[
            RecordType::Steps,
            RecordType::HeartRate,
            RecordType::BasalMetabolicRate,
            RecordType::Distance,
            RecordType::WheelchairPushes,
            RecordType::TotalCaloriesBurned,
            RecordType::FloorsClimbed,
            RecordType::ActiveCaloriesBurned,
            RecordType::BloodGlucose,
            RecordType::BodyTemperature,
            RecordType::RestingHeartRate,
            RecordType::Weight,
        ]
    }

    pub fn identifier(&self) -> u32 {
        match self {
            RecordType::Steps => 1,
            RecordType::HeartRate => 2,
            RecordType::BasalMetabolicRate => 3,
            RecordType::Distance => 8,
            RecordType::WheelchairPushes => 9,
            RecordType::TotalCaloriesBurned => 10,
            RecordType::FloorsClimbed => 11,
            RecordType::ActiveCaloriesBurned => 13,
            RecordType::BloodGlucose => 21,
            RecordType::BodyTemperature => 24,
            RecordType::RestingHeartRate => 29,
            RecordType::Weight => 31,
        }
    }

    pub fn from_identifier(identifier: u32) -> StorageResult<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|t| t.identifier() == identifier)
            .ok_or(StorageError::UnknownRecordType(identifier))
    }

    /// Lowercase-with-underscores record name, e.g. `active_calories_burned_record`
    pub fn snake_name(&self) -> &'static str {
        match self {
            RecordType::Steps => "steps_record",
            RecordType::HeartRate => "heart_rate_record",
            RecordType::BasalMetabolicRate => "basal_metabolic_rate_record",
            RecordType::Distance => "distance_record",
            RecordType::WheelchairPushes => "wheelchair_pushes_record",
            RecordType::TotalCaloriesBurned => "total_calories_burned_record",
            RecordType::FloorsClimbed => "floors_climbed_record",
            RecordType::ActiveCaloriesBurned => "active_calories_burned_record",
            RecordType::BloodGlucose => "blood_glucose_record",
            RecordType::BodyTemperature => "body_temperature_record",
            RecordType::RestingHeartRate => "resting_heart_rate_record",
            RecordType::Weight => "weight_record",
        }
    }

    /// Parse from a snake name, with or without the `_record` suffix
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase().replace('-', "_");
        Self::all().iter().copied().find(|t| {
            let full = t.snake_name();
            full == name || full.trim_end_matches("_record") == name
        })
    }

    /// Interval records carry a start and end, instant records a single time
    pub fn is_interval(&self) -> bool {
        match self {
            RecordType::Steps
            | RecordType::HeartRate
            | RecordType::Distance
            | RecordType::WheelchairPushes
            | RecordType::TotalCaloriesBurned
            | RecordType::FloorsClimbed
            | RecordType::ActiveCaloriesBurned => true,
            RecordType::BasalMetabolicRate
            | RecordType::BloodGlucose
            | RecordType::BodyTemperature
            | RecordType::RestingHeartRate
            | RecordType::Weight => false,
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.snake_name())
    }
}

coded_enum! {
    /// Kind of device that produced a record
    pub enum DeviceType {
        Unknown = 0,
        Watch = 1,
        Phone = 2,
        Scale = 3,
        Ring = 4,
        HeadMounted = 5,
        FitnessBand = 6,
        ChestStrap = 7,
        SmartDisplay = 8,
    }
}

/// Device that produced a record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    #[serde(default)]
    pub device_type: DeviceType,
}

impl Device {
    pub fn new(
        manufacturer: impl Into<String>,
        model: impl Into<String>,
        device_type: DeviceType,
    ) -> Self {
        Self {
            manufacturer: Some(manufacturer.into()),
            model: Some(model.into()),
            device_type,
        }
    }
}

/// Common metadata carried by every record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Unique id; `None` until the record has been persisted
    pub id: Option<String>,
    /// Package name of the application that wrote the record
    pub data_origin: String,
    /// Unix timestamp in milliseconds of the last write
    pub last_modified_time: i64,
    /// Id assigned by the writing application
    pub client_record_id: Option<String>,
    /// Version assigned by the writing application
    pub client_record_version: i64,
    #[serde(default)]
    pub device: Device,
}

impl Metadata {
    /// Metadata for a not-yet-persisted record from `data_origin`
    pub fn new(data_origin: impl Into<String>) -> Self {
        Self {
            id: None,
            data_origin: data_origin.into(),
            last_modified_time: 0,
            client_record_id: None,
            client_record_version: 0,
            device: Device::default(),
        }
    }

    /// Builder method: attach a client record id and version
    pub fn client_record(mut self, id: impl Into<String>, version: i64) -> Self {
        self.client_record_id = Some(id.into());
        self.client_record_version = version;
        self
    }

    /// Builder method: attach device information
    pub fn device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }
}

/// A single health measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    metadata: Metadata,
    time: RecordTime,
    data: RecordData,
}

impl Record {
    /// Create a record, validating shape, ordering and payload
    pub fn new(metadata: Metadata, time: RecordTime, data: RecordData) -> StorageResult<Self> {
        let record_type = data.record_type();

        if record_type.is_interval() != time.is_interval() {
            return Err(StorageError::InvalidRecord(format!(
                "{} requires {} time",
                record_type,
                if record_type.is_interval() {
                    "interval"
                } else {
                    "instant"
                }
            )));
        }

        if time.start_time() > time.end_time() {
            return Err(StorageError::InvalidRecord(format!(
                "start time {} is after end time {}",
                time.start_time(),
                time.end_time()
            )));
        }

        if metadata.data_origin.is_empty() {
            return Err(StorageError::InvalidRecord(
                "data origin package name is empty".to_string(),
            ));
        }

        data.validate(&time).map_err(StorageError::InvalidRecord)?;

        Ok(Self {
            metadata,
            time,
            data,
        })
    }

    pub fn record_type(&self) -> RecordType {
        self.data.record_type()
    }

    pub fn id(&self) -> Option<&str> {
        self.metadata.id.as_deref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn time(&self) -> &RecordTime {
        &self.time
    }

    pub fn data(&self) -> &RecordData {
        &self.data
    }

    /// Copy of this record stamped with its persisted id and write time
    pub(crate) fn persisted(&self, id: String, last_modified_time: i64) -> Self {
        let mut record = self.clone();
        record.metadata.id = Some(id);
        record.metadata.last_modified_time = last_modified_time;
        record
    }

    /// Size of the record's JSON encoding, used for payload ceilings
    pub fn estimated_size(&self) -> StorageResult<u64> {
        Ok(serde_json::to_vec(self)?.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::time::ZoneOffset;

    #[test]
    fn test_identifier_round_trip() {
        for record_type in RecordType::all() {
            let id = record_type.identifier();
            assert_eq!(RecordType::from_identifier(id).unwrap(), *record_type);
        }
        assert!(matches!(
            RecordType::from_identifier(999),
            Err(StorageError::UnknownRecordType(999))
        ));
    }

    #[test]
    fn test_from_name() {
        assert_eq!(RecordType::from_name("steps"), Some(RecordType::Steps));
        assert_eq!(
            RecordType::from_name("active-calories-burned"),
            Some(RecordType::ActiveCaloriesBurned)
        );
        assert_eq!(
            RecordType::from_name("weight_record"),
            Some(RecordType::Weight)
        );
        assert_eq!(RecordType::from_name("sleep"), None);
    }

    #[test]
    fn test_device_type_codes() {
        assert_eq!(DeviceType::Watch.code(), 1);
        assert_eq!(DeviceType::from_code(3), DeviceType::Scale);
        assert_eq!(DeviceType::from_code(77), DeviceType::Unknown);
    }

    #[test]
    fn test_record_rejects_reversed_interval() {
        let result = Record::new(
            Metadata::new("com.example.app"),
            RecordTime::interval(2000, 1000, ZoneOffset::UTC),
            RecordData::Steps { count: 10 },
        );
        assert!(matches!(result, Err(StorageError::InvalidRecord(_))));
    }

    #[test]
    fn test_record_rejects_wrong_shape() {
        let result = Record::new(
            Metadata::new("com.example.app"),
            RecordTime::instant(1000, ZoneOffset::UTC),
            RecordData::Steps { count: 10 },
        );
        assert!(matches!(result, Err(StorageError::InvalidRecord(_))));

        let result = Record::new(
            Metadata::new("com.example.app"),
            RecordTime::interval(1000, 2000, ZoneOffset::UTC),
            RecordData::Weight { grams: 70_000.0 },
        );
        assert!(matches!(result, Err(StorageError::InvalidRecord(_))));
    }

    #[test]
    fn test_record_accepts_zero_length_interval() {
        let record = Record::new(
            Metadata::new("com.example.app"),
            RecordTime::interval(1000, 1000, ZoneOffset::UTC),
            RecordData::Steps { count: 10 },
        )
        .unwrap();
        assert_eq!(record.record_type(), RecordType::Steps);
        assert!(record.id().is_none());
    }
}
