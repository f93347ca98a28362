//! Type-specific record payloads

use crate::records::record::RecordType;
use crate::records::time::RecordTime;
use serde::{Deserialize, Serialize};

coded_enum! {
    /// Where on the body a temperature was taken
    pub enum BodyTemperatureLocation {
        Unknown = 0,
        Armpit = 1,
        Finger = 2,
        Forehead = 3,
        Mouth = 4,
        Rectum = 5,
        TemporalArtery = 6,
        Toe = 7,
        Ear = 8,
        Wrist = 9,
        Vagina = 10,
    }
}

coded_enum! {
    /// Fluid a blood glucose sample was taken from
    pub enum SpecimenSource {
        Unknown = 0,
        InterstitialFluid = 1,
        CapillaryBlood = 2,
        Plasma = 3,
        Serum = 4,
        Tears = 5,
        WholeBlood = 6,
    }
}

coded_enum! {
    pub enum MealType {
        Unknown = 0,
        Breakfast = 1,
        Lunch = 2,
        Dinner = 3,
        Snack = 4,
    }
}

coded_enum! {
    /// Timing of a blood glucose sample relative to a meal
    pub enum RelationToMeal {
        Unknown = 0,
        General = 1,
        Fasting = 2,
        BeforeMeal = 3,
        AfterMeal = 4,
    }
}

/// One heart rate reading inside a heart rate series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartRateSample {
    pub beats_per_minute: i64,
    /// Unix timestamp in milliseconds
    pub time: i64,
}

/// Payload of a record; the variant determines the record type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordData {
    Steps {
        count: i64,
    },
    HeartRate {
        samples: Vec<HeartRateSample>,
    },
    /// Energy the body needs at rest, in watts
    BasalMetabolicRate {
        watts: f64,
    },
    Distance {
        meters: f64,
    },
    WheelchairPushes {
        count: i64,
    },
    TotalCaloriesBurned {
        calories: f64,
    },
    FloorsClimbed {
        floors: f64,
    },
    ActiveCaloriesBurned {
        calories: f64,
    },
    BloodGlucose {
        millimoles_per_liter: f64,
        specimen_source: SpecimenSource,
        meal_type: MealType,
        relation_to_meal: RelationToMeal,
    },
    BodyTemperature {
        celsius: f64,
        measurement_location: BodyTemperatureLocation,
    },
    RestingHeartRate {
        beats_per_minute: i64,
    },
    Weight {
        grams: f64,
    },
}

impl RecordData {
    pub fn record_type(&self) -> RecordType {
        match self {
            RecordData::Steps { .. } => RecordType::Steps,
            RecordData::HeartRate { .. } => RecordType::HeartRate,
            RecordData::BasalMetabolicRate { .. } => RecordType::BasalMetabolicRate,
            RecordData::Distance { .. } => RecordType::Distance,
            RecordData::WheelchairPushes { .. } => RecordType::WheelchairPushes,
            RecordData::TotalCaloriesBurned { .. } => RecordType::TotalCaloriesBurned,
            RecordData::FloorsClimbed { .. } => RecordType::FloorsClimbed,
            RecordData::ActiveCaloriesBurned { .. } => RecordType::ActiveCaloriesBurned,
            RecordData::BloodGlucose { .. } => RecordType::BloodGlucose,
            RecordData::BodyTemperature { .. } => RecordType::BodyTemperature,
            RecordData::RestingHeartRate { .. } => RecordType::RestingHeartRate,
            RecordData::Weight { .. } => RecordType::Weight,
        }
    }

    /// Check payload values against the record's time placement
    pub fn validate(&self, time: &RecordTime) -> Result<(), String> {
        match self {
            RecordData::Steps { count } | RecordData::WheelchairPushes { count } => {
                non_negative_count(*count)
            }
            RecordData::RestingHeartRate { beats_per_minute } => {
                non_negative_count(*beats_per_minute)
            }
            RecordData::HeartRate { samples } => {
                for sample in samples {
                    non_negative_count(sample.beats_per_minute)?;
                    if sample.time < time.start_time() || sample.time > time.end_time() {
                        return Err(format!(
                            "heart rate sample at {} is outside the record interval",
                            sample.time
                        ));
                    }
                }
                Ok(())
            }
            RecordData::BasalMetabolicRate { watts: value }
            | RecordData::Distance { meters: value }
            | RecordData::TotalCaloriesBurned { calories: value }
            | RecordData::FloorsClimbed { floors: value }
            | RecordData::ActiveCaloriesBurned { calories: value }
            | RecordData::BloodGlucose {
                millimoles_per_liter: value,
                ..
            }
            | RecordData::Weight { grams: value } => non_negative_value(*value),
            RecordData::BodyTemperature { celsius, .. } => {
                if celsius.is_finite() {
                    Ok(())
                } else {
                    Err("temperature must be finite".to_string())
                }
            }
        }
    }
}

fn non_negative_count(value: i64) -> Result<(), String> {
    if value >= 0 {
        Ok(())
    } else {
        Err(format!("count {} must not be negative", value))
    }
}

fn non_negative_value(value: f64) -> Result<(), String> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(format!("value {} must be finite and not negative", value))
    }
}
