//! Health record variants and their storage schemas
//!
//! - **time**: time ranges, zone offsets and record placement
//! - **record**: record type catalogue, metadata and the `Record` value
//! - **data**: type-specific payloads
//! - **helper**: per-type table definitions, row (de)serialization and
//!   aggregate support, dispatched through one capability table
//!
//! # Example
//!
//! ```rust
//! use healthstore::records::*;
//!
//! let record = Record::new(
//!     Metadata::new("com.example.fitness"),
//!     RecordTime::interval(0, 60_000, ZoneOffset::UTC),
//!     RecordData::Steps { count: 120 },
//! )
//! .unwrap();
//!
//! let helper = RecordHelper::for_type(record.record_type());
//! assert_eq!(helper.table_name(), "steps_record_table");
//! ```

/// Declares a closed enum with stable integer codes and an `Unknown` member
/// that absorbs codes written by newer versions.
macro_rules! coded_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $code:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Stable storage code
            pub fn code(self) -> i32 {
                match self {
                    $( Self::$variant => $code ),+
                }
            }

            /// Decode a storage code, mapping unrecognised codes to `Unknown`
            pub fn from_code(code: i32) -> Self {
                match code {
                    $( c if c == $code => Self::$variant, )+
                    _ => Self::Unknown,
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::Unknown
            }
        }
    };
}

mod data;
mod helper;
mod record;
mod time;

pub use data::{
    BodyTemperatureLocation, HeartRateSample, MealType, RecordData, RelationToMeal,
    SpecimenSource,
};
pub use helper::{
    capabilities, ColumnInfo, RecordCapabilities, RecordHelper, SqlType, APP_INFO_ID_COLUMN,
    CLIENT_RECORD_ID_COLUMN, CLIENT_RECORD_VERSION_COLUMN, DEVICE_TYPE_COLUMN, END_TIME_COLUMN,
    END_ZONE_OFFSET_COLUMN, LAST_MODIFIED_TIME_COLUMN, MANUFACTURER_COLUMN, MODEL_COLUMN,
    PACKAGE_NAME_COLUMN, ROW_ID_COLUMN, START_TIME_COLUMN, START_ZONE_OFFSET_COLUMN, TIME_COLUMN,
    UUID_COLUMN, ZONE_OFFSET_COLUMN,
};
pub(crate) use helper::read_zone_offset;
pub use record::{Device, DeviceType, Metadata, Record, RecordType};
pub use time::{RecordTime, TimeRange, ZoneOffset};
