//! Row values exchanged with the query executor
//!
//! A [`Row`] is an ordered list of named column values. Schema helpers write
//! rows on the way in and read them back by column name on the way out.

use crate::storage::error::{StorageError, StorageResult};

/// A single column value, mirroring SQLite's storage classes
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A row of named column values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: append a column
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(name, value);
        self
    }

    /// Append a column, replacing any existing column with the same name
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Column names in insertion order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    /// Columns in insertion order
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// True when the column is absent or NULL
    pub fn is_null(&self, name: &str) -> bool {
        self.get(name).map(Value::is_null).unwrap_or(true)
    }

    fn require(&self, name: &str) -> StorageResult<&Value> {
        self.get(name)
            .ok_or_else(|| StorageError::MissingColumn(name.to_string()))
    }

    pub fn get_i64(&self, name: &str) -> StorageResult<i64> {
        self.get_opt_i64(name)?.ok_or_else(|| StorageError::ColumnType {
            column: name.to_string(),
            expected: "an integer",
        })
    }

    pub fn get_opt_i64(&self, name: &str) -> StorageResult<Option<i64>> {
        match self.require(name)? {
            Value::Null => Ok(None),
            Value::Integer(v) => Ok(Some(*v)),
            _ => Err(StorageError::ColumnType {
                column: name.to_string(),
                expected: "an integer",
            }),
        }
    }

    /// Read a numeric column; integers are widened to f64
    pub fn get_f64(&self, name: &str) -> StorageResult<f64> {
        self.get_opt_f64(name)?.ok_or_else(|| StorageError::ColumnType {
            column: name.to_string(),
            expected: "a number",
        })
    }

    pub fn get_opt_f64(&self, name: &str) -> StorageResult<Option<f64>> {
        match self.require(name)? {
            Value::Null => Ok(None),
            Value::Real(v) => Ok(Some(*v)),
            Value::Integer(v) => Ok(Some(*v as f64)),
            _ => Err(StorageError::ColumnType {
                column: name.to_string(),
                expected: "a number",
            }),
        }
    }

    pub fn get_opt_string(&self, name: &str) -> StorageResult<Option<String>> {
        match self.require(name)? {
            Value::Null => Ok(None),
            Value::Text(v) => Ok(Some(v.clone())),
            _ => Err(StorageError::ColumnType {
                column: name.to_string(),
                expected: "text",
            }),
        }
    }

    pub fn get_string(&self, name: &str) -> StorageResult<String> {
        self.get_opt_string(name)?
            .ok_or_else(|| StorageError::ColumnType {
                column: name.to_string(),
                expected: "text",
            })
    }

    pub fn get_blob(&self, name: &str) -> StorageResult<&[u8]> {
        match self.require(name)? {
            Value::Blob(v) => Ok(v.as_slice()),
            _ => Err(StorageError::ColumnType {
                column: name.to_string(),
                expected: "a blob",
            }),
        }
    }
}
