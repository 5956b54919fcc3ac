//! Cell values and column types carried by a [`Dataset`](super::Dataset).
//!
//! Values are owned: a dataset is materialized in memory between extraction
//! and load, so there is no source buffer to borrow from.

use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Declared type of a dataset column.
///
/// Every column of a dataset carries exactly one of these, and every non-null
/// value in that column has the matching [`SqlValue`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    Text,
    DateTime,
    Boolean,
    Binary,
    Unknown,
}

impl ColumnType {
    /// Runtime type classification used by the type compatibility checker.
    ///
    /// The checker matches category names as substrings of this string, so
    /// each spelling must contain its own category name and no earlier one.
    pub fn classification(&self) -> &'static str {
        match self {
            ColumnType::Integer => "int64",
            ColumnType::Float => "float64",
            ColumnType::Text => "text",
            ColumnType::DateTime => "datetime64",
            ColumnType::Boolean => "boolean",
            ColumnType::Binary => "bytes",
            ColumnType::Unknown => "unknown",
        }
    }

    /// Type implied by a single non-null value.
    pub fn of(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Null => None,
            SqlValue::Bool(_) => Some(ColumnType::Boolean),
            SqlValue::Int(_) => Some(ColumnType::Integer),
            SqlValue::Float(_) => Some(ColumnType::Float),
            SqlValue::Text(_) => Some(ColumnType::Text),
            SqlValue::DateTime(_) => Some(ColumnType::DateTime),
            SqlValue::Bytes(_) => Some(ColumnType::Binary),
        }
    }

    /// Zero/default value substituted for missing cells by the `fill` null policy.
    ///
    /// `Unknown` columns have no meaningful default and stay null.
    pub fn default_value(&self) -> SqlValue {
        match self {
            ColumnType::Integer => SqlValue::Int(0),
            ColumnType::Float => SqlValue::Float(0.0),
            ColumnType::Text => SqlValue::Text(String::new()),
            ColumnType::DateTime => SqlValue::DateTime(NaiveDateTime::UNIX_EPOCH),
            ColumnType::Boolean => SqlValue::Bool(false),
            ColumnType::Binary => SqlValue::Bytes(Vec::new()),
            ColumnType::Unknown => SqlValue::Null,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.classification())
    }
}

/// A single cell value.
///
/// Equality and hashing compare floats by bit pattern so that rows can be
/// deduplicated with a hash set (two `NaN` cells count as duplicates).
#[derive(Debug, Clone)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
    Bytes(Vec<u8>),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Render as text for drivers that bind every parameter as a string.
    ///
    /// Returns `None` for NULL. Binary values are hex encoded without prefix.
    pub fn to_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            SqlValue::Int(n) => Some(n.to_string()),
            SqlValue::Float(f) => Some(f.to_string()),
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
            SqlValue::Bytes(b) => Some(hex::encode(b)),
        }
    }
}

impl PartialEq for SqlValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SqlValue::Null, SqlValue::Null) => true,
            (SqlValue::Bool(a), SqlValue::Bool(b)) => a == b,
            (SqlValue::Int(a), SqlValue::Int(b)) => a == b,
            (SqlValue::Float(a), SqlValue::Float(b)) => a.to_bits() == b.to_bits(),
            (SqlValue::Text(a), SqlValue::Text(b)) => a == b,
            (SqlValue::DateTime(a), SqlValue::DateTime(b)) => a == b,
            (SqlValue::Bytes(a), SqlValue::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for SqlValue {}

impl Hash for SqlValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            SqlValue::Null => {}
            SqlValue::Bool(v) => v.hash(state),
            SqlValue::Int(v) => v.hash(state),
            SqlValue::Float(v) => v.to_bits().hash(state),
            SqlValue::Text(v) => v.hash(state),
            SqlValue::DateTime(v) => v.hash(state),
            SqlValue::Bytes(v) => v.hash(state),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v as i64)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::DateTime(v.and_time(chrono::NaiveTime::MIN))
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Parse a timestamp in the formats commonly produced by drivers and flat files.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M:%S",
        "%d-%b-%y %I.%M.%S%.f %p",
    ];
    let s = s.trim();
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%d-%b-%y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d.and_time(chrono::NaiveTime::MIN));
        }
    }
    None
}
