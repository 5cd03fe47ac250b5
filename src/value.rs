//! Backend-neutral parameter and result values.
//!
//! Every backend binds [`Value`]s as statement parameters and converts its
//! native rows into [`Row`]s, so the ledger and the engine never touch a
//! driver type directly.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;

use crate::executor::DbError;

/// A single SQL value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// SQL `NULL`
    Null,
    /// Any integer column (`INTEGER`, `BIGINT`, `SMALLINT`, ...)
    Int(i64),
    /// Any character column (`TEXT`, `VARCHAR`, ...)
    Text(String),
    /// A UTC timestamp
    Timestamp(DateTime<Utc>),
}

/// Text layouts accepted when a timestamp comes back as a string.
///
/// SQLite has no timestamp type, so the ledger stores the first layout there.
const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
];

/// Render a timestamp in the layout stored by text-only backends.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMATS[0]).to_string()
}

/// Parse a timestamp stored as text.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

impl Value {
    /// Whether this value is `NULL`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Int(_) => "integer",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "timestamp",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Timestamp(ts) => write!(f, "{}", format_timestamp(ts)),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// One result row: column names plus values in select order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw value at `idx`
    pub fn get(&self, idx: usize) -> Result<&Value, DbError> {
        self.values.get(idx).ok_or_else(|| {
            DbError::Decode(format!(
                "column index {idx} out of range for a row of {} column(s)",
                self.values.len()
            ))
        })
    }

    /// Raw value of the column called `name`
    pub fn get_named(&self, name: &str) -> Result<&Value, DbError> {
        let idx = self
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .ok_or_else(|| DbError::Decode(format!("no column named '{name}'")))?;
        self.get(idx)
    }

    pub fn get_i64(&self, idx: usize) -> Result<i64, DbError> {
        match self.get(idx)? {
            Value::Int(v) => Ok(*v),
            // Some drivers hand back numeric strings for wide integers.
            Value::Text(s) => s
                .trim()
                .parse()
                .map_err(|e| DbError::Decode(format!("column {idx}: '{s}' is not an integer: {e}"))),
            other => Err(mismatch(idx, "integer", other)),
        }
    }

    pub fn get_string(&self, idx: usize) -> Result<String, DbError> {
        match self.get(idx)? {
            Value::Text(s) => Ok(s.clone()),
            other => Err(mismatch(idx, "text", other)),
        }
    }

    pub fn get_timestamp(&self, idx: usize) -> Result<DateTime<Utc>, DbError> {
        match self.get(idx)? {
            Value::Timestamp(ts) => Ok(*ts),
            Value::Text(s) => parse_timestamp(s).ok_or_else(|| {
                DbError::Decode(format!("column {idx}: unrecognized timestamp '{s}'"))
            }),
            other => Err(mismatch(idx, "timestamp", other)),
        }
    }

    pub fn get_opt_timestamp(&self, idx: usize) -> Result<Option<DateTime<Utc>>, DbError> {
        if self.get(idx)?.is_null() {
            return Ok(None);
        }
        self.get_timestamp(idx).map(Some)
    }
}

fn mismatch(idx: usize, expected: &str, found: &Value) -> DbError {
    DbError::Decode(format!(
        "column {idx}: expected {expected}, found {}",
        found.kind()
    ))
}
