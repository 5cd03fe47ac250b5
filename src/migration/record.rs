//! `MigrationRecord` - one row of the migration ledger

use chrono::{DateTime, Utc};

use crate::executor::DbError;
use crate::value::Row;

/// An applied migration, as stored in the ledger table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    /// Migration version (timestamp: YYYYMMDDHHMMSS)
    pub version: i64,

    /// Snake-case name taken from the file name
    pub name: String,

    /// When the unit's transaction started
    pub start_time: DateTime<Utc>,

    /// When the ledger row was written, just before commit
    pub end_time: DateTime<Utc>,
}

impl MigrationRecord {
    #[must_use]
    pub fn new(version: i64, name: String, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            version,
            name,
            start_time,
            end_time,
        }
    }

    /// When the migration counts as applied
    #[must_use]
    pub fn applied_at(&self) -> DateTime<Utc> {
        self.end_time
    }

    /// Create a `MigrationRecord` from a ledger row
    ///
    /// Expected column order: `version`, `name`, `start_time`, `end_time`
    ///
    /// # Errors
    ///
    /// Returns `DbError::Decode` if a column is missing or has the wrong type.
    pub fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            version: row.get_i64(0)?,
            name: row.get_string(1)?,
            start_time: row.get_timestamp(2)?,
            end_time: row.get_timestamp(3)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use chrono::TimeZone;

    fn columns() -> Vec<String> {
        ["version", "name", "start_time", "end_time"]
            .iter()
            .map(|c| (*c).to_string())
            .collect()
    }

    #[test]
    fn test_from_row_with_text_timestamps() {
        let row = Row::new(
            columns(),
            vec![
                Value::Int(20230101000000),
                Value::Text("init".to_string()),
                Value::Text("2023-01-01 10:00:00".to_string()),
                Value::Text("2023-01-01 10:00:01.250".to_string()),
            ],
        );
        let record = MigrationRecord::from_row(&row).unwrap();
        assert_eq!(record.version, 20230101000000);
        assert_eq!(record.name, "init");
        assert_eq!(
            record.start_time,
            Utc.with_ymd_and_hms(2023, 1, 1, 10, 0, 0).unwrap()
        );
        assert!(record.applied_at() > record.start_time);
    }

    #[test]
    fn test_from_row_rejects_bad_timestamp() {
        let row = Row::new(
            columns(),
            vec![
                Value::Int(1),
                Value::Text("init".to_string()),
                Value::Text("yesterday".to_string()),
                Value::Null,
            ],
        );
        assert!(MigrationRecord::from_row(&row).is_err());
    }
}
