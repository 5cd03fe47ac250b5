//! SQLite backend using `rusqlite`.
//!
//! The connection is owned directly; sluice runs one operation at a time on
//! the calling thread, so no locking is involved. `:memory:` databases are
//! supported and back most of the test suite.

use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;

use crate::executor::{DbError, DbExecutor, Dialect};
use crate::value::{format_timestamp, Row, Value};

const MEMORY_PATH: &str = ":memory:";

/// `DbExecutor` over a single `rusqlite::Connection`
pub struct SqliteExecutor {
    path: PathBuf,
    conn: rusqlite::Connection,
}

impl SqliteExecutor {
    /// Open (or create) the database at `path`; `:memory:` opens an in-memory one
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the file cannot be opened or its parent directory
    /// cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref().to_path_buf();
        let conn = if path.as_os_str() == MEMORY_PATH {
            rusqlite::Connection::open_in_memory()?
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DbError::Other(format!(
                        "failed to create directory {} for SQLite database: {e}",
                        parent.display()
                    ))
                })?;
            }
            rusqlite::Connection::open(&path)?
        };

        conn.pragma_update(None, "foreign_keys", "ON")?;
        log::debug!("opened SQLite database {}", path.display());

        Ok(Self { path, conn })
    }

    /// Open a fresh in-memory database
    ///
    /// # Errors
    ///
    /// Returns `DbError` if SQLite cannot allocate the database.
    pub fn memory() -> Result<Self, DbError> {
        Self::open(MEMORY_PATH)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn prepare_bound<'c>(
        conn: &'c rusqlite::Connection,
        sql: &str,
        params: &[Value],
    ) -> Result<rusqlite::Statement<'c>, DbError> {
        let mut stmt = conn.prepare(sql)?;
        let expected = stmt.parameter_count();
        if expected != params.len() {
            return Err(DbError::Query(format!(
                "statement expects {expected} parameter(s), {} given: {sql}",
                params.len()
            )));
        }
        for (i, param) in params.iter().enumerate() {
            let idx = i + 1;
            match param {
                Value::Null => stmt.raw_bind_parameter(idx, rusqlite::types::Null)?,
                Value::Int(v) => stmt.raw_bind_parameter(idx, v)?,
                Value::Text(s) => stmt.raw_bind_parameter(idx, s.as_str())?,
                Value::Timestamp(ts) => {
                    stmt.raw_bind_parameter(idx, format_timestamp(ts).as_str())?;
                }
            }
        }
        Ok(stmt)
    }

    fn convert_row(row: &rusqlite::Row<'_>, columns: &[String]) -> Result<Row, DbError> {
        let mut values = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            let value = match row.get_ref(idx)? {
                ValueRef::Null => Value::Null,
                ValueRef::Integer(v) => Value::Int(v),
                ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
                ValueRef::Real(v) => Value::Text(v.to_string()),
                ValueRef::Blob(_) => {
                    return Err(DbError::Decode(format!(
                        "column '{}' holds a BLOB, which is not supported",
                        columns[idx]
                    )))
                }
            };
            values.push(value);
        }
        Ok(Row::new(columns.to_vec(), values))
    }
}

impl DbExecutor for SqliteExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&self, query: &str, params: &[Value]) -> Result<u64, DbError> {
        let mut stmt = Self::prepare_bound(&self.conn, query, params)?;
        let affected = stmt.raw_execute()?;
        Ok(affected as u64)
    }

    fn query_all(&self, query: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        let mut stmt = Self::prepare_bound(&self.conn, query, params)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.raw_query();
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(Self::convert_row(row, &columns)?);
        }
        Ok(out)
    }

    fn execute_batch(&self, script: &str) -> Result<(), DbError> {
        self.conn.execute_batch(script)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    #[test]
    fn test_memory_open() {
        let executor = SqliteExecutor::memory().unwrap();
        assert_eq!(executor.dialect(), Dialect::Sqlite);
        assert_eq!(executor.path(), Path::new(":memory:"));
    }

    #[test]
    fn test_insert_and_query() {
        let executor = SqliteExecutor::memory().unwrap();
        executor
            .execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, seen TEXT)")
            .unwrap();

        let seen = Utc.with_ymd_and_hms(2023, 5, 1, 8, 30, 0).unwrap();
        let affected = executor
            .execute(
                "INSERT INTO users (id, name, seen) VALUES (?1, ?2, ?3)",
                &[Value::Int(1), Value::from("Alice"), Value::Timestamp(seen)],
            )
            .unwrap();
        assert_eq!(affected, 1);

        let rows = executor
            .query_all("SELECT id, name, seen FROM users WHERE id = ?1", &[Value::Int(1)])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].columns(), ["id", "name", "seen"]);
        assert_eq!(rows[0].get_i64(0).unwrap(), 1);
        assert_eq!(rows[0].get_string(1).unwrap(), "Alice");
        assert_eq!(rows[0].get_timestamp(2).unwrap(), seen);
    }

    #[test]
    fn test_parameter_count_mismatch() {
        let executor = SqliteExecutor::memory().unwrap();
        executor.execute_batch("CREATE TABLE t (id INTEGER)").unwrap();
        let err = executor
            .execute("INSERT INTO t (id) VALUES (?1)", &[])
            .unwrap_err();
        assert!(matches!(err, DbError::Query(_)));
    }

    #[test]
    fn test_null_round_trip() {
        let executor = SqliteExecutor::memory().unwrap();
        executor.execute_batch("CREATE TABLE t (v TEXT)").unwrap();
        executor
            .execute("INSERT INTO t (v) VALUES (?1)", &[Value::Null])
            .unwrap();
        let row = executor.query_one("SELECT v FROM t", &[]).unwrap();
        assert!(row.get(0).unwrap().is_null());
    }

    #[test]
    fn test_invalid_sql_is_error() {
        let executor = SqliteExecutor::memory().unwrap();
        assert!(executor.execute_batch("CREATE TABLEX nope").is_err());
        assert!(executor.query_all("SELECT * FROM missing", &[]).is_err());
    }

    #[test]
    fn test_file_database_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store").join("db.sqlite");
        {
            let executor = SqliteExecutor::open(&path).unwrap();
            executor.execute_batch("CREATE TABLE t (id INTEGER)").unwrap();
        }
        assert!(path.exists());
        let reopened = SqliteExecutor::open(&path).unwrap();
        assert!(reopened.query_all("SELECT id FROM t", &[]).unwrap().is_empty());
    }
}
