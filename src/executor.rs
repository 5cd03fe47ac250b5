//! `DbExecutor` - the blocking database seam.
//!
//! Everything that touches the database (the ledger, the engine, migration
//! units) goes through this trait, so the same code runs against a plain
//! connection or against an open [`Transaction`](crate::transaction::Transaction).

use thiserror::Error;

use crate::value::{Row, Value};

/// Database execution error
#[derive(Debug, Error)]
pub enum DbError {
    /// SQLite error from `rusqlite`
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// PostgreSQL error from `tokio-postgres`
    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Query could not be prepared or executed
    #[error("Query error: {0}")]
    Query(String),

    /// Row value could not be converted to the requested type
    #[error("Decode error: {0}")]
    Decode(String),

    /// Other execution errors
    #[error("Execution error: {0}")]
    Other(String),
}

/// SQL dialect spoken by a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    /// Positional placeholder for the `n`th (1-based) parameter
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Dialect::Sqlite => format!("?{n}"),
            Dialect::Postgres => format!("${n}"),
        }
    }

    /// Short lowercase name, also used to pick the ledger DDL template
    pub fn name(self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Trait for executing database operations
///
/// Implementations block the calling thread until the statement finishes.
pub trait DbExecutor {
    /// Dialect of the underlying connection
    fn dialect(&self) -> Dialect;

    /// Execute one statement and return the number of rows affected
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the statement fails to prepare or execute.
    fn execute(&self, query: &str, params: &[Value]) -> Result<u64, DbError>;

    /// Execute a query and return all rows
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the query fails or a column cannot be converted.
    fn query_all(&self, query: &str, params: &[Value]) -> Result<Vec<Row>, DbError>;

    /// Execute a script of one or more statements without parameters
    ///
    /// # Errors
    ///
    /// Returns `DbError` on the first failing statement.
    fn execute_batch(&self, script: &str) -> Result<(), DbError>;

    /// Execute a query that must return exactly one row
    ///
    /// # Errors
    ///
    /// Returns `DbError::Query` when zero or several rows come back.
    fn query_one(&self, query: &str, params: &[Value]) -> Result<Row, DbError> {
        let mut rows = self.query_all(query, params)?;
        match rows.len() {
            1 => Ok(rows.remove(0)),
            n => Err(DbError::Query(format!("expected exactly one row, got {n}"))),
        }
    }
}

impl<E: DbExecutor + ?Sized> DbExecutor for Box<E> {
    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    fn execute(&self, query: &str, params: &[Value]) -> Result<u64, DbError> {
        (**self).execute(query, params)
    }

    fn query_all(&self, query: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        (**self).query_all(query, params)
    }

    fn execute_batch(&self, script: &str) -> Result<(), DbError> {
        (**self).execute_batch(script)
    }
}
