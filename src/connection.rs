//! Connection establishment.
//!
//! Turns a configured DSN into a boxed [`DbExecutor`]. Supported forms:
//! - `sqlite::memory:`, `sqlite:<path>`, `sqlite://<path>`
//! - `postgres://...`, `postgresql://...` and key-value `host=... dbname=...`
//!   (requires the `postgres` feature)

use thiserror::Error;

use crate::backend::sqlite::SqliteExecutor;
use crate::config::DatabaseConfig;
use crate::executor::{DbError, DbExecutor, Dialect};

/// Connection error type
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Invalid connection string format
    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),
    /// The DSN names a backend this build does not include
    #[error("Unsupported database dialect '{0}': rebuild sluice with the `{0}` feature")]
    UnsupportedDialect(Dialect),
    /// Driver refused the connection
    #[error("Connection error: {0}")]
    Database(#[from] DbError),
}

/// Where a DSN points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionTarget {
    /// SQLite database file, or `:memory:`
    Sqlite(String),
    /// PostgreSQL connection string, passed to the driver untouched
    Postgres(String),
}

impl ConnectionTarget {
    pub fn dialect(&self) -> Dialect {
        match self {
            ConnectionTarget::Sqlite(_) => Dialect::Sqlite,
            ConnectionTarget::Postgres(_) => Dialect::Postgres,
        }
    }
}

/// Validates a connection string and works out which backend it targets
///
/// # Errors
///
/// Returns `ConnectionError::InvalidConnectionString` for empty strings,
/// unknown schemes and SQLite DSNs without a path.
pub fn parse_connection_string(connection_string: &str) -> Result<ConnectionTarget, ConnectionError> {
    let dsn = connection_string.trim();
    if dsn.is_empty() {
        return Err(ConnectionError::InvalidConnectionString(
            "Connection string cannot be empty".to_string(),
        ));
    }

    if let Some(rest) = dsn.strip_prefix("sqlite:") {
        let path = rest.strip_prefix("//").unwrap_or(rest);
        if path.is_empty() {
            return Err(ConnectionError::InvalidConnectionString(
                "SQLite connection string must name a file or :memory:".to_string(),
            ));
        }
        return Ok(ConnectionTarget::Sqlite(path.to_string()));
    }

    let is_uri_format = dsn.starts_with("postgresql://") || dsn.starts_with("postgres://");
    let is_key_value_format = !dsn.contains("://") && dsn.contains('=');
    if is_uri_format || is_key_value_format {
        return Ok(ConnectionTarget::Postgres(dsn.to_string()));
    }

    Err(ConnectionError::InvalidConnectionString(format!(
        "'{dsn}' is neither a sqlite: path, a postgres:// URI nor a key-value (host=...) string"
    )))
}

/// Validates a connection string format
///
/// # Errors
///
/// See [`parse_connection_string`].
pub fn validate_connection_string(connection_string: &str) -> Result<(), ConnectionError> {
    parse_connection_string(connection_string).map(|_| ())
}

/// Merge separately configured credentials into a PostgreSQL connection string
///
/// Credentials already present in the DSN win. SQLite targets are returned
/// unchanged.
pub fn with_credentials(target: ConnectionTarget, user: Option<&str>, password: Option<&str>) -> ConnectionTarget {
    let dsn = match target {
        ConnectionTarget::Postgres(dsn) => dsn,
        other => return other,
    };
    let user = user.filter(|u| !u.is_empty());
    let password = password.filter(|p| !p.is_empty());
    if user.is_none() && password.is_none() {
        return ConnectionTarget::Postgres(dsn);
    }

    if let Some((scheme, rest)) = dsn.split_once("://") {
        let authority_end = rest.find('/').unwrap_or(rest.len());
        if rest[..authority_end].contains('@') {
            return ConnectionTarget::Postgres(dsn);
        }
        let credentials = match (user, password) {
            (Some(u), Some(p)) => format!("{u}:{p}@"),
            (Some(u), None) => format!("{u}@"),
            (None, Some(p)) => format!(":{p}@"),
            (None, None) => String::new(),
        };
        return ConnectionTarget::Postgres(format!("{scheme}://{credentials}{rest}"));
    }

    let mut merged = dsn;
    if let Some(u) = user.filter(|_| !merged.contains("user=")) {
        merged.push_str(&format!(" user={u}"));
    }
    if let Some(p) = password.filter(|_| !merged.contains("password=")) {
        merged.push_str(&format!(" password={p}"));
    }
    ConnectionTarget::Postgres(merged)
}

/// Open a connection for the configured database
///
/// This is a blocking call.
///
/// # Errors
///
/// Returns `ConnectionError` if the DSN is invalid, its backend is not
/// compiled in, or the driver fails to connect.
pub fn connect(config: &DatabaseConfig) -> Result<Box<dyn DbExecutor>, ConnectionError> {
    let target = with_credentials(
        parse_connection_string(&config.url)?,
        config.user.as_deref(),
        config.password.as_deref(),
    );
    log::debug!("connecting to {} database", target.dialect());

    match target {
        ConnectionTarget::Sqlite(path) => Ok(Box::new(SqliteExecutor::open(path)?)),
        #[cfg(feature = "postgres")]
        ConnectionTarget::Postgres(dsn) => Ok(Box::new(
            crate::backend::postgres::PostgresExecutor::connect(&dsn)?,
        )),
        #[cfg(not(feature = "postgres"))]
        ConnectionTarget::Postgres(_) => Err(ConnectionError::UnsupportedDialect(Dialect::Postgres)),
    }
}
