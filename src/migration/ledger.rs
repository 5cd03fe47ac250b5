//! Migration ledger - the table recording which versions are applied
//!
//! Every method takes the executor to run on, so `record`/`unrecord` can be
//! issued on the same [`Transaction`](crate::transaction::Transaction) as the
//! unit they belong to.

use chrono::{DateTime, Utc};

use crate::config::validate_table_name;
use crate::executor::{DbError, DbExecutor, Dialect};
use crate::migration::template::ledger_ddl;
use crate::migration::{MigrationError, MigrationRecord};
use crate::value::Value;

/// Sort order for [`Ledger::list_applied`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

impl Order {
    fn sql(self) -> &'static str {
        match self {
            Order::Ascending => "ASC",
            Order::Descending => "DESC",
        }
    }
}

/// Handle on the ledger table
#[derive(Debug, Clone)]
pub struct Ledger {
    table: String,
}

impl Ledger {
    /// # Errors
    ///
    /// Returns `MigrationError::Configuration` if `table` is not a plain identifier.
    pub fn new(table: impl Into<String>) -> Result<Self, MigrationError> {
        let table = table.into();
        validate_table_name(&table)?;
        Ok(Self { table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn schema_error(&self, source: DbError) -> MigrationError {
        MigrationError::Schema {
            table: self.table.clone(),
            source,
        }
    }

    /// Create the ledger table if absent
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Schema` if the DDL fails.
    pub fn ensure_schema(&self, executor: &dyn DbExecutor) -> Result<(), MigrationError> {
        let ddl = ledger_ddl(executor.dialect(), &self.table);
        executor
            .execute_batch(&ddl)
            .map_err(|e| self.schema_error(e))?;
        log::debug!("ledger table '{}' is in place", self.table);
        Ok(())
    }

    /// Whether the ledger table exists
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Schema` if the catalog query fails.
    pub fn exists(&self, executor: &dyn DbExecutor) -> Result<bool, MigrationError> {
        let row = executor
            .query_one(exists_query(executor.dialect()), &[Value::from(self.table.as_str())])
            .map_err(|e| self.schema_error(e))?;
        let count = row.get_i64(0).map_err(|e| self.schema_error(e))?;
        Ok(count > 0)
    }

    /// All applied migrations, ordered by version
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Schema` if the query fails or a row cannot be decoded.
    pub fn list_applied(
        &self,
        executor: &dyn DbExecutor,
        order: Order,
    ) -> Result<Vec<MigrationRecord>, MigrationError> {
        let sql = format!(
            "SELECT version, name, start_time, end_time FROM {} ORDER BY version {}",
            self.table,
            order.sql()
        );
        let rows = executor
            .query_all(&sql, &[])
            .map_err(|e| self.schema_error(e))?;

        rows.iter()
            .map(|row| MigrationRecord::from_row(row).map_err(|e| self.schema_error(e)))
            .collect()
    }

    /// Insert the ledger row for an applied unit; `end_time` is now
    ///
    /// # Errors
    ///
    /// Returns the driver error; the caller owns the transaction.
    pub fn record(
        &self,
        executor: &dyn DbExecutor,
        version: i64,
        name: &str,
        started_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let dialect = executor.dialect();
        let sql = format!(
            "INSERT INTO {} (version, name, start_time, end_time, breakpoint) VALUES ({}, {}, {}, {}, 0)",
            self.table,
            dialect.placeholder(1),
            dialect.placeholder(2),
            dialect.placeholder(3),
            dialect.placeholder(4),
        );
        executor.execute(
            &sql,
            &[
                Value::Int(version),
                Value::from(name),
                Value::Timestamp(started_at),
                Value::Timestamp(Utc::now()),
            ],
        )?;
        Ok(())
    }

    /// Delete the ledger row for a reverted unit
    ///
    /// # Errors
    ///
    /// Returns the driver error, or `DbError::Query` if no row matched.
    pub fn unrecord(&self, executor: &dyn DbExecutor, version: i64) -> Result<(), DbError> {
        let sql = format!(
            "DELETE FROM {} WHERE version = {}",
            self.table,
            executor.dialect().placeholder(1)
        );
        let affected = executor.execute(&sql, &[Value::Int(version)])?;
        if affected == 0 {
            return Err(DbError::Query(format!(
                "no ledger row for version {version} in '{}'",
                self.table
            )));
        }
        Ok(())
    }
}

// Unquoted identifiers fold to lower case in Postgres and match any case in SQLite.
fn exists_query(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Sqlite => {
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE"
        }
        Dialect::Postgres => {
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name::text = lower($1)"
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::backend::sqlite::SqliteExecutor;
    use crate::value::Row;

    /// Answers catalog lookups the way a Postgres server would for tables
    /// created with unquoted names
    struct PostgresCatalog {
        tables: Vec<&'static str>,
        queries: RefCell<Vec<String>>,
    }

    impl DbExecutor for PostgresCatalog {
        fn dialect(&self) -> Dialect {
            Dialect::Postgres
        }

        fn execute(&self, _query: &str, _params: &[Value]) -> Result<u64, DbError> {
            Ok(0)
        }

        fn query_all(&self, query: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
            self.queries.borrow_mut().push(query.to_string());
            let Some(Value::Text(name)) = params.first() else {
                return Err(DbError::Query("expected a text parameter".to_string()));
            };
            let name = if query.contains("lower($1)") {
                name.to_lowercase()
            } else {
                name.clone()
            };
            let count = self.tables.iter().filter(|t| **t == name).count() as i64;
            Ok(vec![Row::new(vec!["count".to_string()], vec![Value::Int(count)])])
        }

        fn execute_batch(&self, _script: &str) -> Result<(), DbError> {
            Ok(())
        }
    }

    fn ledger_on(executor: &SqliteExecutor) -> Ledger {
        let ledger = Ledger::new("migrations").unwrap();
        ledger.ensure_schema(executor).unwrap();
        ledger
    }

    #[test]
    fn test_new_rejects_bad_table_name() {
        assert!(matches!(
            Ledger::new("drop table;"),
            Err(MigrationError::Configuration(_))
        ));
    }

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let executor = SqliteExecutor::memory().unwrap();
        let ledger = Ledger::new("schema_log").unwrap();
        assert!(!ledger.exists(&executor).unwrap());
        ledger.ensure_schema(&executor).unwrap();
        ledger.ensure_schema(&executor).unwrap();
        assert!(ledger.exists(&executor).unwrap());
        assert!(ledger.list_applied(&executor, Order::Ascending).unwrap().is_empty());
    }

    #[test]
    fn test_record_and_list_in_both_orders() {
        let executor = SqliteExecutor::memory().unwrap();
        let ledger = ledger_on(&executor);
        let started = Utc::now();
        ledger.record(&executor, 20230102000000, "add_index", started).unwrap();
        ledger.record(&executor, 20230101000000, "init", started).unwrap();

        let asc = ledger.list_applied(&executor, Order::Ascending).unwrap();
        assert_eq!(
            asc.iter().map(|r| r.version).collect::<Vec<_>>(),
            vec![20230101000000, 20230102000000]
        );
        assert_eq!(asc[0].name, "init");
        assert!(asc[0].end_time >= asc[0].start_time);

        let desc = ledger.list_applied(&executor, Order::Descending).unwrap();
        assert_eq!(desc[0].version, 20230102000000);
    }

    #[test]
    fn test_versions_are_unique() {
        let executor = SqliteExecutor::memory().unwrap();
        let ledger = ledger_on(&executor);
        ledger.record(&executor, 1, "init", Utc::now()).unwrap();
        assert!(ledger.record(&executor, 1, "init", Utc::now()).is_err());
    }

    #[test]
    fn test_unrecord() {
        let executor = SqliteExecutor::memory().unwrap();
        let ledger = ledger_on(&executor);
        ledger.record(&executor, 1, "init", Utc::now()).unwrap();
        ledger.unrecord(&executor, 1).unwrap();
        assert!(ledger.list_applied(&executor, Order::Ascending).unwrap().is_empty());
        assert!(ledger.unrecord(&executor, 1).is_err());
    }

    #[test]
    fn test_postgres_exists_folds_mixed_case_names() {
        let catalog = PostgresCatalog {
            tables: vec!["schemalog"],
            queries: RefCell::new(Vec::new()),
        };
        assert!(Ledger::new("SchemaLog").unwrap().exists(&catalog).unwrap());
        assert!(Ledger::new("schemalog").unwrap().exists(&catalog).unwrap());
        assert!(!Ledger::new("other_log").unwrap().exists(&catalog).unwrap());

        let queries = catalog.queries.borrow();
        assert!(queries[0].contains("information_schema.tables"));
        assert!(queries[0].contains("current_schema()"));
    }

    #[test]
    fn test_sqlite_exists_ignores_case() {
        let executor = SqliteExecutor::memory().unwrap();
        Ledger::new("SchemaLog").unwrap().ensure_schema(&executor).unwrap();
        assert!(Ledger::new("SchemaLog").unwrap().exists(&executor).unwrap());
        assert!(Ledger::new("schemalog").unwrap().exists(&executor).unwrap());
    }
}
