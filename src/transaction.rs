//! Transaction support on top of any [`DbExecutor`].
//!
//! A [`Transaction`] borrows the connection it was started on and is itself a
//! `DbExecutor`, so code written against the trait runs inside it unchanged.
//! Statements go to the same connection; `BEGIN`/`COMMIT`/`ROLLBACK` bracket
//! them.

use crate::executor::{DbError, DbExecutor, Dialect};
use crate::value::{Row, Value};

/// An open database transaction
///
/// Dropping a transaction that was neither committed nor rolled back rolls
/// it back.
///
/// # Examples
///
/// ```no_run
/// use sluice::backend::sqlite::SqliteExecutor;
/// use sluice::transaction::Transaction;
/// use sluice::{DbExecutor, Value};
///
/// # fn main() -> Result<(), sluice::DbError> {
/// let executor = SqliteExecutor::memory()?;
/// executor.execute_batch("CREATE TABLE users (name TEXT)")?;
///
/// let tx = Transaction::begin(&executor)?;
/// tx.execute("INSERT INTO users (name) VALUES (?1)", &[Value::from("Alice")])?;
/// tx.commit()?;
/// # Ok(())
/// # }
/// ```
pub struct Transaction<'a> {
    executor: &'a dyn DbExecutor,
    closed: bool,
}

impl<'a> Transaction<'a> {
    /// Start a transaction on `executor`
    ///
    /// # Errors
    ///
    /// Returns `DbError` if `BEGIN` fails (for example when a transaction is
    /// already open on the connection).
    pub fn begin(executor: &'a dyn DbExecutor) -> Result<Self, DbError> {
        executor.execute_batch("BEGIN")?;
        log::trace!("transaction started");
        Ok(Self {
            executor,
            closed: false,
        })
    }

    /// Commit all changes made within the transaction
    ///
    /// # Errors
    ///
    /// Returns `DbError` if `COMMIT` fails; the transaction is then rolled
    /// back on drop.
    pub fn commit(mut self) -> Result<(), DbError> {
        self.executor.execute_batch("COMMIT")?;
        self.closed = true;
        log::trace!("transaction committed");
        Ok(())
    }

    /// Discard all changes made within the transaction
    ///
    /// # Errors
    ///
    /// Returns `DbError` if `ROLLBACK` fails. The transaction is closed either way.
    pub fn rollback(mut self) -> Result<(), DbError> {
        self.closed = true;
        self.executor.execute_batch("ROLLBACK")?;
        log::trace!("transaction rolled back");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        log::warn!("transaction dropped without commit, rolling back");
        if let Err(e) = self.executor.execute_batch("ROLLBACK") {
            log::error!("implicit rollback failed: {e}");
        }
    }
}

impl DbExecutor for Transaction<'_> {
    fn dialect(&self) -> Dialect {
        self.executor.dialect()
    }

    fn execute(&self, query: &str, params: &[Value]) -> Result<u64, DbError> {
        self.executor.execute(query, params)
    }

    fn query_all(&self, query: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        self.executor.query_all(query, params)
    }

    fn execute_batch(&self, script: &str) -> Result<(), DbError> {
        self.executor.execute_batch(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::sqlite::SqliteExecutor;

    fn count(executor: &dyn DbExecutor) -> i64 {
        executor
            .query_one("SELECT COUNT(*) FROM items", &[])
            .and_then(|row| row.get_i64(0))
            .unwrap()
    }

    fn setup() -> SqliteExecutor {
        let executor = SqliteExecutor::memory().unwrap();
        executor
            .execute_batch("CREATE TABLE items (id INTEGER NOT NULL)")
            .unwrap();
        executor
    }

    #[test]
    fn test_commit_persists_changes() {
        let executor = setup();
        let tx = Transaction::begin(&executor).unwrap();
        tx.execute("INSERT INTO items (id) VALUES (?1)", &[Value::Int(1)])
            .unwrap();
        tx.commit().unwrap();
        assert_eq!(count(&executor), 1);
    }

    #[test]
    fn test_rollback_discards_changes() {
        let executor = setup();
        let tx = Transaction::begin(&executor).unwrap();
        tx.execute("INSERT INTO items (id) VALUES (?1)", &[Value::Int(1)])
            .unwrap();
        tx.rollback().unwrap();
        assert_eq!(count(&executor), 0);
    }

    #[test]
    fn test_drop_rolls_back_open_transaction() {
        let executor = setup();
        {
            let tx = Transaction::begin(&executor).unwrap();
            tx.execute("INSERT INTO items (id) VALUES (?1)", &[Value::Int(1)])
                .unwrap();
            assert!(!tx.is_closed());
        }
        assert_eq!(count(&executor), 0);
        // The connection is usable for a new transaction afterwards.
        let tx = Transaction::begin(&executor).unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn test_ddl_is_transactional() {
        let executor = setup();
        let tx = Transaction::begin(&executor).unwrap();
        tx.execute_batch("CREATE TABLE scratch (id INTEGER)").unwrap();
        tx.rollback().unwrap();
        assert!(executor.query_all("SELECT * FROM scratch", &[]).is_err());
    }

    #[test]
    fn test_dialect_is_forwarded() {
        let executor = setup();
        let tx = Transaction::begin(&executor).unwrap();
        assert_eq!(tx.dialect(), Dialect::Sqlite);
    }

    #[test]
    fn test_failed_commit_rolls_back() {
        let executor = SqliteExecutor::memory().unwrap();
        executor
            .execute_batch(
                "PRAGMA foreign_keys = ON;
                 CREATE TABLE parent (id INTEGER PRIMARY KEY);
                 CREATE TABLE child (
                     id INTEGER PRIMARY KEY,
                     parent_id INTEGER REFERENCES parent (id) DEFERRABLE INITIALLY DEFERRED
                 );",
            )
            .unwrap();

        let tx = Transaction::begin(&executor).unwrap();
        tx.execute("INSERT INTO child (id, parent_id) VALUES (?1, ?2)", &[Value::Int(1), Value::Int(42)])
            .unwrap();
        // the deferred foreign key check fails at COMMIT and leaves the transaction open
        assert!(tx.commit().is_err());

        let rows = executor.query_all("SELECT id FROM child", &[]).unwrap();
        assert!(rows.is_empty());
        let tx = Transaction::begin(&executor).unwrap();
        tx.commit().unwrap();
    }
}
