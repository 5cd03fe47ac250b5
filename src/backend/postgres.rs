//! PostgreSQL backend using `tokio-postgres`.
//!
//! The engine is blocking and single-threaded, so the async client is driven
//! on a private current-thread runtime: every call is a `block_on`, and the
//! connection task only makes progress while one of those calls is running.

use chrono::{DateTime, NaiveDateTime, Utc};
use tokio::runtime::Runtime;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, NoTls};

use crate::executor::{DbError, DbExecutor, Dialect};
use crate::value::{Row, Value};

/// `DbExecutor` over a single `tokio_postgres::Client`
pub struct PostgresExecutor {
    runtime: Runtime,
    client: Client,
}

impl PostgresExecutor {
    /// Connect using a `postgres://` URI or a key-value connection string
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the runtime cannot be built or the server refuses
    /// the connection.
    pub fn connect(connection_string: &str) -> Result<Self, DbError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DbError::Other(format!("failed to build runtime: {e}")))?;

        let (client, connection) = runtime.block_on(tokio_postgres::connect(connection_string, NoTls))?;
        runtime.spawn(async move {
            if let Err(e) = connection.await {
                log::error!("PostgreSQL connection error: {e}");
            }
        });

        Ok(Self { runtime, client })
    }

    fn to_sql_params(params: &[Value]) -> Vec<Box<dyn ToSql + Sync + Send>> {
        params
            .iter()
            .map(|v| -> Box<dyn ToSql + Sync + Send> {
                match v {
                    Value::Null => Box::new(Option::<String>::None),
                    Value::Int(i) => Box::new(*i),
                    Value::Text(s) => Box::new(s.clone()),
                    Value::Timestamp(ts) => Box::new(ts.naive_utc()),
                }
            })
            .collect()
    }

    fn convert_row(pg_row: &tokio_postgres::Row) -> Result<Row, DbError> {
        let columns: Vec<String> = pg_row
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let mut values = Vec::with_capacity(columns.len());
        for (i, col) in pg_row.columns().iter().enumerate() {
            let value = match *col.type_() {
                Type::INT2 => pg_row
                    .try_get::<_, Option<i16>>(i)?
                    .map_or(Value::Null, |v| Value::Int(i64::from(v))),
                Type::INT4 => pg_row
                    .try_get::<_, Option<i32>>(i)?
                    .map_or(Value::Null, |v| Value::Int(i64::from(v))),
                Type::INT8 => pg_row
                    .try_get::<_, Option<i64>>(i)?
                    .map_or(Value::Null, Value::Int),
                Type::BOOL => pg_row
                    .try_get::<_, Option<bool>>(i)?
                    .map_or(Value::Null, |v| Value::Int(i64::from(v))),
                Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => pg_row
                    .try_get::<_, Option<String>>(i)?
                    .map_or(Value::Null, Value::Text),
                Type::TIMESTAMP => pg_row
                    .try_get::<_, Option<NaiveDateTime>>(i)?
                    .map_or(Value::Null, |v| Value::Timestamp(v.and_utc())),
                Type::TIMESTAMPTZ => pg_row
                    .try_get::<_, Option<DateTime<Utc>>>(i)?
                    .map_or(Value::Null, Value::Timestamp),
                ref other => {
                    return Err(DbError::Decode(format!(
                        "column '{}' has unsupported type {other}",
                        col.name()
                    )))
                }
            };
            values.push(value);
        }

        Ok(Row::new(columns, values))
    }
}

impl DbExecutor for PostgresExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn execute(&self, query: &str, params: &[Value]) -> Result<u64, DbError> {
        let boxed = Self::to_sql_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> = boxed.iter().map(|b| b.as_ref() as _).collect();
        let affected = self.runtime.block_on(self.client.execute(query, &refs))?;
        Ok(affected)
    }

    fn query_all(&self, query: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        let boxed = Self::to_sql_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> = boxed.iter().map(|b| b.as_ref() as _).collect();
        let rows = self.runtime.block_on(self.client.query(query, &refs))?;
        rows.iter().map(Self::convert_row).collect()
    }

    fn execute_batch(&self, script: &str) -> Result<(), DbError> {
        self.runtime.block_on(self.client.batch_execute(script))?;
        Ok(())
    }
}
