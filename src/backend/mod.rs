//! Database backends implementing [`DbExecutor`](crate::executor::DbExecutor).

pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;
