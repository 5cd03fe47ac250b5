//! # Sluice
//!
//! Versioned schema migrations over a blocking SQL connection.
//!
//! Migration files live in one directory, named `<YYYYMMDDHHMMSS>_<name>.sql`
//! (or `.rs` for units compiled into the binary). A ledger table records which
//! versions are applied; [`Migrator`] reconciles the two and applies or
//! reverts the difference, one transaction per unit.
//!
//! SQLite is always available; PostgreSQL needs the `postgres` feature.

pub mod backend;
pub mod config;
pub mod connection;
pub mod executor;
pub mod migration;
pub mod transaction;
pub mod value;

pub use config::{DatabaseConfig, MigrationConfig, SluiceConfig};
pub use connection::{connect, ConnectionError};
pub use executor::{DbError, DbExecutor, Dialect};
pub use migration::{
    Migration, MigrationContext, MigrationError, MigrationKind, MigrationRegistry, Migrator,
    RunOutcome,
};
pub use transaction::Transaction;
pub use value::{Row, Value};
