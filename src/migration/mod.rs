//! Migration system
//!
//! This module provides the infrastructure for schema migrations:
//! - version and file-name helpers
//! - the `Migration` trait, SQL-file units and the registry for Rust units
//! - the ledger table that records applied versions
//! - the `Migrator` engine (`init`, `create`, `up`, `down`, `status`)
//!
//! # Example
//!
//! ```rust,no_run
//! use sluice::backend::sqlite::SqliteExecutor;
//! use sluice::config::MigrationConfig;
//! use sluice::migration::{MigrationKind, MigrationRegistry, Migrator, RunOutcome};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let executor = SqliteExecutor::open("store/app.sqlite")?;
//! let config = MigrationConfig::default();
//! let registry = MigrationRegistry::new();
//! let migrator = Migrator::new(&executor, &config, &registry)?;
//!
//! migrator.init()?;
//! migrator.create("CreateUsers", MigrationKind::Sql)?;
//! match migrator.up(None)? {
//!     RunOutcome::UpToDate => println!("nothing to migrate"),
//!     RunOutcome::Applied(ids) => println!("applied {} migration(s)", ids.len()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod file;
pub mod ledger;
#[allow(clippy::module_inception)]
pub mod migration;
pub mod migrator;
pub mod record;
pub mod registry;
pub mod sql;
pub mod status;
pub mod template;
pub mod version;

pub use error::{MigrationError, VersionScope};
pub use file::{discover_migrations, MigrationFile};
pub use ledger::{Ledger, Order};
pub use migration::{Migration, MigrationConstructor, MigrationContext};
pub use migrator::{MigrationId, Migrator, RunOutcome};
pub use record::MigrationRecord;
pub use registry::MigrationRegistry;
pub use sql::{SqlMigration, SqlScript};
pub use status::{MigrationState, MigrationStatus, MigrationStatusEntry};
pub use version::{
    camel_to_snake, current_version, next_version, parse_file_name, snake_to_camel,
    to_class_identifier, to_file_name, MigrationKind,
};
