//! Migration registry for Rust units
//!
//! Rust migration units are compiled into the binary, so the engine cannot
//! load them from their files. Applications register a constructor for each
//! one under its version at startup and hand the registry to the
//! [`Migrator`](crate::migration::Migrator).
//!
//! ```rust,no_run
//! use sluice::migration::{Migration, MigrationContext, MigrationRegistry};
//! use sluice::DbError;
//!
//! struct CreateUsers<'a> {
//!     ctx: MigrationContext<'a>,
//! }
//!
//! impl Migration for CreateUsers<'_> {
//!     fn apply(&self) -> Result<(), DbError> {
//!         self.ctx
//!             .executor
//!             .execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY)")
//!     }
//!
//!     fn revert(&self) -> Result<(), DbError> {
//!         self.ctx.executor.execute_batch("DROP TABLE users")
//!     }
//! }
//!
//! fn create_users<'a>(ctx: MigrationContext<'a>) -> Box<dyn Migration + 'a> {
//!     Box::new(CreateUsers { ctx })
//! }
//!
//! let mut registry = MigrationRegistry::new();
//! registry.register(20240120120000, "create_users", create_users).unwrap();
//! ```

use std::collections::BTreeMap;

use crate::migration::{Migration, MigrationConstructor, MigrationContext, MigrationError};

#[derive(Clone)]
struct Entry {
    name: String,
    constructor: MigrationConstructor,
}

/// Constructors for Rust migration units, keyed by version
#[derive(Clone, Default)]
pub struct MigrationRegistry {
    entries: BTreeMap<i64, Entry>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit constructor under `version`
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::AlreadyRegistered` if the version is taken.
    pub fn register(
        &mut self,
        version: i64,
        name: impl Into<String>,
        constructor: MigrationConstructor,
    ) -> Result<(), MigrationError> {
        let name = name.into();
        if let Some(existing) = self.entries.get(&version) {
            return Err(MigrationError::AlreadyRegistered {
                version,
                name: existing.name.clone(),
            });
        }
        self.entries.insert(version, Entry { name, constructor });
        Ok(())
    }

    pub fn is_registered(&self, version: i64) -> bool {
        self.entries.contains_key(&version)
    }

    /// Name the unit was registered with
    pub fn name(&self, version: i64) -> Option<&str> {
        self.entries.get(&version).map(|e| e.name.as_str())
    }

    /// Registered versions, ascending
    pub fn versions(&self) -> Vec<i64> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build the unit registered for `version`, bound to `ctx`
    pub fn instantiate<'a>(&self, version: i64, ctx: MigrationContext<'a>) -> Option<Box<dyn Migration + 'a>> {
        self.entries.get(&version).map(|e| (e.constructor)(ctx))
    }
}

impl std::fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(v, e)| (v, &e.name)))
            .finish()
    }
}
