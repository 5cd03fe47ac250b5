//! Migration trait definition

use crate::config::MigrationConfig;
use crate::executor::{DbError, DbExecutor};

/// What a unit is handed when the engine instantiates it
///
/// `executor` is the transaction the engine opened for this unit; the ledger
/// write for the unit goes through the same transaction.
#[derive(Clone, Copy)]
pub struct MigrationContext<'a> {
    pub executor: &'a dyn DbExecutor,
    pub config: &'a MigrationConfig,
}

impl<'a> MigrationContext<'a> {
    pub fn new(executor: &'a dyn DbExecutor, config: &'a MigrationConfig) -> Self {
        Self { executor, config }
    }
}

impl std::fmt::Debug for MigrationContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationContext")
            .field("dialect", &self.executor.dialect())
            .field("config", self.config)
            .finish()
    }
}

/// Trait that all migration units implement
///
/// A unit never manages transactions itself: the engine wraps each call in
/// one and commits it together with the ledger write.
pub trait Migration {
    /// Apply the migration (forward migration)
    ///
    /// # Errors
    ///
    /// Any error aborts the run and rolls back this unit's transaction.
    fn apply(&self) -> Result<(), DbError>;

    /// Undo what [`apply`](Migration::apply) did
    ///
    /// # Errors
    ///
    /// Any error aborts the run and rolls back this unit's transaction.
    fn revert(&self) -> Result<(), DbError>;
}

/// Builds a unit bound to the context it should run in
pub type MigrationConstructor = for<'a> fn(MigrationContext<'a>) -> Box<dyn Migration + 'a>;
