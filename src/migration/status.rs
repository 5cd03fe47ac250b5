//! Migration status reporting

use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// Whether a file on disk has a ledger record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationState {
    Applied { applied_at: DateTime<Utc> },
    Pending,
}

/// One migration file and its state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatusEntry {
    pub version: i64,
    pub name: String,
    pub path: PathBuf,
    pub state: MigrationState,
}

impl MigrationStatusEntry {
    pub fn is_applied(&self) -> bool {
        matches!(self.state, MigrationState::Applied { .. })
    }

    pub fn applied_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            MigrationState::Applied { applied_at } => Some(applied_at),
            MigrationState::Pending => None,
        }
    }
}

/// Migration status information, one entry per file in version order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub entries: Vec<MigrationStatusEntry>,

    /// Total number of migration files
    pub total: usize,

    pub applied_count: usize,

    pub pending_count: usize,
}

impl MigrationStatus {
    #[must_use]
    pub fn new(entries: Vec<MigrationStatusEntry>) -> Self {
        let applied_count = entries.iter().filter(|e| e.is_applied()).count();
        let total = entries.len();
        Self {
            entries,
            total,
            applied_count,
            pending_count: total - applied_count,
        }
    }

    pub fn applied(&self) -> impl Iterator<Item = &MigrationStatusEntry> {
        self.entries.iter().filter(|e| e.is_applied())
    }

    pub fn pending(&self) -> impl Iterator<Item = &MigrationStatusEntry> {
        self.entries.iter().filter(|e| !e.is_applied())
    }

    /// Check if all migrations are applied
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.pending_count == 0
    }

    #[must_use]
    pub fn latest_applied_version(&self) -> Option<i64> {
        self.applied().map(|e| e.version).max()
    }

    /// The version `up` would apply first
    #[must_use]
    pub fn next_pending_version(&self) -> Option<i64> {
        self.pending().map(|e| e.version).min()
    }
}
