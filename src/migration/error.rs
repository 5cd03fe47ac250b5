//! Migration-specific error types

use std::path::PathBuf;

use thiserror::Error;

use crate::executor::DbError;

/// Which set a target version was looked up in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionScope {
    /// Files on disk with no ledger record
    Pending,
    /// Ledger records
    Applied,
}

impl std::fmt::Display for VersionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionScope::Pending => f.write_str("pending"),
            VersionScope::Applied => f.write_str("applied"),
        }
    }
}

/// Migration-specific errors
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Missing or invalid settings, unreadable migrations path
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Migration name fails identifier validation, or the file name it
    /// renders does not match the canonical pattern
    #[error("Invalid migration name '{0}': only letters [A-Za-z] are allowed")]
    InvalidName(String),

    /// `create` was given a name that an existing file already uses
    #[error("Migration '{name}' already exists: {}", path.display())]
    DuplicateMigration { name: String, path: PathBuf },

    /// Target version absent from the relevant set
    #[error("Version {version} not found among {scope} migrations")]
    VersionNotFound { version: i64, scope: VersionScope },

    /// `down` needs an explicit target
    #[error("Target version required for rollback")]
    TargetRequired,

    /// A unit's apply/revert or the paired ledger write failed; its transaction
    /// was rolled back and the run aborted
    #[error("Migration '{name}' (version {version}) failed during execution: {source}")]
    Execution {
        version: i64,
        name: String,
        #[source]
        source: DbError,
    },

    /// Ledger table cannot be created or queried
    #[error("Migration ledger '{table}' error: {source}")]
    Schema {
        table: String,
        #[source]
        source: DbError,
    },

    /// A ledger record whose migration file is gone from disk
    #[error(
        "Applied migration {version}_{name} has no file in the migrations directory; \
         the ledger and the directory disagree"
    )]
    MissingFile { version: i64, name: String },

    /// Two files on disk share one version
    #[error("Version {version} is used by both {} and {}", first.display(), second.display())]
    DuplicateVersion {
        version: i64,
        first: PathBuf,
        second: PathBuf,
    },

    /// Registering a unit under a version that is already taken
    #[error("Migration '{name}' (version {version}) is already registered")]
    AlreadyRegistered { version: i64, name: String },

    /// A Rust unit file with no registered constructor
    #[error(
        "Migration '{name}' (version {version}) is a Rust unit but nothing is registered \
         for that version"
    )]
    UnregisteredMigration { version: i64, name: String },

    /// Filesystem failure while scanning, reading or writing migration files
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MigrationError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MigrationError::Io {
            path: path.into(),
            source,
        }
    }
}
