//! Migration file discovery

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::migration::version::{parse_file_name_with_kind, MigrationKind};
use crate::migration::MigrationError;

/// A migration file found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// Path to the migration file
    pub path: PathBuf,

    /// Migration version (timestamp: YYYYMMDDHHMMSS)
    pub version: i64,

    /// Snake-case name taken from the file name
    pub name: String,

    /// SQL script or registered Rust unit
    pub kind: MigrationKind,
}

fn unreadable(dir: &Path, err: std::io::Error) -> MigrationError {
    MigrationError::Configuration(format!(
        "Path {} to migrations directory cannot be read: {err}",
        dir.display()
    ))
}

/// Discover all migration files in a directory
///
/// Entries whose names do not match `<14 digits>_<name>.(sql|rs)` are skipped.
/// The result is sorted by version, oldest first.
///
/// # Errors
///
/// Returns `MigrationError::Configuration` if the directory is missing or
/// cannot be read, and
/// `MigrationError::DuplicateVersion` if two files share a version.
pub fn discover_migrations(migrations_dir: &Path) -> Result<Vec<MigrationFile>, MigrationError> {
    if !migrations_dir.is_dir() {
        return Err(MigrationError::Configuration(format!(
            "Path {} to migrations directory not found. Use init command",
            migrations_dir.display()
        )));
    }

    let entries = fs::read_dir(migrations_dir).map_err(|e| unreadable(migrations_dir, e))?;

    let mut by_version: BTreeMap<i64, MigrationFile> = BTreeMap::new();
    for entry in entries {
        let entry = entry.map_err(|e| unreadable(migrations_dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some((version, name, kind)) = parse_file_name_with_kind(file_name) else {
            log::debug!("skipping {file_name}: not a migration file");
            continue;
        };

        if let Some(existing) = by_version.get(&version) {
            // Report in a stable order regardless of directory enumeration.
            let (first, second) = if existing.path <= path {
                (existing.path.clone(), path)
            } else {
                (path, existing.path.clone())
            };
            return Err(MigrationError::DuplicateVersion { version, first, second });
        }

        by_version.insert(
            version,
            MigrationFile {
                path,
                version,
                name,
                kind,
            },
        );
    }

    log::debug!(
        "found {} migration file(s) in {}",
        by_version.len(),
        migrations_dir.display()
    );
    Ok(by_version.into_values().collect())
}
