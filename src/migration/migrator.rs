//! Migrator - core migration execution engine
//!
//! Every run reconciles the migration files on disk against the ledger from
//! scratch; nothing is cached between calls. Each unit runs in its own
//! transaction together with its ledger write, and the first failure aborts
//! the run.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::config::MigrationConfig;
use crate::executor::{DbError, DbExecutor};
use crate::migration::file::discover_migrations;
use crate::migration::ledger::{Ledger, Order};
use crate::migration::sql::{SqlMigration, SqlScript};
use crate::migration::status::{MigrationState, MigrationStatus, MigrationStatusEntry};
use crate::migration::template::{migration_template, render};
use crate::migration::version::{camel_to_snake, next_version, to_class_identifier, to_file_name, MigrationKind};
use crate::migration::{
    Migration, MigrationContext, MigrationError, MigrationFile, MigrationRecord, MigrationRegistry,
    VersionScope,
};
use crate::transaction::Transaction;

/// Version and name of a processed migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationId {
    pub version: i64,
    pub name: String,
}

impl fmt::Display for MigrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.version, self.name)
    }
}

impl From<&MigrationFile> for MigrationId {
    fn from(file: &MigrationFile) -> Self {
        Self {
            version: file.version,
            name: file.name.clone(),
        }
    }
}

/// Result of [`Migrator::up`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every file on disk already has a ledger record
    UpToDate,
    /// Units applied in this run, in order
    Applied(Vec<MigrationId>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

/// Where a planned unit's code comes from
enum UnitSource {
    Registered,
    Sql(SqlScript),
}

struct PlannedUnit {
    file: MigrationFile,
    source: UnitSource,
}

/// Core migration execution engine
pub struct Migrator<'a> {
    executor: &'a dyn DbExecutor,
    config: &'a MigrationConfig,
    registry: &'a MigrationRegistry,
    ledger: Ledger,
}

impl<'a> Migrator<'a> {
    /// # Errors
    ///
    /// Returns `MigrationError::Configuration` if the configured ledger table
    /// name is not a plain identifier.
    pub fn new(
        executor: &'a dyn DbExecutor,
        config: &'a MigrationConfig,
        registry: &'a MigrationRegistry,
    ) -> Result<Self, MigrationError> {
        Ok(Self {
            executor,
            config,
            registry,
            ledger: Ledger::new(config.table.as_str())?,
        })
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.config.path
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Scan the migrations directory
    ///
    /// # Errors
    ///
    /// See [`discover_migrations`].
    pub fn discover(&self) -> Result<Vec<MigrationFile>, MigrationError> {
        discover_migrations(self.migrations_dir())
    }

    /// Create the migrations directory and the ledger table if missing
    ///
    /// Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Io` if the directory cannot be created and
    /// `MigrationError::Schema` if the ledger DDL fails.
    pub fn init(&self) -> Result<(), MigrationError> {
        let dir = self.migrations_dir();
        if !dir.is_dir() {
            fs::create_dir_all(dir).map_err(|e| MigrationError::io(dir, e))?;
            log::info!("Created migrations directory: {}", dir.display());
        }

        self.ledger.ensure_schema(self.executor)?;
        log::info!("Migration ledger table '{}' is ready", self.ledger.table());
        Ok(())
    }

    /// Write a new migration file from the template for `kind`
    ///
    /// Returns the path of the new file.
    ///
    /// # Errors
    ///
    /// - `MigrationError::InvalidName` if `name` is not letters only
    /// - `MigrationError::DuplicateMigration` if a file already uses the name
    /// - `MigrationError::Configuration` if the directory is missing (run `init`)
    /// - `MigrationError::Io` if the file cannot be written
    pub fn create(&self, name: &str, kind: MigrationKind) -> Result<PathBuf, MigrationError> {
        let class = to_class_identifier(name)?;
        let snake = camel_to_snake(&class);

        let files = self.discover()?;
        if let Some(existing) = files.iter().find(|f| f.name == snake) {
            return Err(MigrationError::DuplicateMigration {
                name: class,
                path: existing.path.clone(),
            });
        }

        let version = next_version(files.last().map(|f| f.version));
        let path = self.migrations_dir().join(to_file_name(version, &class, kind)?);
        let version_text = version.to_string();
        let created_at = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
        let content = render(
            migration_template(kind),
            &[
                ("namespace", self.config.namespace.as_str()),
                ("class", class.as_str()),
                ("version", version_text.as_str()),
                ("name", snake.as_str()),
                ("created_at", created_at.as_str()),
            ],
        );

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| MigrationError::io(&path, e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| MigrationError::io(&path, e))?;

        log::info!("Created migration {}", path.display());
        Ok(path)
    }

    /// Files on disk and ledger records, checked against each other
    ///
    /// A missing ledger table reads as an empty ledger.
    fn reconcile(&self) -> Result<(Vec<MigrationFile>, Vec<MigrationRecord>), MigrationError> {
        let files = self.discover()?;
        let applied = if self.ledger.exists(self.executor)? {
            self.ledger.list_applied(self.executor, Order::Ascending)?
        } else {
            log::debug!("ledger table '{}' does not exist yet", self.ledger.table());
            Vec::new()
        };

        for record in &applied {
            match files.iter().find(|f| f.version == record.version) {
                None => {
                    return Err(MigrationError::MissingFile {
                        version: record.version,
                        name: record.name.clone(),
                    })
                }
                Some(file) if file.name != record.name => log::warn!(
                    "version {} is recorded as '{}' but the file is named '{}'",
                    record.version,
                    record.name,
                    file.name
                ),
                Some(_) => {}
            }
        }

        Ok((files, applied))
    }

    /// Migrations `up(target)` would apply, in order, without applying them
    ///
    /// A file is pending when no ledger row carries its version; names are
    /// not compared, so renaming an applied file does not re-apply it. An
    /// empty plan means everything on disk is applied.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::VersionNotFound` if `target` is not pending,
    /// plus any scan or ledger error.
    pub fn plan_up(&self, target: Option<i64>) -> Result<Vec<MigrationFile>, MigrationError> {
        let (files, applied) = self.reconcile()?;
        let highest = files.last().map(|f| f.version);
        let applied: HashSet<i64> = applied.iter().map(|r| r.version).collect();
        let mut pending: Vec<MigrationFile> =
            files.into_iter().filter(|f| !applied.contains(&f.version)).collect();

        if pending.is_empty() {
            return Ok(pending);
        }

        let target = match target {
            Some(version) if pending.iter().any(|f| f.version == version) => version,
            Some(version) => {
                return Err(MigrationError::VersionNotFound {
                    version,
                    scope: VersionScope::Pending,
                })
            }
            None => highest.unwrap_or(i64::MAX),
        };

        pending.retain(|f| f.version <= target);
        log::debug!("{} migration(s) to apply up to {target}", pending.len());
        Ok(pending)
    }

    /// Migrations `down(target)` would revert, newest first, without
    /// reverting them
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::TargetRequired` without a target and
    /// `MigrationError::VersionNotFound` if `target` is not applied.
    pub fn plan_down(&self, target: Option<i64>) -> Result<Vec<MigrationFile>, MigrationError> {
        let target = target.ok_or(MigrationError::TargetRequired)?;
        let (files, applied) = self.reconcile()?;

        if !applied.iter().any(|r| r.version == target) {
            return Err(MigrationError::VersionNotFound {
                version: target,
                scope: VersionScope::Applied,
            });
        }

        let mut by_version: HashMap<i64, MigrationFile> =
            files.into_iter().map(|f| (f.version, f)).collect();
        let plan: Vec<MigrationFile> = applied
            .iter()
            .rev()
            .take_while(|r| r.version >= target)
            .filter_map(|r| by_version.remove(&r.version))
            .collect();

        log::debug!("{} migration(s) to revert down to {target}", plan.len());
        Ok(plan)
    }

    /// Apply pending migrations in version order, up to and including `target`
    ///
    /// Without a target every pending migration is applied.
    ///
    /// # Errors
    ///
    /// Any planning error, `MigrationError::UnregisteredMigration` for a Rust
    /// unit with no constructor (checked before anything runs), and
    /// `MigrationError::Execution` for the first unit that fails. Units
    /// committed earlier in the run stay applied.
    pub fn up(&self, target: Option<i64>) -> Result<RunOutcome, MigrationError> {
        let plan = self.plan_up(target)?;
        if plan.is_empty() {
            log::info!("Nothing to migrate");
            return Ok(RunOutcome::UpToDate);
        }

        let units = self.resolve(plan)?;
        if !self.ledger.exists(self.executor)? {
            self.ledger.ensure_schema(self.executor)?;
        }

        let mut applied = Vec::with_capacity(units.len());
        for unit in &units {
            let start = Instant::now();
            log::info!("Applying {}_{}", unit.file.version, unit.file.name);
            self.run_unit(unit, Direction::Up)?;
            log::info!(
                "Applied {}_{} in {} ms",
                unit.file.version,
                unit.file.name,
                start.elapsed().as_millis()
            );
            applied.push(MigrationId::from(&unit.file));
        }

        Ok(RunOutcome::Applied(applied))
    }

    /// Revert applied migrations newest first, down to and including `target`
    ///
    /// Returns the reverted migrations in the order they were processed.
    ///
    /// # Errors
    ///
    /// See [`plan_down`](Self::plan_down) and [`up`](Self::up).
    pub fn down(&self, target: Option<i64>) -> Result<Vec<MigrationId>, MigrationError> {
        let units = self.resolve(self.plan_down(target)?)?;

        let mut reverted = Vec::with_capacity(units.len());
        for unit in &units {
            let start = Instant::now();
            log::info!("Reverting {}_{}", unit.file.version, unit.file.name);
            self.run_unit(unit, Direction::Down)?;
            log::info!(
                "Reverted {}_{} in {} ms",
                unit.file.version,
                unit.file.name,
                start.elapsed().as_millis()
            );
            reverted.push(MigrationId::from(&unit.file));
        }

        Ok(reverted)
    }

    /// Applied/pending state of every migration file on disk
    ///
    /// Read-only.
    ///
    /// # Errors
    ///
    /// Any scan or ledger error, including `MigrationError::MissingFile`.
    pub fn status(&self) -> Result<MigrationStatus, MigrationError> {
        let (files, applied) = self.reconcile()?;
        let applied_at: HashMap<i64, DateTime<Utc>> =
            applied.iter().map(|r| (r.version, r.applied_at())).collect();

        let entries = files
            .into_iter()
            .map(|file| {
                let state = match applied_at.get(&file.version) {
                    Some(at) => MigrationState::Applied { applied_at: *at },
                    None => MigrationState::Pending,
                };
                MigrationStatusEntry {
                    version: file.version,
                    name: file.name,
                    path: file.path,
                    state,
                }
            })
            .collect();

        Ok(MigrationStatus::new(entries))
    }

    /// Find the code for every planned unit before any of them runs
    fn resolve(&self, plan: Vec<MigrationFile>) -> Result<Vec<PlannedUnit>, MigrationError> {
        plan.into_iter()
            .map(|file| {
                let source = if self.registry.is_registered(file.version) {
                    UnitSource::Registered
                } else {
                    match file.kind {
                        MigrationKind::Sql => UnitSource::Sql(SqlScript::load(&file.path)?),
                        MigrationKind::Rust => {
                            return Err(MigrationError::UnregisteredMigration {
                                version: file.version,
                                name: file.name,
                            })
                        }
                    }
                };
                Ok(PlannedUnit { file, source })
            })
            .collect()
    }

    fn instantiate<'t>(
        &self,
        unit: &PlannedUnit,
        executor: &'t dyn DbExecutor,
    ) -> Result<Box<dyn Migration + 't>, DbError>
    where
        'a: 't,
    {
        match &unit.source {
            UnitSource::Registered => self
                .registry
                .instantiate(unit.file.version, MigrationContext::new(executor, self.config))
                .ok_or_else(|| {
                    DbError::Other(format!("no unit registered for version {}", unit.file.version))
                }),
            UnitSource::Sql(script) => Ok(Box::new(SqlMigration::new(
                unit.file.name.clone(),
                script.clone(),
                executor,
            ))),
        }
    }

    /// Unit plus ledger write, in one transaction
    fn run_unit(&self, unit: &PlannedUnit, direction: Direction) -> Result<(), MigrationError> {
        let fail = |source: DbError| MigrationError::Execution {
            version: unit.file.version,
            name: unit.file.name.clone(),
            source,
        };

        let started_at = Utc::now();
        let tx = Transaction::begin(self.executor).map_err(fail)?;
        let result = self.execute_in(&tx, unit, direction, started_at);
        match result {
            Ok(()) => tx.commit().map_err(fail),
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    log::error!(
                        "rollback of {}_{} failed: {rollback_err}",
                        unit.file.version,
                        unit.file.name
                    );
                }
                Err(fail(err))
            }
        }
    }

    fn execute_in(
        &self,
        tx: &Transaction<'_>,
        unit: &PlannedUnit,
        direction: Direction,
        started_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let migration = self.instantiate(unit, tx)?;
        match direction {
            Direction::Up => {
                migration.apply()?;
                self.ledger
                    .record(tx, unit.file.version, &unit.file.name, started_at)
            }
            Direction::Down => {
                migration.revert()?;
                self.ledger.unrecord(tx, unit.file.version)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::sqlite::SqliteExecutor;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        executor: SqliteExecutor,
        config: MigrationConfig,
        registry: MigrationRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let config = MigrationConfig {
                path: dir.path().join("migrations"),
                ..MigrationConfig::default()
            };
            Self {
                dir,
                executor: SqliteExecutor::memory().unwrap(),
                config,
                registry: MigrationRegistry::new(),
            }
        }

        fn migrator(&self) -> Migrator<'_> {
            Migrator::new(&self.executor, &self.config, &self.registry).unwrap()
        }

        fn write(&self, file_name: &str, content: &str) {
            fs::write(self.config.path.join(file_name), content).unwrap();
        }
    }

    #[test]
    fn test_init_is_idempotent() {
        let fx = Fixture::new();
        assert!(!fx.config.path.exists());
        fx.migrator().init().unwrap();
        fx.migrator().init().unwrap();
        assert!(fx.config.path.is_dir());
        assert!(fx.migrator().ledger().exists(&fx.executor).unwrap());
        assert!(fx.dir.path().exists());
    }

    #[test]
    fn test_create_writes_template() {
        let fx = Fixture::new();
        let migrator = fx.migrator();
        migrator.init().unwrap();

        let path = migrator.create("AddUsers", MigrationKind::Sql).unwrap();
        let file_name = path.file_name().unwrap().to_str().unwrap().to_string();
        assert!(file_name.ends_with("_add_users.sql"), "{file_name}");

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("-- Migration: AddUsers"));
        assert!(!content.contains("{{"));

        let rust = migrator.create("SeedUsers", MigrationKind::Rust).unwrap();
        let content = fs::read_to_string(&rust).unwrap();
        assert!(content.contains("use sluice::migration::{Migration, MigrationContext};"));
        assert!(content.contains("pub struct SeedUsers<'a>"));
    }

    #[test]
    fn test_create_versions_never_collide() {
        let fx = Fixture::new();
        let migrator = fx.migrator();
        migrator.init().unwrap();

        let first = migrator.create("First", MigrationKind::Sql).unwrap();
        let second = migrator.create("Second", MigrationKind::Sql).unwrap();
        let files = migrator.discover().unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].version < files[1].version);
        assert_eq!(files[0].path, first);
        assert_eq!(files[1].path, second);
    }

    #[test]
    fn test_create_rejects_duplicates_and_bad_names() {
        let fx = Fixture::new();
        let migrator = fx.migrator();
        migrator.init().unwrap();

        migrator.create("AddUsers", MigrationKind::Sql).unwrap();
        assert!(matches!(
            migrator.create("AddUsers", MigrationKind::Sql),
            Err(MigrationError::DuplicateMigration { .. })
        ));
        assert!(matches!(
            migrator.create("addUsers", MigrationKind::Rust),
            Err(MigrationError::DuplicateMigration { .. })
        ));
        assert!(matches!(
            migrator.create("123bad", MigrationKind::Sql),
            Err(MigrationError::InvalidName(_))
        ));
    }

    #[test]
    fn test_create_without_init_fails() {
        let fx = Fixture::new();
        assert!(matches!(
            fx.migrator().create("AddUsers", MigrationKind::Sql),
            Err(MigrationError::Configuration(_))
        ));
    }

    #[test]
    fn test_plan_up_and_down() {
        let fx = Fixture::new();
        let migrator = fx.migrator();
        migrator.init().unwrap();
        fx.write("20230101000000_init.sql", "-- up\nCREATE TABLE a (id INTEGER);\n-- down\nDROP TABLE a;\n");
        fx.write("20230102000000_add_index.sql", "-- up\nCREATE INDEX idx_a ON a (id);\n-- down\nDROP INDEX idx_a;\n");

        let plan = migrator.plan_up(None).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(migrator.plan_up(Some(20230101000000)).unwrap().len(), 1);
        assert!(matches!(
            migrator.plan_up(Some(20230105000000)),
            Err(MigrationError::VersionNotFound { scope: VersionScope::Pending, .. })
        ));

        // planning writes nothing
        assert_eq!(migrator.status().unwrap().applied_count, 0);

        migrator.up(None).unwrap();
        let plan = migrator.plan_down(Some(20230101000000)).unwrap();
        assert_eq!(
            plan.iter().map(|f| f.version).collect::<Vec<_>>(),
            vec![20230102000000, 20230101000000]
        );
        assert!(matches!(migrator.plan_down(None), Err(MigrationError::TargetRequired)));
    }

    #[test]
    fn test_rust_unit_must_be_registered() {
        let fx = Fixture::new();
        let migrator = fx.migrator();
        migrator.init().unwrap();
        fx.write("20230101000000_init.sql", "-- up\nCREATE TABLE a (id INTEGER);\n-- down\nDROP TABLE a;\n");
        fx.write("20230102000000_seed.rs", "// compiled into the binary\n");

        match migrator.up(None) {
            Err(MigrationError::UnregisteredMigration { version, name }) => {
                assert_eq!(version, 20230102000000);
                assert_eq!(name, "seed");
            }
            other => panic!("expected UnregisteredMigration, got {other:?}"),
        }
        // resolution happens before anything runs
        assert_eq!(migrator.status().unwrap().applied_count, 0);
    }

    #[test]
    fn test_status_before_init_reads_empty_ledger() {
        let fx = Fixture::new();
        fs::create_dir_all(&fx.config.path).unwrap();
        fx.write("20230101000000_init.sql", "-- up\n-- down\n");

        let status = fx.migrator().status().unwrap();
        assert_eq!(status.pending_count, 1);
        assert!(!fx.migrator().ledger().exists(&fx.executor).unwrap());
    }
}
