//! Configuration loading.
//!
//! Settings come from an optional TOML file (default `config/sluice.toml`)
//! layered under environment variables prefixed with `SLUICE`, using `__`
//! as the section separator:
//!
//! ```text
//! SLUICE__DATABASE__URL=sqlite:store/db.sqlite
//! SLUICE__MIGRATION__PATH=./migrations
//! SLUICE__MIGRATION__TABLE=schema_migrations
//! ```

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::migration::MigrationError;

/// Default location of the configuration file, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "config/sluice.toml";

/// Default ledger table name
pub const DEFAULT_LEDGER_TABLE: &str = "migrations";

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier pattern"));

/// Top-level settings
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SluiceConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Database connection settings
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DatabaseConfig {
    /// DSN, e.g. `sqlite:store/db.sqlite` or `postgres://host/db`
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Migration settings
#[derive(Debug, Clone, Deserialize)]
pub struct MigrationConfig {
    /// Directory holding migration files
    #[serde(default = "default_migrations_path")]
    pub path: PathBuf,
    /// Ledger table name
    #[serde(default = "default_table")]
    pub table: String,
    /// Crate path substituted into generated Rust migration units
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_migrations_path() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_table() -> String {
    DEFAULT_LEDGER_TABLE.to_string()
}

fn default_namespace() -> String {
    "sluice".to_string()
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            path: default_migrations_path(),
            table: default_table(),
            namespace: default_namespace(),
        }
    }
}

impl SluiceConfig {
    /// Load from `config/sluice.toml` (if present) and `SLUICE__*` env vars
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix("SLUICE").separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // A present but unreadable file should not hide the environment.
                if Path::new(DEFAULT_CONFIG_FILE).exists() {
                    log::warn!("failed to load {DEFAULT_CONFIG_FILE}, falling back to env: {err}");
                }
                Config::builder()
                    .add_source(Environment::with_prefix("SLUICE").separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {err}, then env-only error: {env_err}"
                        ))
                    })?
            }
        };

        settings.try_deserialize()
    }

    /// Load from an explicit file, which must exist, plus `SLUICE__*` env vars
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path.as_ref()).required(true))
            .add_source(Environment::with_prefix("SLUICE").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Check the settings every command relies on
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Configuration` for an empty DSN or a ledger
    /// table name that is not a plain SQL identifier (it is interpolated into
    /// statements).
    pub fn validate(&self) -> Result<(), MigrationError> {
        if self.database.url.trim().is_empty() {
            return Err(MigrationError::Configuration(
                "DSN for database is empty".to_string(),
            ));
        }
        validate_table_name(&self.migration.table)?;
        if self.migration.path.as_os_str().is_empty() {
            return Err(MigrationError::Configuration(
                "migrations path is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Ledger table names end up inside SQL text, so only plain identifiers pass
pub fn validate_table_name(table: &str) -> Result<(), MigrationError> {
    if IDENTIFIER.is_match(table) {
        Ok(())
    } else {
        Err(MigrationError::Configuration(format!(
            "ledger table name '{table}' is not a valid identifier"
        )))
    }
}
