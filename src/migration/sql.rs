//! SQL-file migration units
//!
//! A `.sql` migration holds an `-- up` section and a `-- down` section:
//!
//! ```sql
//! -- up
//! CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL);
//!
//! -- down
//! DROP TABLE users;
//! ```
//!
//! A marker is a line holding only `-- up` or `-- down` (any case, optional
//! trailing colon). Text before the first marker is ignored; everything else
//! in a section is passed to the database verbatim.

use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::executor::{DbError, DbExecutor};
use crate::migration::{Migration, MigrationError};

/// Parsed contents of a `.sql` migration file
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SqlScript {
    pub up: String,
    pub down: String,
}

#[derive(Clone, Copy)]
enum Section {
    Preamble,
    Up,
    Down,
}

static MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*--\s*(up|down)\s*:?\s*$").expect("valid section marker pattern")
});

fn marker(line: &str) -> Option<Section> {
    let caps = MARKER.captures(line)?;
    if caps[1].eq_ignore_ascii_case("up") {
        Some(Section::Up)
    } else {
        Some(Section::Down)
    }
}

/// True when `sql` holds nothing but whitespace and `--` comments
fn is_blank(sql: &str) -> bool {
    sql.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with("--")
    })
}

impl SqlScript {
    pub fn parse(content: &str) -> Self {
        let mut up = Vec::new();
        let mut down = Vec::new();
        let mut section = Section::Preamble;

        for line in content.lines() {
            if let Some(next) = marker(line) {
                section = next;
                continue;
            }
            match section {
                Section::Up => up.push(line),
                Section::Down => down.push(line),
                Section::Preamble => {}
            }
        }

        Self {
            up: up.join("\n").trim().to_string(),
            down: down.join("\n").trim().to_string(),
        }
    }

    /// Read and parse a migration file
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Io` if the file cannot be read.
    pub fn load(path: &Path) -> Result<Self, MigrationError> {
        let content = fs::read_to_string(path).map_err(|e| MigrationError::io(path, e))?;
        Ok(Self::parse(&content))
    }
}

/// A [`Migration`] that runs the sections of a `.sql` file
pub struct SqlMigration<'a> {
    name: String,
    script: SqlScript,
    executor: &'a dyn DbExecutor,
}

impl<'a> SqlMigration<'a> {
    pub fn new(name: impl Into<String>, script: SqlScript, executor: &'a dyn DbExecutor) -> Self {
        Self {
            name: name.into(),
            script,
            executor,
        }
    }

    fn run(&self, section: &str, sql: &str) -> Result<(), DbError> {
        if is_blank(sql) {
            log::warn!("migration '{}' has an empty {section} section, nothing to run", self.name);
            return Ok(());
        }
        self.executor.execute_batch(sql)
    }
}

impl Migration for SqlMigration<'_> {
    fn apply(&self) -> Result<(), DbError> {
        self.run("up", &self.script.up)
    }

    fn revert(&self) -> Result<(), DbError> {
        self.run("down", &self.script.down)
    }
}
