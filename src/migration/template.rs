//! Fixed-content templates embedded at compile time
//!
//! Placeholders use the `{{key}}` form and are replaced verbatim.

use crate::executor::Dialect;
use crate::migration::version::MigrationKind;

const SQL_UNIT: &str = include_str!("../../templates/migration.sql.tpl");
const RUST_UNIT: &str = include_str!("../../templates/migration.rs.tpl");
const LEDGER_SQLITE: &str = include_str!("../../templates/ledger.sqlite.sql");
const LEDGER_POSTGRES: &str = include_str!("../../templates/ledger.postgres.sql");

/// Skeleton for a new migration file of the given kind
pub fn migration_template(kind: MigrationKind) -> &'static str {
    match kind {
        MigrationKind::Sql => SQL_UNIT,
        MigrationKind::Rust => RUST_UNIT,
    }
}

/// `CREATE TABLE IF NOT EXISTS` statement for the ledger
///
/// `table` must already be a validated identifier.
pub fn ledger_ddl(dialect: Dialect, table: &str) -> String {
    let template = match dialect {
        Dialect::Sqlite => LEDGER_SQLITE,
        Dialect::Postgres => LEDGER_POSTGRES,
    };
    render(template, &[("table", table)])
}

/// Replace every `{{key}}` with its value
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{{{key}}}}}"), value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_replaces_all_occurrences() {
        let out = render("{{a}}-{{b}}-{{a}}", &[("a", "x"), ("b", "y")]);
        assert_eq!(out, "x-y-x");
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        assert_eq!(render("{{a}} {{c}}", &[("a", "1")]), "1 {{c}}");
    }

    #[test]
    fn test_ledger_ddl_per_dialect() {
        let sqlite = ledger_ddl(Dialect::Sqlite, "schema_migrations");
        assert!(sqlite.contains("CREATE TABLE IF NOT EXISTS schema_migrations"));
        assert!(sqlite.contains("version INTEGER NOT NULL"));
        assert!(sqlite.contains("breakpoint INTEGER DEFAULT 0"));

        let postgres = ledger_ddl(Dialect::Postgres, "migrations");
        assert!(postgres.contains("version BIGINT NOT NULL"));
        assert!(postgres.contains("start_time TIMESTAMP NOT NULL"));
        assert!(!postgres.contains("{{"));
    }

    #[test]
    fn test_migration_templates_carry_placeholders() {
        let sql = migration_template(MigrationKind::Sql);
        assert!(sql.contains("-- up"));
        assert!(sql.contains("-- down"));

        let rust = migration_template(MigrationKind::Rust);
        for key in ["{{namespace}}", "{{class}}", "{{version}}", "{{name}}"] {
            assert!(rust.contains(key), "rust template lacks {key}");
        }
    }
}
