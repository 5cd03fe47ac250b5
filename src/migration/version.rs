//! Version and file-name helpers.
//!
//! A migration version is the UTC creation time as a 14-digit number
//! (`YYYYMMDDHHMMSS`). Files are named `<version>_<snake_case_name>.<ext>`
//! where the extension picks the kind of unit (`sql` or `rs`).

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::migration::MigrationError;

/// `chrono` layout of a version
pub const VERSION_FORMAT: &str = "%Y%m%d%H%M%S";

static FILE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?P<version>[0-9]{14})_(?P<name>[_a-z]+)\.(?P<ext>sql|rs)$")
        .expect("valid migration file name pattern")
});

static CLASS_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]+$").expect("valid class name pattern"));

static CAMEL_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z])([A-Z])").expect("valid camel boundary pattern"));

/// What a migration file contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationKind {
    /// `-- up` / `-- down` SQL sections, run as scripts
    Sql,
    /// A Rust unit compiled into the binary and registered by version
    Rust,
}

impl MigrationKind {
    pub fn extension(self) -> &'static str {
        match self {
            MigrationKind::Sql => "sql",
            MigrationKind::Rust => "rs",
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "sql" => Some(MigrationKind::Sql),
            "rs" => Some(MigrationKind::Rust),
            _ => None,
        }
    }
}

/// Version for a migration created at `now`
pub fn version_at(now: DateTime<Utc>) -> i64 {
    // Fourteen ASCII digits always parse, and always fit an i64.
    now.format(VERSION_FORMAT).to_string().parse().unwrap_or_default()
}

/// Version for a migration created right now (UTC, second resolution)
///
/// Two calls within the same second return the same value; see
/// [`next_version`] for a collision-free variant.
pub fn current_version() -> i64 {
    version_at(Utc::now())
}

/// Version for a new migration that sorts after every existing one
///
/// Normally the current timestamp; when that does not exceed the highest
/// version already on disk (two creates within one second, or a clock behind
/// the newest file), the highest version plus one.
pub fn next_version(highest_existing: Option<i64>) -> i64 {
    let now = current_version();
    match highest_existing {
        Some(highest) if highest >= now => highest + 1,
        _ => now,
    }
}

/// `AddUsersTable` -> `add_users_table`
pub fn camel_to_snake(input: &str) -> String {
    CAMEL_BOUNDARY
        .replace_all(input, "${1}_${2}")
        .to_lowercase()
}

/// `add_users_table` -> `AddUsersTable`
pub fn snake_to_camel(input: &str) -> String {
    input
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Render the canonical file name for a new migration
///
/// # Errors
///
/// Returns `MigrationError::InvalidName` if the rendered name does not match
/// the canonical pattern (for example when `name` contains digits).
pub fn to_file_name(version: i64, name: &str, kind: MigrationKind) -> Result<String, MigrationError> {
    let file_name = format!("{version}_{}.{}", camel_to_snake(name), kind.extension());
    if FILE_NAME.is_match(&file_name) {
        Ok(file_name)
    } else {
        Err(MigrationError::InvalidName(name.to_string()))
    }
}

/// Split a canonical file name into `(version, name)`
///
/// Returns `None` for anything that is not a migration file, so directory
/// scans can skip unrelated entries.
pub fn parse_file_name(file_name: &str) -> Option<(i64, String)> {
    parse_file_name_with_kind(file_name).map(|(version, name, _)| (version, name))
}

pub(crate) fn parse_file_name_with_kind(file_name: &str) -> Option<(i64, String, MigrationKind)> {
    let caps = FILE_NAME.captures(file_name)?;
    let version = caps.name("version")?.as_str().parse().ok()?;
    let name = caps.name("name")?.as_str().to_string();
    let kind = MigrationKind::from_extension(caps.name("ext")?.as_str())?;
    Some((version, name, kind))
}

/// Validate a user-supplied migration name and return its identifier form
///
/// # Errors
///
/// Returns `MigrationError::InvalidName` when `name` has characters outside
/// `[A-Za-z]` or is empty.
pub fn to_class_identifier(name: &str) -> Result<String, MigrationError> {
    if CLASS_NAME.is_match(name) {
        Ok(snake_to_camel(name))
    } else {
        Err(MigrationError::InvalidName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_version_at_formats_utc_timestamp() {
        let ts = Utc.with_ymd_and_hms(2023, 1, 2, 13, 4, 5).unwrap();
        assert_eq!(version_at(ts), 20230102130405);
    }

    #[test]
    fn test_current_version_has_fourteen_digits() {
        let v = current_version();
        assert_eq!(v.to_string().len(), 14);
    }

    #[test]
    fn test_next_version_never_collides() {
        let now = current_version();
        assert!(next_version(None) >= now);
        assert_eq!(next_version(Some(99_991_231_235_959)), 99_991_231_235_960);
        assert!(next_version(Some(20000101000000)) >= now);
    }

    #[test]
    fn test_camel_and_snake_conversions() {
        assert_eq!(camel_to_snake("AddUsers"), "add_users");
        assert_eq!(camel_to_snake("addUsersTable"), "add_users_table");
        assert_eq!(camel_to_snake("init"), "init");
        assert_eq!(snake_to_camel("add_users"), "AddUsers");
        assert_eq!(snake_to_camel("init"), "Init");
        assert_eq!(snake_to_camel("AddUsers"), "AddUsers");
    }

    #[test]
    fn test_to_file_name() {
        assert_eq!(
            to_file_name(20230101000000, "AddUsers", MigrationKind::Sql).unwrap(),
            "20230101000000_add_users.sql"
        );
        assert_eq!(
            to_file_name(20230101000000, "init", MigrationKind::Rust).unwrap(),
            "20230101000000_init.rs"
        );
    }

    #[test]
    fn test_to_file_name_rejects_non_canonical() {
        assert!(matches!(
            to_file_name(20230101000000, "add2", MigrationKind::Sql),
            Err(MigrationError::InvalidName(_))
        ));
        assert!(to_file_name(123, "init", MigrationKind::Sql).is_err());
    }

    #[test]
    fn test_parse_file_name() {
        assert_eq!(
            parse_file_name("20230102000000_add_index.sql"),
            Some((20230102000000, "add_index".to_string()))
        );
        assert_eq!(
            parse_file_name_with_kind("20230102000000_add_index.rs"),
            Some((20230102000000, "add_index".to_string(), MigrationKind::Rust))
        );
        assert_eq!(parse_file_name("README.md"), None);
        assert_eq!(parse_file_name("2023_init.sql"), None);
        assert_eq!(parse_file_name("20230102000000_init.php"), None);
        assert_eq!(parse_file_name("20230102000000_v2.sql"), None);
    }

    #[test]
    fn test_file_name_round_trip() {
        let version = current_version();
        for name in ["init", "add_users", "create_orders_table"] {
            for kind in [MigrationKind::Sql, MigrationKind::Rust] {
                let file_name = to_file_name(version, name, kind).unwrap();
                assert_eq!(parse_file_name(&file_name), Some((version, name.to_string())));
            }
        }
    }

    #[test]
    fn test_to_class_identifier() {
        assert_eq!(to_class_identifier("AddUsers").unwrap(), "AddUsers");
        assert_eq!(to_class_identifier("init").unwrap(), "Init");
        for bad in ["123bad", "add_users", "add users", "", "café"] {
            assert!(
                matches!(to_class_identifier(bad), Err(MigrationError::InvalidName(_))),
                "should reject {bad:?}"
            );
        }
    }
}
