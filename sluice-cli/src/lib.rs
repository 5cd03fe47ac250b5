//! Sluice command-line interface
//!
//! The shipped `sluice` binary runs SQL-file migrations only. Applications
//! with Rust migration units build their own binary around [`run`]:
//!
//! ```rust,no_run
//! use sluice::MigrationRegistry;
//!
//! fn main() {
//!     let registry = MigrationRegistry::new();
//!     // registry.register(20240101000000, "seed_users", seed_users).unwrap();
//!     std::process::exit(sluice_cli::run(registry));
//! }
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use colored::Colorize;
use sluice::migration::{MigrationFile, MigrationState, MigrationStatus};
use sluice::{connect, MigrationKind, MigrationRegistry, Migrator, RunOutcome, SluiceConfig};

#[derive(Debug, Parser)]
#[command(name = "sluice")]
#[command(about = "Versioned schema migrations")]
#[command(version)]
pub struct Cli {
    /// Configuration file (default: config/sluice.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database connection URL (falls back to DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Migrations directory path
    #[arg(long, global = true)]
    pub migrations_dir: Option<PathBuf>,

    /// Ledger table name
    #[arg(long, global = true)]
    pub table: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Commands {
    /// Create the migrations directory and the ledger table
    Init,

    /// Generate a new migration file
    Create {
        /// Migration name, letters only (e.g. "AddUsers")
        name: String,

        /// Generate a Rust unit instead of an SQL file
        #[arg(long)]
        rust: bool,
    },

    /// Apply pending migrations
    Up {
        /// Stop after this version (default: all pending)
        version: Option<i64>,

        /// Dry run - show what would be applied without running
        #[arg(long)]
        dry_run: bool,
    },

    /// Roll back applied migrations down to and including a version
    Down {
        /// Oldest version to revert
        version: Option<i64>,

        /// Dry run - show what would be rolled back
        #[arg(long)]
        dry_run: bool,
    },

    /// Show migration status (applied vs pending)
    Status,
}

/// Install `env_logger` at the level the flags ask for; `RUST_LOG` wins
pub fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    // A second install (tests calling `run` repeatedly) is harmless.
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .try_init();
}

/// Settings from file and environment, with command-line overrides applied
///
/// # Errors
///
/// Fails if the configuration file cannot be read or the merged settings
/// are invalid (empty DSN, bad table name).
pub fn resolve_config(cli: &Cli) -> Result<SluiceConfig> {
    let mut config = match &cli.config {
        Some(path) => SluiceConfig::load_from(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => SluiceConfig::load().context("failed to load configuration")?,
    };

    if let Some(url) = &cli.database_url {
        config.database.url = url.clone();
    } else if config.database.url.trim().is_empty() {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database.url = url;
        }
    }
    if let Some(dir) = &cli.migrations_dir {
        config.migration.path = dir.clone();
    }
    if let Some(table) = &cli.table {
        config.migration.table = table.clone();
    }

    config.validate()?;
    Ok(config)
}

/// Run one parsed command
///
/// # Errors
///
/// Returns the first configuration, connection or migration error.
pub fn execute(cli: &Cli, registry: &MigrationRegistry) -> Result<()> {
    let config = resolve_config(cli)?;
    let executor = connect(&config.database).context("failed to connect to database")?;
    let migrator = Migrator::new(executor.as_ref(), &config.migration, registry)?;

    match &cli.command {
        Commands::Init => handle_init(&migrator),
        Commands::Create { name, rust } => handle_create(&migrator, name, *rust),
        Commands::Up { version, dry_run } => handle_up(&migrator, *version, *dry_run),
        Commands::Down { version, dry_run } => handle_down(&migrator, *version, *dry_run),
        Commands::Status => handle_status(&migrator),
    }
}

/// Parse arguments, set up logging and run; returns the process exit code
pub fn run(registry: MigrationRegistry) -> i32 {
    let cli = Cli::parse();
    init_logging(&cli);

    match execute(&cli, &registry) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{} {e:#}", "Error:".red().bold());
            1
        }
    }
}

fn handle_init(migrator: &Migrator<'_>) -> Result<()> {
    migrator.init()?;
    println!(
        "{} migrations directory {} and ledger table '{}' are ready",
        "✓".green(),
        migrator.migrations_dir().display(),
        migrator.ledger().table()
    );
    Ok(())
}

fn handle_create(migrator: &Migrator<'_>, name: &str, rust: bool) -> Result<()> {
    let kind = if rust { MigrationKind::Rust } else { MigrationKind::Sql };
    let path = migrator.create(name, kind)?;
    println!("{} Created migration: {}", "✓".green(), path.display());
    if rust {
        println!("   Register it in your MigrationRegistry under its version before running `up`");
    } else {
        println!("   Edit the file to fill in the -- up and -- down sections");
    }
    Ok(())
}

fn print_plan(heading: &str, plan: &[MigrationFile]) {
    println!("{heading} {} migration(s):", plan.len());
    for (i, file) in plan.iter().enumerate() {
        println!("  {}. {}_{}", i + 1, file.version, file.name);
    }
}

fn handle_up(migrator: &Migrator<'_>, version: Option<i64>, dry_run: bool) -> Result<()> {
    if dry_run {
        let plan = migrator.plan_up(version)?;
        if plan.is_empty() {
            println!("Nothing to migrate");
        } else {
            print_plan("Would apply", &plan);
        }
        return Ok(());
    }

    match migrator.up(version)? {
        RunOutcome::UpToDate => println!("{} Nothing to migrate", "✓".green()),
        RunOutcome::Applied(ids) => {
            for id in &ids {
                println!("  {} {id}", "↑".green());
            }
            println!("{} Applied {} migration(s)", "✓".green(), ids.len());
        }
    }
    Ok(())
}

fn handle_down(migrator: &Migrator<'_>, version: Option<i64>, dry_run: bool) -> Result<()> {
    if dry_run {
        print_plan("Would roll back", &migrator.plan_down(version)?);
        return Ok(());
    }

    let reverted = migrator.down(version)?;
    for id in &reverted {
        println!("  {} {id}", "↓".yellow());
    }
    println!("{} Rolled back {} migration(s)", "✓".green(), reverted.len());
    Ok(())
}

/// Human-readable status table
pub fn render_status(status: &MigrationStatus) -> String {
    let mut out = String::new();
    if status.entries.is_empty() {
        out.push_str("No migrations found\n");
    }
    for entry in &status.entries {
        let line = match entry.state {
            MigrationState::Applied { applied_at } => format!(
                "  {} {}_{} (applied {})",
                "✓".green(),
                entry.version,
                entry.name,
                applied_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
            ),
            MigrationState::Pending => format!(
                "  {} {}_{} {}",
                "⏳".yellow(),
                entry.version,
                entry.name,
                "(pending)".yellow()
            ),
        };
        out.push_str(&line);
        out.push('\n');
    }
    out.push_str(&format!(
        "\nSummary: {} applied, {} pending\n",
        status.applied_count, status.pending_count
    ));
    out
}

fn handle_status(migrator: &Migrator<'_>) -> Result<()> {
    let status = migrator.status()?;
    println!("\nMigration Status ({})\n", migrator.migrations_dir().display());
    print!("{}", render_status(&status));
    Ok(())
}
