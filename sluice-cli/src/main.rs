//! `sluice` binary: SQL-file migrations, no registered Rust units

use std::process;

use sluice::MigrationRegistry;

fn main() {
    dotenv::dotenv().ok();
    process::exit(sluice_cli::run(MigrationRegistry::new()));
}
