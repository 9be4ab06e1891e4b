use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tax_data::{BracketLoader, init_logging};
use tax_db_sqlite::SqliteRepository;

/// Load bracket tables from a CSV file into the database.
///
/// The CSV file should have the following columns:
/// - jurisdiction_id: The jurisdiction (e.g., CN)
/// - tax_type: The schedule within the jurisdiction (e.g., monthly)
/// - effective_from: First day the table applies (YYYY-MM-DD)
/// - effective_to: Last day the table applies (empty for open-ended)
/// - lower_bound: The lower bound of this bracket
/// - upper_bound: The upper bound (empty for unbounded)
/// - rate: The marginal tax rate as a decimal (e.g., 0.10)
/// - quick_deduction: Optional published quick deduction, checked on load
#[derive(Parser, Debug)]
#[command(name = "tax-data-loader")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the CSV file containing bracket table data
    #[arg(short, long)]
    file: PathBuf,

    /// SQLite database URL (e.g., sqlite:tax.db?mode=rwc to create if missing)
    #[arg(short, long, default_value = "sqlite:tax.db?mode=rwc")]
    database: String,

    /// Run database migrations before loading data
    #[arg(short, long, default_value_t = false)]
    migrate: bool,

    /// Run seed files from the specified directory after migrations
    #[arg(short, long)]
    seeds: Option<PathBuf>,

    /// Also append log output to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging("info", args.log_file.as_deref())?;

    let repo = SqliteRepository::new(&args.database)
        .await
        .with_context(|| format!("Failed to connect to database: {}", args.database))?;

    if args.migrate {
        println!("Running migrations...");
        repo.run_migrations()
            .await
            .context("Failed to run migrations")?;
        println!("Migrations complete.");
    }

    if let Some(seeds_dir) = &args.seeds {
        println!("Running seeds from: {}", seeds_dir.display());
        repo.run_seeds(seeds_dir)
            .await
            .with_context(|| format!("Failed to run seeds from: {}", seeds_dir.display()))?;
        println!("Seeds complete.");
    }

    println!("Loading bracket tables from: {}", args.file.display());

    let file = File::open(&args.file)
        .with_context(|| format!("Failed to open: {}", args.file.display()))?;

    let records = BracketLoader::parse(file)
        .with_context(|| format!("Failed to parse CSV: {}", args.file.display()))?;
    let tables = BracketLoader::build_tables(&records)
        .with_context(|| format!("Invalid bracket data in: {}", args.file.display()))?;

    println!(
        "Parsed {} records into {} tables",
        records.len(),
        tables.len()
    );

    let loaded = BracketLoader::load(&repo, &tables)
        .await
        .context("Failed to load bracket tables into database")?;

    println!("Successfully loaded {loaded} bracket tables into the database.");

    Ok(())
}
