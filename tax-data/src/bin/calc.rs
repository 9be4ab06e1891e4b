use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use tax_core::calculations::{
    BonusCalculator, ComprehensiveIncomeCalculator, DEFAULT_BONUS_PERIODS, DEFAULT_DIVIDEND_RATE,
    FlatRateCalculator, IncomeComponents, IntermediateRounding, TransferCostCalculator,
    TransferMode, TransferRates, VatCalculator,
};
use tax_core::db::RepositoryRegistry;
use tax_core::{RoundingPolicy, TableKey, TaxEngine, TaxRepository, TaxableAmount};
use tax_data::report::VatSummary;
use tax_data::{EngineConfig, init_logging, report};
use tax_db_sqlite::SqliteRepositoryFactory;
use tracing::info;

/// Compute tax on an amount using effective-dated bracket tables.
///
/// Tables come from the `[[tables]]` section of the config file when it has
/// one, otherwise from the configured database. Results are written to
/// stdout; logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "tax-calc")]
#[command(version, about, long_about = None)]
struct Cli {
    /// TOML config file with rounding, database and table settings
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database to read tables from, overriding the config file
    #[arg(short, long, global = true)]
    database: Option<String>,

    /// Decimal places of the final result
    #[arg(long, global = true)]
    final_precision: Option<u32>,

    /// Decimal places kept on intermediate values
    #[arg(long, global = true)]
    intermediate_precision: Option<u32>,

    /// Round intermediates once after summing brackets instead of per bracket
    #[arg(long, global = true, default_value_t = false)]
    after_summation: bool,

    /// Date used to pick the effective table (defaults to today)
    #[arg(long, global = true)]
    as_of: Option<NaiveDate>,

    #[arg(long, global = true, default_value = "CNY")]
    currency: String,

    /// Print results as JSON
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    /// Also append log output to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Progressive tax on one amount
    Progressive {
        #[arg(long, default_value = "CN")]
        jurisdiction: String,
        #[arg(long, default_value = "monthly")]
        tax_type: String,
        #[arg(long)]
        amount: String,
        /// Store the result in the database under this entity reference
        #[arg(long)]
        store_for: Option<String>,
    },

    /// Annualised tax on a one-off bonus
    Bonus {
        #[arg(long, default_value = "CN")]
        jurisdiction: String,
        #[arg(long, default_value = "monthly")]
        tax_type: String,
        #[arg(long)]
        amount: String,
        #[arg(long, default_value_t = DEFAULT_BONUS_PERIODS)]
        periods: u32,
    },

    /// Single-rate tax on one amount
    Flat {
        #[arg(long)]
        amount: String,
        #[arg(long)]
        rate: String,
    },

    /// Salary, service income, bonus and dividend together
    Comprehensive {
        #[arg(long, default_value = "CN")]
        jurisdiction: String,
        #[arg(long, default_value = "0")]
        salary: String,
        #[arg(long, default_value = "0")]
        service_income: String,
        #[arg(long, default_value = "0")]
        bonus: String,
        #[arg(long, default_value = "0")]
        dividend: String,
        #[arg(long, default_value = "comprehensive_income")]
        income_tax_type: String,
        #[arg(long, default_value = "monthly")]
        bonus_tax_type: String,
        #[arg(long, default_value_t = DEFAULT_BONUS_PERIODS)]
        periods: u32,
        #[arg(long)]
        dividend_rate: Option<String>,
    },

    /// Split VAT out of a tax-inclusive price
    Vat {
        /// Gross price including VAT
        #[arg(long)]
        amount: String,
        #[arg(long)]
        rate: String,
        /// Surtax levied on the VAT itself
        #[arg(long)]
        surtax_rate: Option<String>,
    },

    /// Tax cost of moving funds between two entities
    Transfer {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: String,
        /// pre-tax (VAT, surtax, EIT) or post-tax (PIT)
        #[arg(long, default_value = "post-tax")]
        mode: TransferMode,
        #[arg(long)]
        vat_rate: Option<String>,
        #[arg(long)]
        surtax_rate: Option<String>,
        #[arg(long)]
        eit_rate: Option<String>,
        #[arg(long)]
        pit_rate: Option<String>,
    },

    /// List the loaded bracket tables
    Tables,
}

#[derive(Serialize)]
struct TableSummary<'a> {
    table: &'a TableKey,
    effective_from: NaiveDate,
    effective_to: Option<NaiveDate>,
    brackets: usize,
}

fn parse_decimal(raw: &str, what: &str) -> Result<Decimal> {
    Decimal::from_str_exact(raw.trim()).with_context(|| format!("invalid {what}: '{raw}'"))
}

fn parse_rate(raw: Option<&String>, what: &str) -> Result<Option<Decimal>> {
    raw.map(|raw| parse_decimal(raw, what)).transpose()
}

fn rounding_policy(cli: &Cli, config: &EngineConfig) -> Result<RoundingPolicy> {
    let mut policy = config.rounding;
    if let Some(final_precision) = cli.final_precision {
        policy.final_precision = final_precision;
    }
    if let Some(intermediate_precision) = cli.intermediate_precision {
        policy.intermediate_precision = intermediate_precision;
    }
    if cli.after_summation {
        policy.intermediate_rounding = IntermediateRounding::AfterSummation;
    }
    policy.validate().context("invalid rounding settings")?;
    Ok(policy)
}

/// Publishes tables into `engine`, from the config file or the database.
/// The repository is returned when the database was used.
async fn load_tables(
    cli: &Cli,
    config: &EngineConfig,
    engine: &TaxEngine,
) -> Result<Option<Box<dyn TaxRepository>>> {
    if cli.database.is_none() && !config.tables.is_empty() {
        let snapshot = engine
            .store()
            .load(config.tables.clone())
            .context("tables in the config file conflict")?;
        info!(tables = snapshot.len(), "using bracket tables from config file");
        return Ok(None);
    }

    let mut db_config = config.database.clone();
    if let Some(database) = &cli.database {
        db_config.connection_string = database.clone();
    }

    let mut registry = RepositoryRegistry::new();
    registry.register(Box::new(SqliteRepositoryFactory));
    let repo = registry
        .open(&db_config)
        .await
        .with_context(|| format!("cannot open database '{}'", db_config.connection_string))?;
    engine
        .reload_from(repo.as_ref())
        .await
        .context("cannot load bracket tables")?;
    Ok(Some(repo))
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce(&T) -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", text(value));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging("warn", cli.log_file.as_deref())?;

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let policy = rounding_policy(&cli, &config)?;
    let as_of = cli.as_of.unwrap_or_else(|| Local::now().date_naive());
    let currency = cli.currency.as_str();

    let engine = TaxEngine::new(policy)?;
    let repo = match cli.command {
        Command::Flat { .. } | Command::Vat { .. } | Command::Transfer { .. } => None,
        _ => load_tables(&cli, &config, &engine).await?,
    };

    match &cli.command {
        Command::Progressive {
            jurisdiction,
            tax_type,
            amount,
            store_for,
        } => {
            let key = TableKey::new(jurisdiction.as_str(), tax_type.as_str());
            let amount = TaxableAmount::parse(amount, currency)?;
            let result = engine.calculate(&key, as_of, &amount)?;

            if let Some(entity_ref) = store_for {
                let Some(repo) = &repo else {
                    bail!("--store-for needs a database; the config file supplied the tables");
                };
                let id = repo
                    .store_result(entity_ref, &result)
                    .await
                    .context("cannot store calculation result")?;
                info!(id, entity_ref = %entity_ref, "stored calculation result");
            }

            emit(cli.json, &result, report::render_calculation)
        }
        Command::Bonus {
            jurisdiction,
            tax_type,
            amount,
            periods,
        } => {
            let table = engine
                .store()
                .resolve(&TableKey::new(jurisdiction.as_str(), tax_type.as_str()), as_of)?;
            let amount = TaxableAmount::parse(amount, currency)?;
            let result = BonusCalculator::new(policy, *periods)?.compute(&amount, &table)?;
            emit(cli.json, &result, report::render_bonus)
        }
        Command::Comprehensive {
            jurisdiction,
            salary,
            service_income,
            bonus,
            dividend,
            income_tax_type,
            bonus_tax_type,
            periods,
            dividend_rate,
        } => {
            let store = engine.store();
            let income_table = store.resolve(
                &TableKey::new(jurisdiction.as_str(), income_tax_type.as_str()),
                as_of,
            )?;
            let bonus_table = store.resolve(
                &TableKey::new(jurisdiction.as_str(), bonus_tax_type.as_str()),
                as_of,
            )?;
            let dividend_rate = match dividend_rate {
                Some(raw) => parse_decimal(raw, "dividend rate")?,
                None => DEFAULT_DIVIDEND_RATE,
            };
            let components = IncomeComponents {
                currency: currency.to_string(),
                salary: parse_decimal(salary, "salary")?,
                bonus: parse_decimal(bonus, "bonus")?,
                service_income: parse_decimal(service_income, "service income")?,
                dividend: parse_decimal(dividend, "dividend")?,
            };
            let result = ComprehensiveIncomeCalculator::new(policy, *periods, dividend_rate)?
                .compute(&components, &income_table, &bonus_table)?;
            emit(cli.json, &result, report::render_comprehensive)
        }
        Command::Tables => {
            let snapshot = engine.store().snapshot();
            let summaries: Vec<_> = snapshot
                .tables()
                .map(|table| TableSummary {
                    table: table.key(),
                    effective_from: table.effective_from(),
                    effective_to: table.effective_to(),
                    brackets: table.brackets().len(),
                })
                .collect();
            emit(cli.json, &summaries, |summaries| {
                summaries
                    .iter()
                    .map(|s| {
                        let to = s
                            .effective_to
                            .map_or_else(|| "open".to_string(), |d| d.to_string());
                        format!(
                            "{:<28} {} .. {:<10} {} brackets\n",
                            s.table.to_string(),
                            s.effective_from,
                            to,
                            s.brackets
                        )
                    })
                    .collect()
            })
        }
        Command::Flat { amount, rate } => {
            let amount = TaxableAmount::parse(amount, currency)?;
            let rate = parse_decimal(rate, "rate")?;
            let result = FlatRateCalculator::new(policy)?.compute(&amount, rate)?;
            emit(cli.json, &result, report::render_flat)
        }
        Command::Vat {
            amount,
            rate,
            surtax_rate,
        } => {
            let amount = TaxableAmount::parse(amount, currency)?;
            let calculator = VatCalculator::new(policy)?;
            let split = calculator.extract(&amount, parse_decimal(rate, "VAT rate")?)?;
            let surtax_rate = parse_rate(surtax_rate.as_ref(), "surtax rate")?;
            let surtax = match surtax_rate {
                Some(rate) => calculator.surtax(split.vat, rate)?,
                None => Decimal::ZERO,
            };
            let summary = VatSummary {
                split,
                surtax_rate,
                surtax,
            };
            emit(cli.json, &summary, report::render_vat)
        }
        Command::Transfer {
            from,
            to,
            amount,
            mode,
            vat_rate,
            surtax_rate,
            eit_rate,
            pit_rate,
        } => {
            let amount = TaxableAmount::parse(amount, currency)?;
            let rates = TransferRates {
                vat_rate: parse_rate(vat_rate.as_ref(), "VAT rate")?,
                surtax_rate: parse_rate(surtax_rate.as_ref(), "surtax rate")?,
                eit_rate: parse_rate(eit_rate.as_ref(), "EIT rate")?,
                pit_rate: parse_rate(pit_rate.as_ref(), "PIT rate")?,
            };
            let cost =
                TransferCostCalculator::new(policy)?.compute(from, to, &amount, *mode, &rates)?;
            emit(cli.json, &cost, report::render_transfer)
        }
    }
}
