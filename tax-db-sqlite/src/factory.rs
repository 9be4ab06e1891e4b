//! The `sqlite` backend for [`RepositoryRegistry`](tax_core::db::RepositoryRegistry).

use std::path::PathBuf;

use async_trait::async_trait;
use tax_core::db::repository::{RepositoryError, TaxRepository};
use tax_core::db::{DbConfig, RepositoryFactory};
use tracing::info;

use crate::repository::SqliteRepository;

/// Overrides the seed directory when the config does not name one.
pub const SEEDS_DIR_ENV: &str = "TAX_DB_SQLITE_SEEDS_DIR";

/// Seed files for the CN statutory tables, shipped with this crate.
const BUNDLED_SEEDS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/seeds");

fn seeds_dir(config: &DbConfig) -> PathBuf {
    config
        .seeds_dir
        .clone()
        .or_else(|| std::env::var_os(SEEDS_DIR_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(BUNDLED_SEEDS))
}

/// Opens [`SqliteRepository`] databases.
///
/// ```rust,no_run
/// use tax_core::db::RepositoryRegistry;
/// use tax_db_sqlite::SqliteRepositoryFactory;
///
/// let mut registry = RepositoryRegistry::new();
/// registry.register(Box::new(SqliteRepositoryFactory));
/// ```
pub struct SqliteRepositoryFactory;

#[async_trait]
impl RepositoryFactory for SqliteRepositoryFactory {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    /// Connects, brings the schema up to date and, unless
    /// `config.seed_tables` is off, loads the CN monthly and annual tables.
    /// Seeding is idempotent, so reopening a file database is safe.
    async fn open(
        &self,
        config: &DbConfig,
    ) -> Result<Box<dyn TaxRepository>, RepositoryError> {
        let repo = SqliteRepository::new(&config.connection_string)
            .await
            .map_err(|e| RepositoryError::Connection(format!("{e:#}")))?;
        repo.run_migrations()
            .await
            .map_err(|e| RepositoryError::Database(format!("{e:#}")))?;

        if config.seed_tables {
            let dir = seeds_dir(config);
            repo.run_seeds(&dir)
                .await
                .map_err(|e| RepositoryError::Database(format!("{e:#}")))?;
            info!(seeds = %dir.display(), "seeded statutory bracket tables");
        }

        Ok(Box::new(repo))
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use tax_core::db::{DbConfig, RepositoryRegistry};
    use tax_core::{TableKey, TaxEngine, TaxableAmount};

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn registry() -> RepositoryRegistry {
        let mut registry = RepositoryRegistry::new();
        registry.register(Box::new(SqliteRepositoryFactory));
        registry
    }

    #[tokio::test]
    async fn default_config_resolves_both_monthly_schedules() {
        let repo = registry()
            .open(&DbConfig::default())
            .await
            .expect("failed to open in-memory database");
        let monthly = TableKey::new("CN", "monthly");

        let old = repo.resolve_bracket_table(&monthly, date(2018, 6, 30)).await.unwrap();
        let current = repo.resolve_bracket_table(&monthly, date(2024, 6, 30)).await.unwrap();

        assert_eq!(old.effective_from(), date(2011, 9, 1));
        assert_eq!(old.brackets()[0].upper_bound, Some(dec!(1500)));
        assert_eq!(current.effective_from(), date(2019, 1, 1));
        assert_eq!(current.brackets().len(), 7);
    }

    #[tokio::test]
    async fn seeded_database_feeds_the_engine() {
        let repo = registry().open(&DbConfig::default()).await.unwrap();
        let engine = TaxEngine::default();

        let published = engine.reload_from(repo.as_ref()).await.unwrap();
        let result = engine
            .calculate(
                &TableKey::new("CN", "monthly"),
                date(2024, 6, 30),
                &TaxableAmount::new(dec!(5000), "CNY").unwrap(),
            )
            .unwrap();

        assert_eq!(published, 3);
        assert_eq!(result.total_tax, dec!(290.00));
    }

    #[tokio::test]
    async fn seeding_can_be_turned_off() {
        let config = DbConfig {
            seed_tables: false,
            ..DbConfig::default()
        };

        let repo = registry().open(&config).await.unwrap();

        assert!(repo.list_bracket_tables().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_seeds_dir_is_a_database_error() {
        let config = DbConfig {
            seeds_dir: Some(PathBuf::from("/nonexistent/tax-seeds")),
            ..DbConfig::default()
        };

        let result = registry().open(&config).await;

        assert!(matches!(result, Err(RepositoryError::Database(msg)) if msg.contains("seeds directory")));
    }
}
