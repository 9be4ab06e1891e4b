//! Integration tests for bracket table loading using the actual database backend.

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use sqlx::sqlite::SqlitePoolOptions;
use tax_core::calculations::ComprehensiveIncomeCalculator;
use tax_core::calculations::IncomeComponents;
use tax_core::{
    CalculationError, ConfigurationError, NotFoundError, RoundingPolicy, TableKey, TaxEngine,
    TaxRepository, TaxableAmount,
};
use tax_data::{BracketLoader, BracketLoaderError, EngineConfig};
use tax_db_sqlite::SqliteRepository;

const TEST_CSV: &str = include_str!("../test-data/brackets.csv");

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn monthly() -> TableKey {
    TableKey::new("CN", "monthly")
}

/// Sets up a test database with migrations run but NO seed data.
async fn setup_test_db() -> SqliteRepository {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    let repo = SqliteRepository::new_with_pool(pool).await;
    repo.run_migrations()
        .await
        .expect("Failed to run migrations");

    repo
}

async fn load_test_csv(repo: &SqliteRepository) -> usize {
    let records = BracketLoader::parse(TEST_CSV.as_bytes()).expect("Failed to parse CSV");
    let tables = BracketLoader::build_tables(&records).expect("Invalid bracket data");
    BracketLoader::load(repo, &tables)
        .await
        .expect("Failed to load bracket tables")
}

async fn count_rows(repo: &SqliteRepository, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(repo.pool())
        .await
        .expect("Failed to count rows")
}

#[tokio::test]
async fn test_load_all_tables() {
    let repo = setup_test_db().await;

    let loaded = load_test_csv(&repo).await;

    assert_eq!(loaded, 3);
    assert_eq!(count_rows(&repo, "bracket_tables").await, 3);
    assert_eq!(count_rows(&repo, "tax_brackets").await, 21);
}

#[tokio::test]
async fn test_load_and_resolve_current_monthly_table() {
    let repo = setup_test_db().await;
    load_test_csv(&repo).await;

    let table = repo
        .resolve_bracket_table(&monthly(), date(2024, 6, 30))
        .await
        .expect("Failed to resolve monthly table");

    assert_eq!(table.effective_from(), date(2019, 1, 1));
    assert_eq!(table.effective_to(), None);
    assert_eq!(table.brackets().len(), 7);

    let first = &table.brackets()[0];
    assert_eq!(first.lower_bound, dec!(0));
    assert_eq!(first.upper_bound, Some(dec!(3000)));
    assert_eq!(first.rate, dec!(0.03));

    let last = &table.brackets()[6];
    assert_eq!(last.lower_bound, dec!(80000));
    assert_eq!(last.upper_bound, None);
    assert_eq!(last.rate, dec!(0.45));
    assert_eq!(table.quick_deduction(6), Some(dec!(15160)));
}

#[tokio::test]
async fn test_load_and_resolve_superseded_monthly_table() {
    let repo = setup_test_db().await;
    load_test_csv(&repo).await;

    let last_day = repo
        .resolve_bracket_table(&monthly(), date(2018, 12, 31))
        .await
        .expect("Failed to resolve 2018 table");
    let first_day = repo
        .resolve_bracket_table(&monthly(), date(2019, 1, 1))
        .await
        .expect("Failed to resolve 2019 table");

    assert_eq!(last_day.effective_from(), date(2011, 9, 1));
    assert_eq!(last_day.brackets()[0].upper_bound, Some(dec!(1500)));
    assert_eq!(first_day.effective_from(), date(2019, 1, 1));
}

#[tokio::test]
async fn test_resolve_before_first_table_is_not_found() {
    let repo = setup_test_db().await;
    load_test_csv(&repo).await;

    let result = repo
        .resolve_bracket_table(&monthly(), date(2011, 8, 31))
        .await;

    assert!(matches!(
        result,
        Err(tax_core::RepositoryError::NotFound)
    ));
}

#[tokio::test]
async fn test_load_is_idempotent() {
    let repo = setup_test_db().await;

    load_test_csv(&repo).await;
    load_test_csv(&repo).await;

    assert_eq!(count_rows(&repo, "bracket_tables").await, 3);
    assert_eq!(count_rows(&repo, "tax_brackets").await, 21);
    assert_eq!(repo.list_bracket_tables().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_load_replaces_existing_table() {
    let repo = setup_test_db().await;

    sqlx::query(
        "INSERT INTO bracket_tables (id, jurisdiction_id, tax_type, effective_from)
         VALUES (1, 'CN', 'monthly', '2019-01-01')",
    )
    .execute(repo.pool())
    .await
    .expect("Failed to insert initial table");
    sqlx::query(
        "INSERT INTO tax_brackets (table_id, position, lower_bound, upper_bound, rate)
         VALUES (1, 0, '0', NULL, '0.05')",
    )
    .execute(repo.pool())
    .await
    .expect("Failed to insert initial bracket");

    let initial = repo
        .resolve_bracket_table(&monthly(), date(2020, 1, 1))
        .await
        .expect("Failed to resolve initial table");
    assert_eq!(initial.brackets().len(), 1);

    load_test_csv(&repo).await;

    let loaded = repo
        .resolve_bracket_table(&monthly(), date(2020, 1, 1))
        .await
        .expect("Failed to resolve loaded table");
    assert_eq!(loaded.brackets().len(), 7);
    assert_eq!(loaded.brackets()[0].upper_bound, Some(dec!(3000)));
}

#[tokio::test]
async fn test_load_preserves_other_tables() {
    let repo = setup_test_db().await;
    load_test_csv(&repo).await;

    let csv = "jurisdiction_id,tax_type,effective_from,effective_to,lower_bound,upper_bound,rate
CN,labor_remuneration,2019-01-01,,0,20000,0.20
CN,labor_remuneration,2019-01-01,,20000,50000,0.30
CN,labor_remuneration,2019-01-01,,50000,,0.40";
    let records = BracketLoader::parse(csv.as_bytes()).expect("Failed to parse CSV");
    let tables = BracketLoader::build_tables(&records).expect("Invalid bracket data");
    BracketLoader::load(&repo, &tables)
        .await
        .expect("Failed to load bracket tables");

    assert_eq!(repo.list_bracket_tables().await.unwrap().len(), 4);
    let monthly = repo
        .resolve_bracket_table(&monthly(), date(2020, 1, 1))
        .await
        .expect("Monthly table should survive");
    assert_eq!(monthly.brackets().len(), 7);
}

#[tokio::test]
async fn test_load_rejects_table_overlapping_stored_period() {
    let repo = setup_test_db().await;
    load_test_csv(&repo).await;

    let csv = "jurisdiction_id,tax_type,effective_from,effective_to,lower_bound,upper_bound,rate
CN,monthly,2024-01-01,,0,,0.05";
    let records = BracketLoader::parse(csv.as_bytes()).expect("Failed to parse CSV");
    let tables = BracketLoader::build_tables(&records).expect("Table is valid on its own");

    let err = BracketLoader::load(&repo, &tables)
        .await
        .expect_err("Should reject overlap with the stored 2019 table");

    assert!(matches!(
        err,
        BracketLoaderError::ConflictsWithStored(ConfigurationError::OverlappingPeriods { .. })
    ));
    assert_eq!(count_rows(&repo, "bracket_tables").await, 3);
    let engine = TaxEngine::default();
    assert_eq!(engine.reload_from(&repo).await, Ok(3));
}

#[tokio::test]
async fn test_load_accepts_successor_after_closing_stored_period() {
    let repo = setup_test_db().await;
    load_test_csv(&repo).await;

    let csv = "jurisdiction_id,tax_type,effective_from,effective_to,lower_bound,upper_bound,rate
CN,monthly,2019-01-01,2023-12-31,0,,0.03
CN,monthly,2024-01-01,,0,,0.05";
    let records = BracketLoader::parse(csv.as_bytes()).expect("Failed to parse CSV");
    let tables = BracketLoader::build_tables(&records).expect("Invalid bracket data");

    BracketLoader::load(&repo, &tables)
        .await
        .expect("Closing the old period makes room for the new one");

    let engine = TaxEngine::default();
    assert_eq!(engine.reload_from(&repo).await, Ok(4));
    let table = repo
        .resolve_bracket_table(&monthly(), date(2024, 6, 30))
        .await
        .unwrap();
    assert_eq!(table.brackets()[0].rate, dec!(0.05));
}

#[tokio::test]
async fn test_invalid_file_leaves_database_untouched() {
    let repo = setup_test_db().await;
    load_test_csv(&repo).await;

    // Published quick deduction for the second bracket should be 210.
    let csv = "jurisdiction_id,tax_type,effective_from,effective_to,lower_bound,upper_bound,rate,quick_deduction
CN,monthly,2019-01-01,,0,3000,0.03,0
CN,monthly,2019-01-01,,3000,,0.10,200";
    let records = BracketLoader::parse(csv.as_bytes()).expect("Failed to parse CSV");

    let err = BracketLoader::build_tables(&records).expect_err("Should reject quick deduction");
    assert!(matches!(
        err,
        BracketLoaderError::QuickDeductionMismatch { index: 1, .. }
    ));

    let table = repo
        .resolve_bracket_table(&monthly(), date(2020, 1, 1))
        .await
        .unwrap();
    assert_eq!(table.brackets().len(), 7);
}

#[tokio::test]
async fn test_engine_calculates_from_loaded_tables() {
    let repo = setup_test_db().await;
    load_test_csv(&repo).await;

    let engine = TaxEngine::default();
    let published = engine.reload_from(&repo).await.expect("Failed to reload");
    assert_eq!(published, 3);

    let amount = TaxableAmount::new(dec!(5000), "CNY").unwrap();

    let current = engine
        .calculate(&monthly(), date(2024, 1, 31), &amount)
        .expect("Failed to calculate");
    assert_eq!(current.total_tax, dec!(290.00));
    assert_eq!(current.marginal_rate, dec!(0.10));
    assert_eq!(current.breakdown.len(), 7);
    assert_eq!(current.breakdown[2].taxed_portion, dec!(0));

    // 1500 * 0.03 + 3000 * 0.10 + 500 * 0.20
    let superseded = engine
        .calculate(&monthly(), date(2018, 6, 30), &amount)
        .expect("Failed to calculate");
    assert_eq!(superseded.total_tax, dec!(445.00));
    assert_eq!(superseded.table_effective_from, date(2011, 9, 1));

    let missing = engine.calculate(&TableKey::new("HK", "salaries"), date(2024, 1, 31), &amount);
    assert_eq!(
        missing,
        Err(CalculationError::NotFound(NotFoundError {
            jurisdiction_id: "HK".to_string(),
            tax_type: "salaries".to_string(),
            as_of: date(2024, 1, 31),
        }))
    );
}

#[tokio::test]
async fn test_stored_results_round_trip_through_database() {
    let repo = setup_test_db().await;
    load_test_csv(&repo).await;

    let engine = TaxEngine::new(RoundingPolicy::new(2, 6).unwrap()).unwrap();
    engine.reload_from(&repo).await.unwrap();
    let amount = TaxableAmount::new(dec!(12345.67), "CNY").unwrap();
    let result = engine
        .calculate(&monthly(), date(2024, 1, 31), &amount)
        .unwrap();

    let id = repo.store_result("employee-42", &result).await.unwrap();
    let stored = repo.get_result(id).await.unwrap();
    assert_eq!(stored.entity_ref, "employee-42");
    assert_eq!(stored.result, result);

    let listed = repo.list_results("employee-42").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, id);
    assert!(repo.list_results("someone-else").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_comprehensive_income_from_loaded_tables() {
    let repo = setup_test_db().await;
    load_test_csv(&repo).await;

    let annual = repo
        .resolve_bracket_table(&TableKey::new("CN", "comprehensive_income"), date(2024, 12, 31))
        .await
        .unwrap();
    let monthly = repo
        .resolve_bracket_table(&monthly(), date(2024, 12, 31))
        .await
        .unwrap();
    let components = IncomeComponents {
        currency: "CNY".to_string(),
        salary: dec!(60000),
        bonus: dec!(24000),
        service_income: dec!(40000),
        dividend: dec!(10000),
    };

    let result = ComprehensiveIncomeCalculator::default()
        .compute(&components, &annual, &monthly)
        .unwrap();

    assert_eq!(result.combined.total_tax, dec!(7480.00));
    assert_eq!(result.bonus.total_tax, dec!(720.00));
    assert_eq!(result.dividend.tax, dec!(2000.00));
    assert_eq!(result.total_tax, dec!(10200.00));
}

#[tokio::test]
async fn test_config_tables_match_loaded_tables() {
    let repo = setup_test_db().await;
    load_test_csv(&repo).await;

    let config = EngineConfig::from_toml(
        r#"
        [[tables]]
        key = { jurisdiction_id = "CN", tax_type = "monthly" }
        effective_from = "2019-01-01"
        brackets = [
            { lower_bound = "0", upper_bound = "3000", rate = "0.03" },
            { lower_bound = "3000", upper_bound = "12000", rate = "0.10" },
            { lower_bound = "12000", upper_bound = "25000", rate = "0.20" },
            { lower_bound = "25000", upper_bound = "35000", rate = "0.25" },
            { lower_bound = "35000", upper_bound = "55000", rate = "0.30" },
            { lower_bound = "55000", upper_bound = "80000", rate = "0.35" },
            { lower_bound = "80000", rate = "0.45" },
        ]
        "#,
    )
    .unwrap();

    let stored = repo
        .resolve_bracket_table(&monthly(), date(2019, 1, 1))
        .await
        .unwrap();
    assert_eq!(config.tables, vec![stored]);
}
