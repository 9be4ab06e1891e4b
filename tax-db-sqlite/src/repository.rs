use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use tax_core::calculations::IntermediateRounding;
use tax_core::{
    BracketContribution, BracketTable, CalculationResult, RepositoryError, RoundingPolicy,
    StoredCalculation, TableKey, TaxBracket, TaxRepository,
};
use tracing::{debug, info};

use crate::decimal::{decimal_to_text, get_decimal, get_optional_decimal};

pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Open a database.
    ///
    /// Accepts a sqlx URL (`sqlite:brackets.db?mode=rwc`, `sqlite::memory:`),
    /// a bare file path (created if missing) or `:memory:`. In-memory
    /// databases use a single connection so every query sees the same data.
    pub async fn new(database_url: &str) -> Result<Self> {
        let in_memory = database_url == ":memory:" || database_url.contains(":memory:");
        let options = if database_url == ":memory:" {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else if database_url.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(database_url)
                .with_context(|| format!("Invalid database URL: {}", database_url))?
        } else {
            SqliteConnectOptions::new()
                .filename(database_url)
                .create_if_missing(true)
        };

        let mut pool_options = SqlitePoolOptions::new();
        if in_memory {
            pool_options = pool_options.max_connections(1);
        }
        let pool = pool_options
            .connect_with(options.foreign_keys(true))
            .await
            .with_context(|| format!("Failed to connect to database: {}", database_url))?;

        debug!(database = %database_url, "connected to sqlite");
        Ok(Self { pool })
    }

    pub async fn new_with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    /// Load and execute all SQL seed files from the specified directory.
    /// Files are executed in alphabetical order by filename.
    pub async fn run_seeds(
        &self,
        seeds_dir: &Path,
    ) -> Result<()> {
        let mut entries: Vec<_> = std::fs::read_dir(seeds_dir)
            .with_context(|| format!("Failed to read seeds directory '{}'", seeds_dir.display()))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "sql"))
            .collect();

        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let path = entry.path();
            let sql = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read seed file '{}'", path.display()))?;

            sqlx::raw_sql(&sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to execute seed file '{}'", path.display()))?;
            info!(file = %path.display(), "applied seed file");
        }

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_table(
        &self,
        row: &SqliteRow,
    ) -> Result<BracketTable, RepositoryError> {
        let table_id: i64 = row
            .try_get("id")
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        let key = TableKey::new(
            row.try_get::<String, _>("jurisdiction_id")
                .map_err(|e| RepositoryError::Database(e.to_string()))?,
            row.try_get::<String, _>("tax_type")
                .map_err(|e| RepositoryError::Database(e.to_string()))?,
        );
        let effective_from: NaiveDate = row
            .try_get("effective_from")
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        let effective_to: Option<NaiveDate> = row
            .try_get("effective_to")
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        let bracket_rows = sqlx::query(
            "SELECT lower_bound, upper_bound, rate
             FROM tax_brackets
             WHERE table_id = ?
             ORDER BY position",
        )
        .bind(table_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        let mut brackets = Vec::with_capacity(bracket_rows.len());
        for bracket in &bracket_rows {
            brackets.push(TaxBracket::new(
                get_decimal(bracket, "lower_bound")?,
                get_optional_decimal(bracket, "upper_bound")?,
                get_decimal(bracket, "rate")?,
            ));
        }

        BracketTable::new(key.clone(), effective_from, effective_to, brackets).map_err(|e| {
            RepositoryError::InvalidData(format!(
                "table {} effective {}: {}",
                key, effective_from, e
            ))
        })
    }

    async fn load_result(
        &self,
        row: &SqliteRow,
    ) -> Result<StoredCalculation, RepositoryError> {
        let id: i64 = row
            .try_get("id")
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        let breakdown_rows = sqlx::query(
            "SELECT position, lower_bound, upper_bound, rate, taxed_portion, tax
             FROM calculation_breakdown
             WHERE result_id = ?
             ORDER BY position",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        let mut breakdown = Vec::with_capacity(breakdown_rows.len());
        for contribution in &breakdown_rows {
            let position: i64 = contribution
                .try_get("position")
                .map_err(|e| RepositoryError::Database(e.to_string()))?;
            breakdown.push(BracketContribution {
                index: usize::try_from(position)
                    .map_err(|e| RepositoryError::InvalidData(e.to_string()))?,
                lower_bound: get_decimal(contribution, "lower_bound")?,
                upper_bound: get_optional_decimal(contribution, "upper_bound")?,
                rate: get_decimal(contribution, "rate")?,
                taxed_portion: get_decimal(contribution, "taxed_portion")?,
                tax: get_decimal(contribution, "tax")?,
            });
        }

        let rounding = row_to_policy(row)?;
        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        Ok(StoredCalculation {
            id,
            entity_ref: row
                .try_get("entity_ref")
                .map_err(|e| RepositoryError::Database(e.to_string()))?,
            result: CalculationResult {
                table: TableKey::new(
                    row.try_get::<String, _>("jurisdiction_id")
                        .map_err(|e| RepositoryError::Database(e.to_string()))?,
                    row.try_get::<String, _>("tax_type")
                        .map_err(|e| RepositoryError::Database(e.to_string()))?,
                ),
                table_effective_from: row
                    .try_get("table_effective_from")
                    .map_err(|e| RepositoryError::Database(e.to_string()))?,
                currency: row
                    .try_get("currency")
                    .map_err(|e| RepositoryError::Database(e.to_string()))?,
                taxable_amount: get_decimal(row, "taxable_amount")?,
                total_tax: get_decimal(row, "total_tax")?,
                breakdown,
                marginal_rate: get_decimal(row, "marginal_rate")?,
                effective_rate: get_decimal(row, "effective_rate")?,
                rounding,
            },
            created_at,
        })
    }
}

fn row_to_policy(row: &SqliteRow) -> Result<RoundingPolicy, RepositoryError> {
    let final_precision: i64 = row
        .try_get("final_precision")
        .map_err(|e| RepositoryError::Database(e.to_string()))?;
    let intermediate_precision: i64 = row
        .try_get("intermediate_precision")
        .map_err(|e| RepositoryError::Database(e.to_string()))?;
    let mode: String = row
        .try_get("intermediate_rounding")
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

    Ok(RoundingPolicy {
        final_precision: u32::try_from(final_precision)
            .map_err(|e| RepositoryError::InvalidData(e.to_string()))?,
        intermediate_precision: u32::try_from(intermediate_precision)
            .map_err(|e| RepositoryError::InvalidData(e.to_string()))?,
        intermediate_rounding: IntermediateRounding::parse(&mode).ok_or_else(|| {
            RepositoryError::InvalidData(format!("unknown intermediate rounding '{}'", mode))
        })?,
    })
}

const TABLE_COLUMNS: &str = "id, jurisdiction_id, tax_type, effective_from, effective_to";

const RESULT_COLUMNS: &str = "id, entity_ref, jurisdiction_id, tax_type, table_effective_from,
     currency, taxable_amount, total_tax, marginal_rate, effective_rate,
     final_precision, intermediate_precision, intermediate_rounding, created_at";

fn db_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Database(e.to_string())
}

async fn insert_table(
    conn: &mut SqliteConnection,
    table: &BracketTable,
) -> Result<i64, RepositoryError> {
    let id = sqlx::query(
        "INSERT INTO bracket_tables (jurisdiction_id, tax_type, effective_from, effective_to)
         VALUES (?, ?, ?, ?)",
    )
    .bind(table.jurisdiction_id())
    .bind(table.tax_type())
    .bind(table.effective_from())
    .bind(table.effective_to())
    .execute(&mut *conn)
    .await
    .map_err(db_error)?
    .last_insert_rowid();

    for (position, bracket) in table.brackets().iter().enumerate() {
        sqlx::query(
            "INSERT INTO tax_brackets (table_id, position, lower_bound, upper_bound, rate)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(position as i64)
        .bind(decimal_to_text(bracket.lower_bound))
        .bind(bracket.upper_bound.map(decimal_to_text))
        .bind(decimal_to_text(bracket.rate))
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;
    }

    Ok(id)
}

async fn delete_tables(
    conn: &mut SqliteConnection,
    key: &TableKey,
    effective_from: NaiveDate,
) -> Result<u64, RepositoryError> {
    sqlx::query(
        "DELETE FROM tax_brackets WHERE table_id IN (
            SELECT id FROM bracket_tables
            WHERE jurisdiction_id = ? AND tax_type = ? AND effective_from = ?
         )",
    )
    .bind(&key.jurisdiction_id)
    .bind(&key.tax_type)
    .bind(effective_from)
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;

    let deleted = sqlx::query(
        "DELETE FROM bracket_tables
         WHERE jurisdiction_id = ? AND tax_type = ? AND effective_from = ?",
    )
    .bind(&key.jurisdiction_id)
    .bind(&key.tax_type)
    .bind(effective_from)
    .execute(&mut *conn)
    .await
    .map_err(db_error)?
    .rows_affected();

    Ok(deleted)
}

#[async_trait]
impl TaxRepository for SqliteRepository {
    async fn resolve_bracket_table(
        &self,
        key: &TableKey,
        as_of: NaiveDate,
    ) -> Result<BracketTable, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {TABLE_COLUMNS}
             FROM bracket_tables
             WHERE jurisdiction_id = ? AND tax_type = ?
               AND effective_from <= ?
               AND (effective_to IS NULL OR effective_to >= ?)
             ORDER BY effective_from DESC
             LIMIT 1"
        ))
        .bind(&key.jurisdiction_id)
        .bind(&key.tax_type)
        .bind(as_of)
        .bind(as_of)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?
        .ok_or(RepositoryError::NotFound)?;

        self.load_table(&row).await
    }

    async fn list_bracket_tables(&self) -> Result<Vec<BracketTable>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {TABLE_COLUMNS}
             FROM bracket_tables
             ORDER BY jurisdiction_id, tax_type, effective_from"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in &rows {
            tables.push(self.load_table(row).await?);
        }
        Ok(tables)
    }

    async fn insert_bracket_table(
        &self,
        table: &BracketTable,
    ) -> Result<i64, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let id = insert_table(&mut tx, table).await?;
        tx.commit().await.map_err(db_error)?;

        debug!(table = %table.key(), id, "inserted bracket table");
        Ok(id)
    }

    async fn delete_bracket_tables(
        &self,
        key: &TableKey,
        effective_from: NaiveDate,
    ) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let deleted = delete_tables(&mut tx, key, effective_from).await?;
        tx.commit().await.map_err(db_error)?;
        Ok(deleted)
    }

    async fn replace_bracket_table(
        &self,
        table: &BracketTable,
    ) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let replaced = delete_tables(&mut tx, table.key(), table.effective_from()).await?;
        let id = insert_table(&mut tx, table).await?;
        tx.commit().await.map_err(db_error)?;

        debug!(table = %table.key(), id, replaced, "replaced bracket table");
        Ok(replaced)
    }

    async fn store_result(
        &self,
        entity_ref: &str,
        result: &CalculationResult,
    ) -> Result<i64, RepositoryError> {
        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        let id = sqlx::query(
            "INSERT INTO calculation_results (
                entity_ref, jurisdiction_id, tax_type, table_effective_from,
                currency, taxable_amount, total_tax, marginal_rate, effective_rate,
                final_precision, intermediate_precision, intermediate_rounding, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entity_ref)
        .bind(&result.table.jurisdiction_id)
        .bind(&result.table.tax_type)
        .bind(result.table_effective_from)
        .bind(&result.currency)
        .bind(decimal_to_text(result.taxable_amount))
        .bind(decimal_to_text(result.total_tax))
        .bind(decimal_to_text(result.marginal_rate))
        .bind(decimal_to_text(result.effective_rate))
        .bind(i64::from(result.rounding.final_precision))
        .bind(i64::from(result.rounding.intermediate_precision))
        .bind(result.rounding.intermediate_rounding.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?
        .last_insert_rowid();

        for contribution in &result.breakdown {
            sqlx::query(
                "INSERT INTO calculation_breakdown (
                    result_id, position, lower_bound, upper_bound, rate, taxed_portion, tax
                ) VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(contribution.index as i64)
            .bind(decimal_to_text(contribution.lower_bound))
            .bind(contribution.upper_bound.map(decimal_to_text))
            .bind(decimal_to_text(contribution.rate))
            .bind(decimal_to_text(contribution.taxed_portion))
            .bind(decimal_to_text(contribution.tax))
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        debug!(entity_ref = %entity_ref, id, "stored calculation result");
        Ok(id)
    }

    async fn get_result(
        &self,
        id: i64,
    ) -> Result<StoredCalculation, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {RESULT_COLUMNS} FROM calculation_results WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?
        .ok_or(RepositoryError::NotFound)?;

        self.load_result(&row).await
    }

    async fn list_results(
        &self,
        entity_ref: &str,
    ) -> Result<Vec<StoredCalculation>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {RESULT_COLUMNS} FROM calculation_results WHERE entity_ref = ? ORDER BY id"
        ))
        .bind(entity_ref)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            results.push(self.load_result(row).await?);
        }
        Ok(results)
    }
}
