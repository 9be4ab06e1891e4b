use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{BracketTable, CalculationResult, StoredCalculation, TableKey};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Record not found")]
    NotFound,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A stored row could not be turned back into a valid model.
    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

#[async_trait]
pub trait TaxRepository: Send + Sync {
    // Bracket tables
    async fn resolve_bracket_table(
        &self,
        key: &TableKey,
        as_of: NaiveDate,
    ) -> Result<BracketTable, RepositoryError>;

    async fn list_bracket_tables(&self) -> Result<Vec<BracketTable>, RepositoryError>;

    async fn insert_bracket_table(
        &self,
        table: &BracketTable,
    ) -> Result<i64, RepositoryError>;

    /// Deletes the table for `key` starting on `effective_from`; returns the
    /// number of tables removed.
    async fn delete_bracket_tables(
        &self,
        key: &TableKey,
        effective_from: NaiveDate,
    ) -> Result<u64, RepositoryError>;

    /// Deletes any table with the same key and start date as `table` and
    /// inserts `table`, atomically. Returns the number of tables removed.
    async fn replace_bracket_table(
        &self,
        table: &BracketTable,
    ) -> Result<u64, RepositoryError>;

    // Calculation results
    async fn store_result(
        &self,
        entity_ref: &str,
        result: &CalculationResult,
    ) -> Result<i64, RepositoryError>;

    async fn get_result(&self, id: i64) -> Result<StoredCalculation, RepositoryError>;

    async fn list_results(
        &self,
        entity_ref: &str,
    ) -> Result<Vec<StoredCalculation>, RepositoryError>;
}
