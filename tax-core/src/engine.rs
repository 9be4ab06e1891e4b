//! Table store and calculator wired together.

use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, warn};

use crate::calculations::{ProgressiveCalculator, RoundingPolicy};
use crate::db::repository::{RepositoryError, TaxRepository};
use crate::error::{CalculationError, ConfigurationError};
use crate::models::{BracketTable, CalculationResult, TableKey, TaxableAmount};
use crate::store::TableStore;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReloadError {
    #[error("failed to read bracket tables: {0}")]
    Repository(#[from] RepositoryError),

    #[error("bracket tables rejected: {0}")]
    Configuration(#[from] ConfigurationError),
}

/// Resolves tables from the current snapshot and computes against them.
///
/// Share it behind an `Arc`; [`TaxEngine::reload_from`] may run while
/// calculations are in flight.
#[derive(Debug, Default)]
pub struct TaxEngine {
    store: TableStore,
    calculator: ProgressiveCalculator,
}

impl TaxEngine {
    pub fn new(policy: RoundingPolicy) -> Result<Self, CalculationError> {
        Ok(Self {
            store: TableStore::default(),
            calculator: ProgressiveCalculator::new(policy)?,
        })
    }

    pub fn store(&self) -> &TableStore {
        &self.store
    }

    pub fn calculator(&self) -> &ProgressiveCalculator {
        &self.calculator
    }

    /// Loads every table from `repo` and publishes them as one snapshot.
    /// Returns the number of tables published.
    ///
    /// Nothing is published if reading or validation fails.
    pub async fn reload_from(
        &self,
        repo: &dyn TaxRepository,
    ) -> Result<usize, ReloadError> {
        let tables = repo.list_bracket_tables().await.inspect_err(|e| {
            warn!(error = %e, "bracket table reload failed");
        })?;
        let count = tables.len();
        self.store.load(tables)?;
        info!(tables = count, "bracket tables reloaded");
        Ok(count)
    }

    /// Resolves the table for `key` on `as_of` and computes tax on `amount`.
    pub fn calculate(
        &self,
        key: &TableKey,
        as_of: NaiveDate,
        amount: &TaxableAmount,
    ) -> Result<CalculationResult, CalculationError> {
        let table = self.store.resolve(key, as_of)?;
        self.calculator.compute(amount, &table)
    }

    /// Like [`TaxEngine::calculate`], but also hands back the table used.
    pub fn calculate_with_table(
        &self,
        key: &TableKey,
        as_of: NaiveDate,
        amount: &TaxableAmount,
    ) -> Result<(Arc<BracketTable>, CalculationResult), CalculationError> {
        let table = self.store.resolve(key, as_of)?;
        let result = self.calculator.compute(amount, &table)?;
        Ok((table, result))
    }
}
