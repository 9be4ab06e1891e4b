//! In-memory repository for unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use super::repository::{RepositoryError, TaxRepository};
use crate::models::{BracketTable, CalculationResult, StoredCalculation, TableKey};

#[derive(Default)]
pub(crate) struct MemoryRepository {
    tables: Mutex<Vec<BracketTable>>,
    results: Mutex<Vec<StoredCalculation>>,
    offline: bool,
}

impl MemoryRepository {
    pub(crate) fn with_tables(tables: Vec<BracketTable>) -> Self {
        Self {
            tables: Mutex::new(tables),
            ..Self::default()
        }
    }

    /// Every call fails with a connection error.
    pub(crate) fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    fn connect(&self) -> Result<(), RepositoryError> {
        if self.offline {
            return Err(RepositoryError::Connection("offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TaxRepository for MemoryRepository {
    async fn resolve_bracket_table(
        &self,
        key: &TableKey,
        as_of: NaiveDate,
    ) -> Result<BracketTable, RepositoryError> {
        self.connect()?;
        self.tables
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.key() == key && t.is_effective_on(as_of))
            .max_by_key(|t| t.effective_from())
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn list_bracket_tables(&self) -> Result<Vec<BracketTable>, RepositoryError> {
        self.connect()?;
        Ok(self.tables.lock().unwrap().clone())
    }

    async fn insert_bracket_table(
        &self,
        table: &BracketTable,
    ) -> Result<i64, RepositoryError> {
        self.connect()?;
        let mut tables = self.tables.lock().unwrap();
        tables.push(table.clone());
        Ok(tables.len() as i64)
    }

    async fn delete_bracket_tables(
        &self,
        key: &TableKey,
        effective_from: NaiveDate,
    ) -> Result<u64, RepositoryError> {
        self.connect()?;
        let mut tables = self.tables.lock().unwrap();
        let before = tables.len();
        tables.retain(|t| !(t.key() == key && t.effective_from() == effective_from));
        Ok((before - tables.len()) as u64)
    }

    async fn replace_bracket_table(
        &self,
        table: &BracketTable,
    ) -> Result<u64, RepositoryError> {
        self.connect()?;
        let mut tables = self.tables.lock().unwrap();
        let before = tables.len();
        tables.retain(|t| !(t.key() == table.key() && t.effective_from() == table.effective_from()));
        let replaced = (before - tables.len()) as u64;
        tables.push(table.clone());
        Ok(replaced)
    }

    async fn store_result(
        &self,
        entity_ref: &str,
        result: &CalculationResult,
    ) -> Result<i64, RepositoryError> {
        self.connect()?;
        let mut results = self.results.lock().unwrap();
        let id = results.len() as i64 + 1;
        results.push(StoredCalculation {
            id,
            entity_ref: entity_ref.to_string(),
            result: result.clone(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn get_result(&self, id: i64) -> Result<StoredCalculation, RepositoryError> {
        self.connect()?;
        self.results
            .lock()
            .unwrap()
            .iter()
            .find(|stored| stored.id == id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn list_results(
        &self,
        entity_ref: &str,
    ) -> Result<Vec<StoredCalculation>, RepositoryError> {
        self.connect()?;
        Ok(self
            .results
            .lock()
            .unwrap()
            .iter()
            .filter(|stored| stored.entity_ref == entity_ref)
            .cloned()
            .collect())
    }
}
