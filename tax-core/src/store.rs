//! Process-wide set of bracket tables.
//!
//! A [`TableSnapshot`] is an immutable, validated index of tables. The
//! [`TableStore`] holds the current snapshot behind an `Arc` and swaps it
//! atomically on reload, so a calculation that already holds a snapshot keeps
//! reading the tables it started with.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::error::{ConfigurationError, NotFoundError};
use crate::models::{BracketTable, TableKey};

/// Immutable index of bracket tables keyed by jurisdiction and tax type.
///
/// Tables sharing a key are kept ordered by `effective_from` and never
/// overlap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSnapshot {
    tables: BTreeMap<TableKey, Vec<Arc<BracketTable>>>,
}

impl TableSnapshot {
    /// # Errors
    ///
    /// [`ConfigurationError::OverlappingPeriods`] if two tables for the same
    /// key are effective on a common day.
    pub fn new(tables: impl IntoIterator<Item = BracketTable>) -> Result<Self, ConfigurationError> {
        let mut index: BTreeMap<TableKey, Vec<Arc<BracketTable>>> = BTreeMap::new();
        for table in tables {
            index
                .entry(table.key().clone())
                .or_default()
                .push(Arc::new(table));
        }

        for (key, tables) in index.iter_mut() {
            tables.sort_by_key(|table| table.effective_from());
            for pair in tables.windows(2) {
                if pair[0].overlaps(&pair[1]) {
                    warn!(
                        table = %key,
                        first = %pair[0].effective_from(),
                        second = %pair[1].effective_from(),
                        "overlapping effective periods"
                    );
                    return Err(ConfigurationError::OverlappingPeriods {
                        key: key.to_string(),
                        first: pair[0].effective_from(),
                        second: pair[1].effective_from(),
                    });
                }
            }
        }

        Ok(Self { tables: index })
    }

    /// The table for `key` effective on `as_of`.
    pub fn resolve(
        &self,
        key: &TableKey,
        as_of: NaiveDate,
    ) -> Result<Arc<BracketTable>, NotFoundError> {
        self.tables
            .get(key)
            .and_then(|tables| {
                tables
                    .iter()
                    .rev()
                    .find(|table| table.is_effective_on(as_of))
            })
            .cloned()
            .ok_or_else(|| NotFoundError {
                jurisdiction_id: key.jurisdiction_id.clone(),
                tax_type: key.tax_type.clone(),
                as_of,
            })
    }

    /// Number of tables across all keys.
    pub fn len(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &TableKey> {
        self.tables.keys()
    }

    /// Every table, grouped by key and ordered by `effective_from`.
    pub fn tables(&self) -> impl Iterator<Item = &Arc<BracketTable>> {
        self.tables.values().flatten()
    }
}

/// Holder of the current [`TableSnapshot`].
///
/// Readers clone the `Arc` and release the lock immediately; calculations
/// never run while the lock is held.
#[derive(Debug, Default)]
pub struct TableStore {
    current: RwLock<Arc<TableSnapshot>>,
}

impl TableStore {
    pub fn new(snapshot: TableSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Handle to the snapshot in effect right now.
    pub fn snapshot(&self) -> Arc<TableSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the current snapshot and returns the one it replaced.
    pub fn publish(
        &self,
        snapshot: TableSnapshot,
    ) -> Arc<TableSnapshot> {
        let tables = snapshot.len();
        let keys = snapshot.tables.len();
        let mut current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut *current, Arc::new(snapshot));
        drop(current);

        info!(tables, keys, "published bracket table snapshot");
        previous
    }

    /// Validates `tables` into a snapshot and publishes it. On error the
    /// current snapshot is left untouched.
    pub fn load(
        &self,
        tables: impl IntoIterator<Item = BracketTable>,
    ) -> Result<Arc<TableSnapshot>, ConfigurationError> {
        let snapshot = TableSnapshot::new(tables)?;
        Ok(self.publish(snapshot))
    }

    pub fn resolve(
        &self,
        key: &TableKey,
        as_of: NaiveDate,
    ) -> Result<Arc<BracketTable>, NotFoundError> {
        self.snapshot().resolve(key, as_of)
    }
}
