use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::models::TaxBracket;
use crate::validation::{validate_brackets, validate_effective_period};

/// Identifies the family of tables a calculation draws from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableKey {
    pub jurisdiction_id: String,
    pub tax_type: String,
}

impl TableKey {
    pub fn new(
        jurisdiction_id: impl Into<String>,
        tax_type: impl Into<String>,
    ) -> Self {
        Self {
            jurisdiction_id: jurisdiction_id.into(),
            tax_type: tax_type.into(),
        }
    }
}

impl fmt::Display for TableKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}/{}", self.jurisdiction_id, self.tax_type)
    }
}

/// An ordered, validated set of brackets for one jurisdiction, tax type and
/// effective period.
///
/// A `BracketTable` can only be obtained through [`BracketTable::new`] (or
/// deserialization, which routes through it), so holding one is proof that
/// every structural invariant holds:
///
/// - brackets ascend by `lower_bound` and are contiguous;
/// - the first bracket starts at zero and the last is unbounded;
/// - rates are non-negative and non-decreasing.
///
/// Tables are never mutated after construction and can be shared freely
/// behind an `Arc`.
///
/// # Example
///
/// ```
/// use chrono::NaiveDate;
/// use rust_decimal_macros::dec;
/// use tax_core::{BracketTable, TableKey};
///
/// let table = BracketTable::from_tuples(
///     TableKey::new("CN", "monthly"),
///     NaiveDate::from_ymd_opt(2019, 1, 1).unwrap(),
///     None,
///     [
///         (dec!(0), Some(dec!(3000)), dec!(0.03)),
///         (dec!(3000), Some(dec!(12000)), dec!(0.10)),
///         (dec!(12000), None, dec!(0.20)),
///     ],
/// )
/// .unwrap();
///
/// assert_eq!(table.bracket_index_for(dec!(3000)), Some(1));
/// assert_eq!(table.quick_deduction(1), Some(dec!(210)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBracketTable")]
pub struct BracketTable {
    key: TableKey,
    effective_from: NaiveDate,
    effective_to: Option<NaiveDate>,
    brackets: Vec<TaxBracket>,
}

/// Unvalidated shape used when reading tables from configuration files.
#[derive(Debug, Deserialize)]
struct RawBracketTable {
    key: TableKey,
    effective_from: NaiveDate,
    #[serde(default)]
    effective_to: Option<NaiveDate>,
    brackets: Vec<TaxBracket>,
}

impl TryFrom<RawBracketTable> for BracketTable {
    type Error = ConfigurationError;

    fn try_from(raw: RawBracketTable) -> Result<Self, Self::Error> {
        BracketTable::new(raw.key, raw.effective_from, raw.effective_to, raw.brackets)
    }
}

impl BracketTable {
    /// Validates and builds a table.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] if the key is blank, the effective
    /// period is inverted, or any bracket invariant is violated. A table is
    /// never partially constructed.
    pub fn new(
        key: TableKey,
        effective_from: NaiveDate,
        effective_to: Option<NaiveDate>,
        brackets: Vec<TaxBracket>,
    ) -> Result<Self, ConfigurationError> {
        if key.jurisdiction_id.trim().is_empty() || key.tax_type.trim().is_empty() {
            return Err(ConfigurationError::BlankKey);
        }
        validate_effective_period(effective_from, effective_to)?;
        validate_brackets(&brackets)?;

        Ok(Self {
            key,
            effective_from,
            effective_to,
            brackets,
        })
    }

    /// Builds a table from raw `(lower, upper, rate)` tuples.
    pub fn from_tuples(
        key: TableKey,
        effective_from: NaiveDate,
        effective_to: Option<NaiveDate>,
        rows: impl IntoIterator<Item = (Decimal, Option<Decimal>, Decimal)>,
    ) -> Result<Self, ConfigurationError> {
        let brackets = rows
            .into_iter()
            .map(|(lower, upper, rate)| TaxBracket::new(lower, upper, rate))
            .collect();
        Self::new(key, effective_from, effective_to, brackets)
    }

    pub fn key(&self) -> &TableKey {
        &self.key
    }

    pub fn jurisdiction_id(&self) -> &str {
        &self.key.jurisdiction_id
    }

    pub fn tax_type(&self) -> &str {
        &self.key.tax_type
    }

    pub fn effective_from(&self) -> NaiveDate {
        self.effective_from
    }

    /// Last day (inclusive) the table applies, `None` when open-ended.
    pub fn effective_to(&self) -> Option<NaiveDate> {
        self.effective_to
    }

    pub fn brackets(&self) -> &[TaxBracket] {
        &self.brackets
    }

    pub fn is_effective_on(
        &self,
        date: NaiveDate,
    ) -> bool {
        date >= self.effective_from && self.effective_to.is_none_or(|to| date <= to)
    }

    /// Whether the effective periods of two tables share at least one day.
    pub fn overlaps(
        &self,
        other: &BracketTable,
    ) -> bool {
        let starts_before_other_ends = other
            .effective_to
            .is_none_or(|to| self.effective_from <= to);
        let ends_after_other_starts = self
            .effective_to
            .is_none_or(|to| to >= other.effective_from);
        starts_before_other_ends && ends_after_other_starts
    }

    /// Index of the unique bracket with `lower_bound <= amount < upper_bound`.
    ///
    /// Returns `None` only for negative amounts.
    pub fn bracket_index_for(
        &self,
        amount: Decimal,
    ) -> Option<usize> {
        if amount < Decimal::ZERO {
            return None;
        }
        let above = self
            .brackets
            .partition_point(|bracket| bracket.lower_bound <= amount);
        above.checked_sub(1)
    }

    pub fn bracket_for(
        &self,
        amount: Decimal,
    ) -> Option<&TaxBracket> {
        self.bracket_index_for(amount)
            .map(|index| &self.brackets[index])
    }

    /// Exact tax owed on an amount equal to `brackets[index].lower_bound`,
    /// i.e. the full contributions of every bracket below `index`.
    ///
    /// Returns `None` when `index` is out of range or the sum overflows.
    pub fn base_tax(
        &self,
        index: usize,
    ) -> Option<Decimal> {
        if index >= self.brackets.len() {
            return None;
        }
        self.brackets[..index]
            .iter()
            .try_fold(Decimal::ZERO, |sum, bracket| {
                let width = bracket.width()?;
                sum.checked_add(width.checked_mul(bracket.rate)?)
            })
    }

    /// The quick-deduction figure published alongside many rate schedules:
    /// for an amount in bracket `index`, `tax = amount × rate − quick_deduction`.
    pub fn quick_deduction(
        &self,
        index: usize,
    ) -> Option<Decimal> {
        let bracket = self.brackets.get(index)?;
        bracket
            .lower_bound
            .checked_mul(bracket.rate)?
            .checked_sub(self.base_tax(index)?)
    }
}
