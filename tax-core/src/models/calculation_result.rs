use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::calculations::RoundingPolicy;
use crate::models::TableKey;

/// What one bracket contributed to a calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketContribution {
    /// Position of the bracket in its table.
    pub index: usize,
    pub lower_bound: Decimal,
    pub upper_bound: Option<Decimal>,
    pub rate: Decimal,

    /// Part of the taxable amount that fell inside the bracket.
    pub taxed_portion: Decimal,

    /// `taxed_portion × rate` at intermediate precision (or exact, when the
    /// policy defers intermediate rounding until after summation).
    pub tax: Decimal,
}

/// Outcome of a progressive calculation. Owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationResult {
    pub table: TableKey,
    pub table_effective_from: NaiveDate,
    pub currency: String,
    pub taxable_amount: Decimal,

    /// Sum of contributions rounded to final precision, half-to-even.
    pub total_tax: Decimal,

    /// One entry per bracket in table order, including brackets the amount
    /// never reached.
    pub breakdown: Vec<BracketContribution>,

    /// Rate of the bracket containing the taxable amount.
    pub marginal_rate: Decimal,

    /// `total_tax / taxable_amount` at intermediate precision, zero for a
    /// zero amount.
    pub effective_rate: Decimal,

    /// Policy the figures above were computed under.
    pub rounding: RoundingPolicy,
}

impl CalculationResult {
    /// What is left of the taxable amount after tax.
    pub fn net_amount(&self) -> Decimal {
        self.taxable_amount - self.total_tax
    }
}

/// A result as persisted by a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCalculation {
    pub id: i64,
    pub entity_ref: String,
    pub result: CalculationResult,
    pub created_at: DateTime<Utc>,
}
