//! Annualised bonus taxation.
//!
//! A one-off bonus is spread over a number of equal periods (twelve months
//! by default), one share is taxed progressively, and the per-share tax is
//! scaled back up. This keeps a lump sum from being pushed straight into the
//! top brackets of a per-period schedule.
//!
//! The per-share tax is scaled at intermediate precision; final rounding is
//! applied once, to the scaled total.
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use rust_decimal_macros::dec;
//! use tax_core::calculations::BonusCalculator;
//! use tax_core::{BracketTable, TableKey, TaxableAmount};
//!
//! let monthly = BracketTable::from_tuples(
//!     TableKey::new("CN", "monthly"),
//!     NaiveDate::from_ymd_opt(2019, 1, 1).unwrap(),
//!     None,
//!     [
//!         (dec!(0), Some(dec!(3000)), dec!(0.03)),
//!         (dec!(3000), Some(dec!(12000)), dec!(0.10)),
//!         (dec!(12000), None, dec!(0.20)),
//!     ],
//! )
//! .unwrap();
//!
//! let bonus = TaxableAmount::new(dec!(60000), "CNY").unwrap();
//! let result = BonusCalculator::default().compute(&bonus, &monthly).unwrap();
//!
//! // 60000 / 12 = 5000 per month -> 290 per month -> 3480 for the year
//! assert_eq!(result.per_period.total_tax, dec!(290.00));
//! assert_eq!(result.total_tax, dec!(3480.00));
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calculations::progressive::ProgressiveCalculator;
use crate::calculations::rounding::RoundingPolicy;
use crate::error::{CalculationError, InvalidInputError, PrecisionError};
use crate::models::{BracketTable, CalculationResult, TaxableAmount};

pub const DEFAULT_BONUS_PERIODS: u32 = 12;

/// Outcome of a bonus calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusTaxResult {
    pub currency: String,
    pub bonus: Decimal,
    pub periods: u32,

    /// `bonus / periods` at intermediate precision.
    pub per_period_amount: Decimal,

    /// Progressive result for a single share.
    pub per_period: CalculationResult,

    /// Tax on a single share at intermediate precision.
    pub per_period_tax: Decimal,

    /// `per_period_tax × periods` at final precision.
    pub total_tax: Decimal,
}

impl BonusTaxResult {
    pub fn net_amount(&self) -> Decimal {
        self.bonus - self.total_tax
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BonusCalculator {
    calculator: ProgressiveCalculator,
    periods: u32,
}

impl Default for BonusCalculator {
    fn default() -> Self {
        Self {
            calculator: ProgressiveCalculator::default(),
            periods: DEFAULT_BONUS_PERIODS,
        }
    }
}

impl BonusCalculator {
    /// # Errors
    ///
    /// - [`InvalidInputError::ZeroPeriods`] if `periods` is zero
    /// - the policy's validation error
    pub fn new(
        policy: RoundingPolicy,
        periods: u32,
    ) -> Result<Self, CalculationError> {
        if periods == 0 {
            return Err(InvalidInputError::ZeroPeriods.into());
        }
        Ok(Self {
            calculator: ProgressiveCalculator::new(policy)?,
            periods,
        })
    }

    pub fn periods(&self) -> u32 {
        self.periods
    }

    pub fn compute(
        &self,
        bonus: &TaxableAmount,
        table: &BracketTable,
    ) -> Result<BonusTaxResult, CalculationError> {
        let policy = self.calculator.policy();
        let periods = Decimal::from(self.periods);

        let share = bonus
            .value()
            .checked_div(periods)
            .ok_or(PrecisionError::Overflow("bonus share"))?;
        let per_period_amount = policy.round_intermediate(share);
        let per_period = self
            .calculator
            .compute(&bonus.with_value(per_period_amount)?, table)?;

        let per_period_tax = self.calculator.intermediate_total(&per_period)?;
        let scaled = per_period_tax
            .checked_mul(periods)
            .ok_or(PrecisionError::Overflow("bonus tax"))?;
        let total_tax = policy.round_final(scaled);

        debug!(
            bonus = %bonus.value(),
            periods = self.periods,
            per_period_amount = %per_period_amount,
            per_period_tax = %per_period_tax,
            total_tax = %total_tax,
            "bonus tax computed"
        );

        Ok(BonusTaxResult {
            currency: bonus.currency().to_string(),
            bonus: bonus.value(),
            periods: self.periods,
            per_period_amount,
            per_period,
            per_period_tax,
            total_tax,
        })
    }
}
