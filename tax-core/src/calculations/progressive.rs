//! Progressive (bracketed) tax calculation.
//!
//! Every bracket taxes only the part of the amount that falls inside it:
//!
//! | Step | Description |
//! |------|-------------|
//! | 1    | Validate the amount (non-negative, tagged with a currency) |
//! | 2    | For each bracket, portion = `min(upper, amount) − lower`, or 0 below `lower` |
//! | 3    | Contribution = portion × rate, rounded to intermediate precision |
//! | 4    | Sum contributions exactly |
//! | 5    | Round the sum to final precision, half-to-even |
//! | 6    | Marginal rate = rate of the bracket containing the amount |
//! | 7    | Effective rate = total ÷ amount (0 for a zero amount) |
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use rust_decimal_macros::dec;
//! use tax_core::calculations::ProgressiveCalculator;
//! use tax_core::{BracketTable, TableKey, TaxableAmount};
//!
//! let table = BracketTable::from_tuples(
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
//! let amount = TaxableAmount::new(dec!(5000), "CNY").unwrap();
//! let result = ProgressiveCalculator::default().compute(&amount, &table).unwrap();
//!
//! assert_eq!(result.total_tax, dec!(290.00));
//! assert_eq!(result.marginal_rate, dec!(0.10));
//! assert_eq!(result.effective_rate, dec!(0.058));
//! ```

use rust_decimal::Decimal;
use tracing::debug;

use crate::calculations::rounding::{IntermediateRounding, RoundingPolicy};
use crate::error::{CalculationError, InvalidInputError, PrecisionError};
use crate::models::{BracketContribution, BracketTable, CalculationResult, TaxableAmount};

/// Stateless calculator; one instance can serve any number of threads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressiveCalculator {
    policy: RoundingPolicy,
}

impl ProgressiveCalculator {
    /// # Errors
    ///
    /// Returns the policy's validation error if it is not usable.
    pub fn new(policy: RoundingPolicy) -> Result<Self, CalculationError> {
        policy.validate()?;
        Ok(Self { policy })
    }

    pub fn policy(&self) -> &RoundingPolicy {
        &self.policy
    }

    /// Computes the tax on `amount` under `table`.
    ///
    /// The result is bit-exact for identical inputs: no floating point is
    /// involved and rounding happens only at the policy's checkpoints.
    ///
    /// # Errors
    ///
    /// - [`CalculationError::Precision`] if an intermediate value overflows
    ///   the decimal range
    pub fn compute(
        &self,
        amount: &TaxableAmount,
        table: &BracketTable,
    ) -> Result<CalculationResult, CalculationError> {
        let value = amount.value();
        let marginal_index = table
            .bracket_index_for(value)
            .ok_or(InvalidInputError::Negative(value))?;

        let breakdown = self.breakdown(value, table)?;
        let summed = self.sum_contributions(&breakdown)?;
        let total_tax = self.policy.round_final(summed);
        let effective_rate = self.effective_rate(total_tax, value)?;
        let marginal_rate = table.brackets()[marginal_index].rate;

        debug!(
            table = %table.key(),
            amount = %value,
            currency = amount.currency(),
            total_tax = %total_tax,
            marginal_rate = %marginal_rate,
            "progressive tax computed"
        );

        Ok(CalculationResult {
            table: table.key().clone(),
            table_effective_from: table.effective_from(),
            currency: amount.currency().to_string(),
            taxable_amount: value,
            total_tax,
            breakdown,
            marginal_rate,
            effective_rate,
            rounding: self.policy,
        })
    }

    /// Convenience wrapper that validates a raw decimal first.
    pub fn compute_value(
        &self,
        value: Decimal,
        currency: &str,
        table: &BracketTable,
    ) -> Result<CalculationResult, CalculationError> {
        let amount = TaxableAmount::new(value, currency)?;
        self.compute(&amount, table)
    }

    /// Tax of `result` before the final rounding: the contribution sum at
    /// intermediate precision. Callers that scale a result, such as the
    /// bonus calculator, round this once instead of the rounded total.
    pub fn intermediate_total(
        &self,
        result: &CalculationResult,
    ) -> Result<Decimal, CalculationError> {
        self.sum_contributions(&result.breakdown)
    }

    /// One contribution per bracket, in table order.
    fn breakdown(
        &self,
        value: Decimal,
        table: &BracketTable,
    ) -> Result<Vec<BracketContribution>, CalculationError> {
        table
            .brackets()
            .iter()
            .enumerate()
            .map(|(index, bracket)| {
                let taxed_portion = bracket.portion_of(value);
                let exact = taxed_portion
                    .checked_mul(bracket.rate)
                    .ok_or(PrecisionError::Overflow("bracket contribution"))?;
                let tax = match self.policy.intermediate_rounding {
                    IntermediateRounding::PerBracket => self.policy.round_intermediate(exact),
                    IntermediateRounding::AfterSummation => exact,
                };
                Ok(BracketContribution {
                    index,
                    lower_bound: bracket.lower_bound,
                    upper_bound: bracket.upper_bound,
                    rate: bracket.rate,
                    taxed_portion,
                    tax,
                })
            })
            .collect()
    }

    /// Exact sum of the contributions, with the deferred intermediate
    /// rounding applied when the policy asks for it.
    fn sum_contributions(
        &self,
        breakdown: &[BracketContribution],
    ) -> Result<Decimal, CalculationError> {
        let sum = breakdown
            .iter()
            .try_fold(Decimal::ZERO, |sum, contribution| {
                sum.checked_add(contribution.tax)
            })
            .ok_or(PrecisionError::Overflow("contribution sum"))?;

        Ok(match self.policy.intermediate_rounding {
            IntermediateRounding::PerBracket => sum,
            IntermediateRounding::AfterSummation => self.policy.round_intermediate(sum),
        })
    }

    fn effective_rate(
        &self,
        total_tax: Decimal,
        value: Decimal,
    ) -> Result<Decimal, CalculationError> {
        if value.is_zero() {
            return Ok(self.policy.round_intermediate(Decimal::ZERO));
        }
        let rate = total_tax
            .checked_div(value)
            .ok_or(PrecisionError::Overflow("effective rate"))?;
        Ok(self.policy.round_intermediate(rate))
    }
}
