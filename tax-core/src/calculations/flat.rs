//! Proportional (single-rate) tax, e.g. on dividend income.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::calculations::rounding::RoundingPolicy;
use crate::error::{CalculationError, PrecisionError};
use crate::models::TaxableAmount;
use crate::validation::validate_rate;

/// Outcome of a flat-rate calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatTaxResult {
    pub currency: String,
    pub taxable_amount: Decimal,
    pub rate: Decimal,
    pub tax: Decimal,
}

impl FlatTaxResult {
    pub fn net_amount(&self) -> Decimal {
        self.taxable_amount - self.tax
    }
}

/// Applies one rate to the whole amount, with the same two rounding
/// checkpoints as the progressive calculator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatRateCalculator {
    policy: RoundingPolicy,
}

impl FlatRateCalculator {
    pub fn new(policy: RoundingPolicy) -> Result<Self, CalculationError> {
        policy.validate()?;
        Ok(Self { policy })
    }

    /// # Errors
    ///
    /// - [`ConfigurationError::NegativeFlatRate`](crate::ConfigurationError::NegativeFlatRate)
    ///   for a negative rate
    /// - [`CalculationError::Precision`] on overflow
    pub fn compute(
        &self,
        amount: &TaxableAmount,
        rate: Decimal,
    ) -> Result<FlatTaxResult, CalculationError> {
        let rate = validate_rate(rate)?;
        let exact = amount
            .value()
            .checked_mul(rate)
            .ok_or(PrecisionError::Overflow("flat tax"))?;
        let tax = self
            .policy
            .round_final(self.policy.round_intermediate(exact));

        Ok(FlatTaxResult {
            currency: amount.currency().to_string(),
            taxable_amount: amount.value(),
            rate,
            tax,
        })
    }
}
