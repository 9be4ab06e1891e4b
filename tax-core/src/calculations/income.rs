//! Comprehensive individual income tax.
//!
//! Combines the other calculators over the income categories an individual
//! typically reports together:
//!
//! | Category       | Treatment |
//! |----------------|-----------|
//! | salary         | taxed together with service income on the progressive schedule |
//! | service income | shares the progressive tax with salary |
//! | bonus          | annualised over the bonus schedule |
//! | dividend       | flat rate |
//!
//! The combined progressive tax is apportioned to salary by its share of
//! the combined amount; service income takes the remainder so both shares
//! always add up to the combined figure.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calculations::bonus::{BonusCalculator, BonusTaxResult};
use crate::calculations::flat::{FlatRateCalculator, FlatTaxResult};
use crate::calculations::progressive::ProgressiveCalculator;
use crate::calculations::rounding::RoundingPolicy;
use crate::error::{CalculationError, PrecisionError};
use crate::models::{BracketTable, CalculationResult, TaxableAmount};
use crate::validation::validate_rate;

/// Default flat rate on dividend income.
pub const DEFAULT_DIVIDEND_RATE: Decimal = Decimal::from_parts(20, 0, 0, false, 2);

/// The income an individual reports for one period, in one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomeComponents {
    pub currency: String,
    pub salary: Decimal,
    pub bonus: Decimal,
    pub service_income: Decimal,
    pub dividend: Decimal,
}

impl IncomeComponents {
    pub fn total(&self) -> Decimal {
        self.salary + self.bonus + self.service_income + self.dividend
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComprehensiveIncomeResult {
    pub currency: String,
    pub salary: Decimal,
    pub service_income: Decimal,

    /// Progressive result on salary + service income.
    pub combined: CalculationResult,
    pub salary_tax: Decimal,
    pub service_tax: Decimal,

    pub bonus: BonusTaxResult,
    pub dividend: FlatTaxResult,

    pub total_income: Decimal,
    pub total_tax: Decimal,

    /// `total_tax / total_income` at intermediate precision, zero for no income.
    pub effective_rate: Decimal,
}

impl ComprehensiveIncomeResult {
    pub fn total_net(&self) -> Decimal {
        self.total_income - self.total_tax
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComprehensiveIncomeCalculator {
    progressive: ProgressiveCalculator,
    bonus: BonusCalculator,
    flat: FlatRateCalculator,
    dividend_rate: Decimal,
}

impl Default for ComprehensiveIncomeCalculator {
    fn default() -> Self {
        Self {
            progressive: ProgressiveCalculator::default(),
            bonus: BonusCalculator::default(),
            flat: FlatRateCalculator::default(),
            dividend_rate: DEFAULT_DIVIDEND_RATE,
        }
    }
}

impl ComprehensiveIncomeCalculator {
    pub fn new(
        policy: RoundingPolicy,
        bonus_periods: u32,
        dividend_rate: Decimal,
    ) -> Result<Self, CalculationError> {
        Ok(Self {
            progressive: ProgressiveCalculator::new(policy)?,
            bonus: BonusCalculator::new(policy, bonus_periods)?,
            flat: FlatRateCalculator::new(policy)?,
            dividend_rate: validate_rate(dividend_rate)?,
        })
    }

    /// Computes every category and the overall totals.
    ///
    /// `income_table` taxes salary and service income; `bonus_table` is the
    /// per-period schedule the annualised bonus is measured against.
    ///
    /// # Errors
    ///
    /// Fails with [`CalculationError::InvalidInput`] if any component is
    /// negative or the currency is blank; no category is computed in that
    /// case.
    pub fn compute(
        &self,
        components: &IncomeComponents,
        income_table: &BracketTable,
        bonus_table: &BracketTable,
    ) -> Result<ComprehensiveIncomeResult, CalculationError> {
        let currency = components.currency.as_str();
        let salary = TaxableAmount::new(components.salary, currency)?;
        let service = TaxableAmount::new(components.service_income, currency)?;
        let bonus = TaxableAmount::new(components.bonus, currency)?;
        let dividend = TaxableAmount::new(components.dividend, currency)?;

        let combined_value = salary
            .value()
            .checked_add(service.value())
            .ok_or(PrecisionError::Overflow("combined income"))?;
        let combined = self
            .progressive
            .compute(&salary.with_value(combined_value)?, income_table)?;
        let (salary_tax, service_tax) =
            self.apportion(combined.total_tax, salary.value(), combined_value)?;

        let total_income = [combined_value, bonus.value(), dividend.value()]
            .into_iter()
            .try_fold(Decimal::ZERO, |sum, part| sum.checked_add(part))
            .ok_or(PrecisionError::Overflow("total income"))?;

        let bonus = self.bonus.compute(&bonus, bonus_table)?;
        let dividend = self.flat.compute(&dividend, self.dividend_rate)?;

        let total_tax = [combined.total_tax, bonus.total_tax, dividend.tax]
            .into_iter()
            .try_fold(Decimal::ZERO, |sum, tax| sum.checked_add(tax))
            .ok_or(PrecisionError::Overflow("total tax"))?;

        let policy = self.progressive.policy();
        let effective_rate = if total_income.is_zero() {
            policy.round_intermediate(Decimal::ZERO)
        } else {
            let rate = total_tax
                .checked_div(total_income)
                .ok_or(PrecisionError::Overflow("effective rate"))?;
            policy.round_intermediate(rate)
        };

        debug!(
            total_income = %total_income,
            total_tax = %total_tax,
            effective_rate = %effective_rate,
            "comprehensive income tax computed"
        );

        Ok(ComprehensiveIncomeResult {
            currency: currency.to_string(),
            salary: salary.value(),
            service_income: service.value(),
            combined,
            salary_tax,
            service_tax,
            bonus,
            dividend,
            total_income,
            total_tax,
            effective_rate,
        })
    }

    /// Splits `combined_tax` between salary and service income.
    fn apportion(
        &self,
        combined_tax: Decimal,
        salary: Decimal,
        combined: Decimal,
    ) -> Result<(Decimal, Decimal), CalculationError> {
        let policy = self.progressive.policy();
        if combined.is_zero() {
            let zero = policy.round_final(Decimal::ZERO);
            return Ok((zero, zero));
        }
        let salary_share = combined_tax
            .checked_mul(salary)
            .and_then(|product| product.checked_div(combined))
            .ok_or(PrecisionError::Overflow("salary share"))?;
        let salary_tax = policy.round_final(salary_share);
        Ok((salary_tax, combined_tax - salary_tax))
    }
}
