//! Value-added tax carried inside a tax-inclusive price, and the surtaxes
//! levied on it.
//!
//! | Figure | Formula |
//! |--------|---------|
//! | VAT    | `gross × rate / (1 + rate)` |
//! | net    | `gross − VAT` |
//! | surtax | `VAT × surtax_rate` |
//!
//! Each figure passes through the intermediate and then the final rounding
//! checkpoint of the [`RoundingPolicy`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calculations::rounding::RoundingPolicy;
use crate::error::{CalculationError, PrecisionError};
use crate::models::TaxableAmount;
use crate::validation::validate_rate;

/// A tax-inclusive price split into its VAT and net parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VatResult {
    pub currency: String,
    pub gross: Decimal,
    pub vat_rate: Decimal,
    pub vat: Decimal,
    pub net: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VatCalculator {
    policy: RoundingPolicy,
}

impl VatCalculator {
    pub fn new(policy: RoundingPolicy) -> Result<Self, CalculationError> {
        policy.validate()?;
        Ok(Self { policy })
    }

    pub fn policy(&self) -> &RoundingPolicy {
        &self.policy
    }

    fn round(
        &self,
        exact: Decimal,
    ) -> Decimal {
        self.policy.round_final(self.policy.round_intermediate(exact))
    }

    /// Extracts the VAT contained in the tax-inclusive price `gross`.
    ///
    /// # Errors
    ///
    /// - [`ConfigurationError::NegativeFlatRate`](crate::ConfigurationError::NegativeFlatRate)
    ///   for a negative rate
    /// - [`CalculationError::Precision`] on overflow
    pub fn extract(
        &self,
        gross: &TaxableAmount,
        vat_rate: Decimal,
    ) -> Result<VatResult, CalculationError> {
        let vat_rate = validate_rate(vat_rate)?;
        let exact = gross
            .value()
            .checked_mul(vat_rate)
            .and_then(|taxed| taxed.checked_div(Decimal::ONE + vat_rate))
            .ok_or(PrecisionError::Overflow("vat"))?;
        let vat = self.round(exact);
        let net = gross.value() - vat;

        debug!(gross = %gross.value(), vat_rate = %vat_rate, vat = %vat, "vat extracted");

        Ok(VatResult {
            currency: gross.currency().to_string(),
            gross: gross.value(),
            vat_rate,
            vat,
            net,
        })
    }

    /// Surtax levied on an already extracted VAT amount.
    pub fn surtax(
        &self,
        vat: Decimal,
        surtax_rate: Decimal,
    ) -> Result<Decimal, CalculationError> {
        let surtax_rate = validate_rate(surtax_rate)?;
        let exact = vat
            .checked_mul(surtax_rate)
            .ok_or(PrecisionError::Overflow("surtax"))?;
        Ok(self.round(exact))
    }
}
