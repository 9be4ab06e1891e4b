//! Tax cost of moving money from one entity to another.
//!
//! A pre-tax transfer is a sale by the sender: the amount is a
//! tax-inclusive price, so the sender pays VAT on it, surtax on that VAT,
//! and enterprise income tax (EIT) on what is left after VAT. A post-tax
//! transfer is income to the receiver and only bears personal income tax
//! (PIT). A rate that is not given means that tax does not apply.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use tax_core::TaxableAmount;
//! use tax_core::calculations::{TransferCostCalculator, TransferMode, TransferRates};
//!
//! let rates = TransferRates {
//!     vat_rate: Some(dec!(0.13)),
//!     surtax_rate: Some(dec!(0.12)),
//!     eit_rate: Some(dec!(0.25)),
//!     pit_rate: None,
//! };
//! let amount = TaxableAmount::new(dec!(11300), "CNY").unwrap();
//!
//! let cost = TransferCostCalculator::default()
//!     .compute("A01", "B02", &amount, TransferMode::PreTax, &rates)
//!     .unwrap();
//!
//! // VAT 1300, surtax 156, EIT 10000 * 0.25 = 2500
//! assert_eq!(cost.total_cost, dec!(3956.00));
//! assert_eq!(cost.net_amount, dec!(7344.00));
//! ```

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calculations::flat::FlatRateCalculator;
use crate::calculations::rounding::RoundingPolicy;
use crate::calculations::vat::VatCalculator;
use crate::error::{CalculationError, PrecisionError};
use crate::models::TaxableAmount;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    /// Paid out of the sender's revenue before tax.
    PreTax,
    /// Paid to the receiver as taxable income.
    #[default]
    PostTax,
}

impl TransferMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreTax => "pre_tax",
            Self::PostTax => "post_tax",
        }
    }
}

impl fmt::Display for TransferMode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "pre_tax" => Ok(Self::PreTax),
            "post_tax" => Ok(Self::PostTax),
            other => Err(format!("unknown transfer mode '{other}', expected pre_tax or post_tax")),
        }
    }
}

/// Rates registered for the two parties. VAT, surtax and EIT are the
/// sender's; PIT is the receiver's.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRates {
    pub vat_rate: Option<Decimal>,
    pub surtax_rate: Option<Decimal>,
    pub eit_rate: Option<Decimal>,
    pub pit_rate: Option<Decimal>,
}

/// Every tax levied on one transfer. Components that do not apply are zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCost {
    pub sender: String,
    pub receiver: String,
    pub mode: TransferMode,
    pub currency: String,
    pub amount: Decimal,
    pub vat: Decimal,
    pub surtax: Decimal,
    pub eit: Decimal,
    pub pit: Decimal,

    /// Sum of the four components.
    pub total_cost: Decimal,

    /// `amount − total_cost`.
    pub net_amount: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferCostCalculator {
    vat: VatCalculator,
    flat: FlatRateCalculator,
}

impl TransferCostCalculator {
    pub fn new(policy: RoundingPolicy) -> Result<Self, CalculationError> {
        Ok(Self {
            vat: VatCalculator::new(policy)?,
            flat: FlatRateCalculator::new(policy)?,
        })
    }

    /// # Errors
    ///
    /// - a negative rate, as for [`FlatRateCalculator::compute`]
    /// - [`CalculationError::Precision`] on overflow
    pub fn compute(
        &self,
        sender: &str,
        receiver: &str,
        amount: &TaxableAmount,
        mode: TransferMode,
        rates: &TransferRates,
    ) -> Result<TransferCost, CalculationError> {
        let zero = self.vat.policy().round_final(Decimal::ZERO);
        let (mut vat, mut surtax, mut eit, mut pit) = (zero, zero, zero, zero);

        match mode {
            TransferMode::PreTax => {
                let mut net_price = amount.value();
                if let Some(rate) = rates.vat_rate {
                    let split = self.vat.extract(amount, rate)?;
                    vat = split.vat;
                    net_price = split.net;
                }
                if let Some(rate) = rates.surtax_rate {
                    surtax = self.vat.surtax(vat, rate)?;
                }
                if let Some(rate) = rates.eit_rate {
                    eit = self.flat.compute(&amount.with_value(net_price)?, rate)?.tax;
                }
            }
            TransferMode::PostTax => {
                if let Some(rate) = rates.pit_rate {
                    pit = self.flat.compute(amount, rate)?.tax;
                }
            }
        }

        let total_cost = [vat, surtax, eit, pit]
            .into_iter()
            .try_fold(Decimal::ZERO, |sum, part| sum.checked_add(part))
            .ok_or(PrecisionError::Overflow("transfer cost"))?;
        let net_amount = amount.value() - total_cost;

        debug!(
            sender,
            receiver,
            mode = %mode,
            amount = %amount.value(),
            total_cost = %total_cost,
            "transfer cost computed"
        );

        Ok(TransferCost {
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            mode,
            currency: amount.currency().to_string(),
            amount: amount.value(),
            vat,
            surtax,
            eit,
            pit,
            total_cost,
            net_amount,
        })
    }
}
