//! Tax calculators.
//!
//! [`ProgressiveCalculator`] is the core bracket engine. The other
//! calculators build on it or on the shared [`RoundingPolicy`]:
//!
//! | Calculator | Computes |
//! |------------|----------|
//! | [`ProgressiveCalculator`] | marginal tax over a [`BracketTable`](crate::BracketTable) |
//! | [`FlatRateCalculator`] | a single rate over the whole amount |
//! | [`BonusCalculator`] | a lump sum spread over equal periods |
//! | [`ComprehensiveIncomeCalculator`] | salary, service, bonus and dividend income together |
//! | [`VatCalculator`] | VAT inside a tax-inclusive price, and surtax on it |
//! | [`TransferCostCalculator`] | every tax levied on a transfer between two entities |

pub mod bonus;
pub mod flat;
pub mod income;
pub mod progressive;
pub mod rounding;
pub mod transfer;
pub mod vat;

pub use bonus::{BonusCalculator, BonusTaxResult, DEFAULT_BONUS_PERIODS};
pub use flat::{FlatRateCalculator, FlatTaxResult};
pub use income::{
    ComprehensiveIncomeCalculator, ComprehensiveIncomeResult, DEFAULT_DIVIDEND_RATE,
    IncomeComponents,
};
pub use progressive::ProgressiveCalculator;
pub use rounding::{
    DEFAULT_FINAL_PRECISION, DEFAULT_INTERMEDIATE_PRECISION, IntermediateRounding, MAX_PRECISION,
    RoundingPolicy, round_half_even,
};
pub use transfer::{TransferCost, TransferCostCalculator, TransferMode, TransferRates};
pub use vat::{VatCalculator, VatResult};
