//! Error taxonomy for the calculation engine.
//!
//! Each concern gets its own enum so callers can match on exactly the
//! failures a given operation can produce. [`CalculationError`] wraps all of
//! them for the top-level `compute` entry points.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

/// The taxable amount (or another caller-supplied value) was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvalidInputError {
    /// Taxable amounts must be zero or greater.
    #[error("taxable amount must be non-negative, got {0}")]
    Negative(Decimal),

    /// The raw value could not be parsed as an exact decimal.
    #[error("taxable amount '{0}' is not a valid decimal number")]
    NonNumeric(String),

    /// NaN and infinities have no exact decimal representation.
    #[error("taxable amount '{0}' is not finite")]
    NonFinite(String),

    /// A currency tag is required on every taxable amount.
    #[error("taxable amount has no currency")]
    MissingCurrency,

    /// Amounts combined in one calculation must share a currency.
    #[error("currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch { expected: String, actual: String },

    /// A bonus must be spread over at least one period.
    #[error("bonus must be spread over at least one period")]
    ZeroPeriods,
}

/// A bracket table or rounding configuration failed its structural checks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("bracket table has no brackets")]
    EmptyTable,

    #[error("first bracket must start at 0, got {0}")]
    FirstLowerBoundNotZero(Decimal),

    #[error("bracket {index} lower bound {lower_bound} is not above the previous lower bound {previous}")]
    NotSorted {
        index: usize,
        lower_bound: Decimal,
        previous: Decimal,
    },

    #[error("bracket {index} is empty: upper bound {upper_bound} is not above lower bound {lower_bound}")]
    EmptyBracket {
        index: usize,
        lower_bound: Decimal,
        upper_bound: Decimal,
    },

    #[error("bracket {index} ends at {upper_bound} but the next bracket starts at {next_lower_bound}")]
    NotContiguous {
        index: usize,
        upper_bound: Decimal,
        next_lower_bound: Decimal,
    },

    #[error("bracket {index} is unbounded but is not the last bracket")]
    UnboundedInnerBracket { index: usize },

    #[error("last bracket must be unbounded, got upper bound {0}")]
    BoundedLastBracket(Decimal),

    #[error("bracket {index} has negative rate {rate}")]
    NegativeRate { index: usize, rate: Decimal },

    #[error("bracket {index} rate {rate} is lower than the previous rate {previous}")]
    DecreasingRate {
        index: usize,
        rate: Decimal,
        previous: Decimal,
    },

    #[error("effective period ends ({to}) before it starts ({from})")]
    InvalidEffectivePeriod { from: NaiveDate, to: NaiveDate },

    #[error("table {key} has overlapping effective periods starting {first} and {second}")]
    OverlappingPeriods {
        key: String,
        first: NaiveDate,
        second: NaiveDate,
    },

    #[error(
        "intermediate precision {intermediate_precision} must be at least final precision {final_precision}"
    )]
    InvalidPrecision {
        final_precision: u32,
        intermediate_precision: u32,
    },

    #[error("jurisdiction and tax type must not be blank")]
    BlankKey,

    #[error("flat rate must be non-negative, got {0}")]
    NegativeFlatRate(Decimal),
}

/// No bracket table is effective for the requested key and date.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("no bracket table for {jurisdiction_id}/{tax_type} effective on {as_of}")]
pub struct NotFoundError {
    pub jurisdiction_id: String,
    pub tax_type: String,
    pub as_of: NaiveDate,
}

/// The decimal arithmetic could not honour the requested precision.
///
/// These indicate a defect in the configuration or the caller, never a
/// transient condition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PrecisionError {
    #[error("precision of {0} decimal places exceeds the supported maximum of {max}", max = crate::calculations::MAX_PRECISION)]
    UnsupportedScale(u32),

    #[error("decimal overflow during {0}")]
    Overflow(&'static str),
}

/// Any failure produced by the calculators.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CalculationError {
    #[error(transparent)]
    InvalidInput(#[from] InvalidInputError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error(transparent)]
    Precision(#[from] PrecisionError),
}
