//! Rounding rules shared by every calculator.
//!
//! All arithmetic is exact decimal; rounding happens only at two named
//! checkpoints, both using round-half-to-even:
//!
//! | Checkpoint   | Default places | Applied to |
//! |--------------|----------------|------------|
//! | intermediate | 4              | each bracket contribution, rates |
//! | final        | 2              | the summed total tax |

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{CalculationError, ConfigurationError, PrecisionError};

/// Largest scale `rust_decimal::Decimal` can represent.
pub const MAX_PRECISION: u32 = 28;

pub const DEFAULT_FINAL_PRECISION: u32 = 2;
pub const DEFAULT_INTERMEDIATE_PRECISION: u32 = 4;

/// Rounds `value` to `dp` places with round-half-to-even and pins the scale
/// to exactly `dp`, so `90` becomes `90.0000` at four places.
///
/// # Examples
///
/// ```
/// use rust_decimal_macros::dec;
/// use tax_core::calculations::round_half_even;
///
/// assert_eq!(round_half_even(dec!(0.125), 2), dec!(0.12));
/// assert_eq!(round_half_even(dec!(0.135), 2), dec!(0.14));
/// assert_eq!(round_half_even(dec!(90), 4).to_string(), "90.0000");
/// ```
pub fn round_half_even(
    value: Decimal,
    dp: u32,
) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointNearestEven);
    rounded.rescale(dp);
    rounded
}

/// Where intermediate rounding is applied.
///
/// The published rules only say that intermediates keep four places.
/// `PerBracket` rounds every contribution before summing; `AfterSummation`
/// sums exact contributions and rounds the sum once at intermediate
/// precision before the final rounding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntermediateRounding {
    #[default]
    PerBracket,
    AfterSummation,
}

impl IntermediateRounding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PerBracket => "per_bracket",
            Self::AfterSummation => "after_summation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "per_bracket" => Some(Self::PerBracket),
            "after_summation" => Some(Self::AfterSummation),
            _ => None,
        }
    }
}

/// Precision contract applied during and after a calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundingPolicy {
    /// Minor-unit places of the target currency.
    pub final_precision: u32,

    /// Places kept on every intermediate value; never below `final_precision`.
    pub intermediate_precision: u32,

    pub intermediate_rounding: IntermediateRounding,
}

impl Default for RoundingPolicy {
    fn default() -> Self {
        Self {
            final_precision: DEFAULT_FINAL_PRECISION,
            intermediate_precision: DEFAULT_INTERMEDIATE_PRECISION,
            intermediate_rounding: IntermediateRounding::PerBracket,
        }
    }
}

impl RoundingPolicy {
    /// Builds and validates a policy with per-bracket intermediate rounding.
    pub fn new(
        final_precision: u32,
        intermediate_precision: u32,
    ) -> Result<Self, CalculationError> {
        let policy = Self {
            final_precision,
            intermediate_precision,
            intermediate_rounding: IntermediateRounding::PerBracket,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Policy for a currency with `minor_units` decimal places, keeping the
    /// default four intermediate places unless the currency needs more.
    pub fn for_currency(minor_units: u32) -> Result<Self, CalculationError> {
        Self::new(
            minor_units,
            minor_units.max(DEFAULT_INTERMEDIATE_PRECISION),
        )
    }

    pub fn with_intermediate_rounding(
        self,
        intermediate_rounding: IntermediateRounding,
    ) -> Self {
        Self {
            intermediate_rounding,
            ..self
        }
    }

    /// # Errors
    ///
    /// - [`PrecisionError::UnsupportedScale`] if either precision exceeds
    ///   [`MAX_PRECISION`]
    /// - [`ConfigurationError::InvalidPrecision`] if intermediate precision is
    ///   below final precision
    pub fn validate(&self) -> Result<(), CalculationError> {
        for precision in [self.final_precision, self.intermediate_precision] {
            if precision > MAX_PRECISION {
                return Err(PrecisionError::UnsupportedScale(precision).into());
            }
        }
        if self.intermediate_precision < self.final_precision {
            return Err(ConfigurationError::InvalidPrecision {
                final_precision: self.final_precision,
                intermediate_precision: self.intermediate_precision,
            }
            .into());
        }
        Ok(())
    }

    pub fn round_intermediate(
        &self,
        value: Decimal,
    ) -> Decimal {
        round_half_even(value, self.intermediate_precision)
    }

    pub fn round_final(
        &self,
        value: Decimal,
    ) -> Decimal {
        round_half_even(value, self.final_precision)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;

    // =========================================================================
    // round_half_even tests
    // =========================================================================

    #[test]
    fn round_half_even_rounds_midpoint_to_even_neighbour() {
        assert_eq!(round_half_even(dec!(2.345), 2), dec!(2.34));
        assert_eq!(round_half_even(dec!(2.355), 2), dec!(2.36));
    }

    #[test]
    fn round_half_even_rounds_non_midpoints_normally() {
        assert_eq!(round_half_even(dec!(2.3451), 2), dec!(2.35));
        assert_eq!(round_half_even(dec!(2.3449), 2), dec!(2.34));
    }

    #[test]
    fn round_half_even_handles_negative_midpoint() {
        assert_eq!(round_half_even(dec!(-0.125), 2), dec!(-0.12));
    }

    #[test]
    fn round_half_even_pads_scale() {
        assert_eq!(round_half_even(dec!(290), 2).to_string(), "290.00");
        assert_eq!(round_half_even(dec!(0.058), 4).to_string(), "0.0580");
    }

    #[test]
    fn round_half_even_is_idempotent() {
        for value in [dec!(0.00), dec!(123.45), dec!(99999999.99), dec!(0.01)] {
            let once = round_half_even(value, 2);

            assert_eq!(round_half_even(once, 2), once);
            assert_eq!(once, value);
        }
    }

    #[test]
    fn repeated_midpoints_do_not_drift_upward() {
        let values = [dec!(0.005), dec!(0.015), dec!(0.025), dec!(0.035)];

        let rounded: Decimal = values.iter().map(|v| round_half_even(*v, 2)).sum();

        // 0.00 + 0.02 + 0.02 + 0.04; half-up would give 0.10.
        assert_eq!(rounded, dec!(0.08));
    }

    // =========================================================================
    // RoundingPolicy tests
    // =========================================================================

    #[test]
    fn default_policy_is_two_and_four_places_per_bracket() {
        let policy = RoundingPolicy::default();

        assert_eq!(policy.final_precision, 2);
        assert_eq!(policy.intermediate_precision, 4);
        assert_eq!(policy.intermediate_rounding, IntermediateRounding::PerBracket);
        assert_eq!(policy.validate(), Ok(()));
    }

    #[test]
    fn new_rejects_intermediate_below_final() {
        assert_eq!(
            RoundingPolicy::new(4, 2),
            Err(CalculationError::Configuration(
                ConfigurationError::InvalidPrecision {
                    final_precision: 4,
                    intermediate_precision: 2,
                }
            ))
        );
    }

    #[test]
    fn new_rejects_unsupported_scale() {
        assert_eq!(
            RoundingPolicy::new(2, 29),
            Err(CalculationError::Precision(PrecisionError::UnsupportedScale(
                29
            )))
        );
    }

    #[test]
    fn new_accepts_equal_precisions() {
        assert!(RoundingPolicy::new(0, 0).is_ok());
    }

    #[test]
    fn for_currency_keeps_at_least_four_intermediate_places() {
        let yen = RoundingPolicy::for_currency(0).unwrap();
        let dinar = RoundingPolicy::for_currency(3).unwrap();
        let fine = RoundingPolicy::for_currency(6).unwrap();

        assert_eq!((yen.final_precision, yen.intermediate_precision), (0, 4));
        assert_eq!((dinar.final_precision, dinar.intermediate_precision), (3, 4));
        assert_eq!((fine.final_precision, fine.intermediate_precision), (6, 6));
    }

    #[test]
    fn round_final_uses_final_precision() {
        let policy = RoundingPolicy::default();

        assert_eq!(policy.round_final(dec!(290.0050)), dec!(290.00));
        assert_eq!(policy.round_final(dec!(290.0150)), dec!(290.02));
    }

    #[test]
    fn round_intermediate_uses_intermediate_precision() {
        let policy = RoundingPolicy::default();

        assert_eq!(policy.round_intermediate(dec!(0.123450)), dec!(0.1234));
        assert_eq!(policy.round_intermediate(dec!(0.123350)), dec!(0.1234));
    }

    #[test]
    fn policy_deserializes_with_defaults() {
        let policy: RoundingPolicy =
            serde_json::from_str(r#"{"intermediate_rounding": "after_summation"}"#).unwrap();

        assert_eq!(
            policy,
            RoundingPolicy::default()
                .with_intermediate_rounding(IntermediateRounding::AfterSummation)
        );
    }

    #[test]
    fn intermediate_rounding_round_trips_through_str() {
        for mode in [
            IntermediateRounding::PerBracket,
            IntermediateRounding::AfterSummation,
        ] {
            assert_eq!(IntermediateRounding::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(IntermediateRounding::parse("sometimes"), None);
    }
}
