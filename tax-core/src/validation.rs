//! Input guards run before anything reaches a calculator.
//!
//! Tables are checked once when a [`BracketTable`](crate::BracketTable) is
//! built; amounts are checked every time a
//! [`TaxableAmount`](crate::TaxableAmount) is built. Both abort before any
//! bracket is processed, so a calculator never sees partially valid input.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::{ConfigurationError, InvalidInputError};
use crate::models::TaxBracket;

const NON_FINITE: &[&str] = &[
    "nan", "+nan", "-nan", "inf", "+inf", "-inf", "infinity", "+infinity", "-infinity",
];

/// Checks every structural invariant of an ordered bracket list.
///
/// Ordering is checked across the whole list before contiguity, so a
/// shuffled table reports [`ConfigurationError::NotSorted`] rather than the
/// first gap it happens to hit.
pub fn validate_brackets(brackets: &[TaxBracket]) -> Result<(), ConfigurationError> {
    let (first, last) = match (brackets.first(), brackets.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(ConfigurationError::EmptyTable),
    };

    if !first.lower_bound.is_zero() {
        return Err(ConfigurationError::FirstLowerBoundNotZero(
            first.lower_bound,
        ));
    }

    for (index, bracket) in brackets.iter().enumerate() {
        if bracket.rate.is_sign_negative() && !bracket.rate.is_zero() {
            return Err(ConfigurationError::NegativeRate {
                index,
                rate: bracket.rate,
            });
        }
        if let Some(upper) = bracket.upper_bound {
            if upper <= bracket.lower_bound {
                return Err(ConfigurationError::EmptyBracket {
                    index,
                    lower_bound: bracket.lower_bound,
                    upper_bound: upper,
                });
            }
        }
    }

    for (index, pair) in brackets.windows(2).enumerate() {
        if pair[1].lower_bound <= pair[0].lower_bound {
            return Err(ConfigurationError::NotSorted {
                index: index + 1,
                lower_bound: pair[1].lower_bound,
                previous: pair[0].lower_bound,
            });
        }
    }

    for (index, pair) in brackets.windows(2).enumerate() {
        let upper = pair[0]
            .upper_bound
            .ok_or(ConfigurationError::UnboundedInnerBracket { index })?;
        if upper != pair[1].lower_bound {
            return Err(ConfigurationError::NotContiguous {
                index,
                upper_bound: upper,
                next_lower_bound: pair[1].lower_bound,
            });
        }
        if pair[1].rate < pair[0].rate {
            return Err(ConfigurationError::DecreasingRate {
                index: index + 1,
                rate: pair[1].rate,
                previous: pair[0].rate,
            });
        }
    }

    if let Some(upper) = last.upper_bound {
        return Err(ConfigurationError::BoundedLastBracket(upper));
    }

    Ok(())
}

/// An effective period may be open-ended but must not end before it starts.
pub fn validate_effective_period(
    from: NaiveDate,
    to: Option<NaiveDate>,
) -> Result<(), ConfigurationError> {
    match to {
        Some(to) if to < from => Err(ConfigurationError::InvalidEffectivePeriod { from, to }),
        _ => Ok(()),
    }
}

/// Rejects negative amounts.
pub fn validate_amount(value: Decimal) -> Result<Decimal, InvalidInputError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(InvalidInputError::Negative(value));
    }
    Ok(value)
}

/// A flat rate follows the same sign rule as a bracket rate.
pub fn validate_rate(rate: Decimal) -> Result<Decimal, ConfigurationError> {
    if rate.is_sign_negative() && !rate.is_zero() {
        return Err(ConfigurationError::NegativeFlatRate(rate));
    }
    Ok(rate)
}

/// Parses a boundary string into an exact decimal.
///
/// Inputs that would lose digits are rejected rather than rounded, and the
/// textual spellings of NaN and infinity are reported as non-finite.
pub fn parse_amount(raw: &str) -> Result<Decimal, InvalidInputError> {
    let trimmed = raw.trim();
    if NON_FINITE.contains(&trimmed.to_ascii_lowercase().as_str()) {
        return Err(InvalidInputError::NonFinite(trimmed.to_string()));
    }
    let value = Decimal::from_str_exact(trimmed)
        .map_err(|_| InvalidInputError::NonNumeric(trimmed.to_string()))?;
    validate_amount(value)
}

/// Serde adapters that read decimals from their string form only.
///
/// CSV and TOML hand a bare number to the visitor as an `f64`, which drops
/// digits before a `Decimal` ever sees them. Going through `String` keeps
/// every digit or fails, and JSON or TOML numbers are rejected outright.
pub mod exact_decimal {
    use rust_decimal::Decimal;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(D::Error::custom)
    }

    /// Like [`deserialize`], with a missing or blank value read as `None`.
    pub mod option {
        use rust_decimal::Decimal;
        use serde::de::Error;
        use serde::{Deserialize, Deserializer};

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) if !raw.trim().is_empty() => {
                    super::parse(&raw).map(Some).map_err(D::Error::custom)
                }
                _ => Ok(None),
            }
        }
    }

    fn parse(raw: &str) -> Result<Decimal, String> {
        Decimal::from_str_exact(raw.trim())
            .map_err(|e| format!("'{raw}' is not an exact decimal: {e}"))
    }
}
