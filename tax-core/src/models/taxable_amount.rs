use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::InvalidInputError;
use crate::validation::{exact_decimal, parse_amount, validate_amount};

/// A non-negative exact amount tagged with its currency or unit.
///
/// Construction is the validation point: a `TaxableAmount` that exists is
/// never negative and always carries a currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTaxableAmount")]
pub struct TaxableAmount {
    value: Decimal,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct RawTaxableAmount {
    #[serde(deserialize_with = "exact_decimal::deserialize")]
    value: Decimal,
    currency: String,
}

impl TryFrom<RawTaxableAmount> for TaxableAmount {
    type Error = InvalidInputError;

    fn try_from(raw: RawTaxableAmount) -> Result<Self, Self::Error> {
        TaxableAmount::new(raw.value, raw.currency)
    }
}

impl TaxableAmount {
    pub fn new(
        value: Decimal,
        currency: impl Into<String>,
    ) -> Result<Self, InvalidInputError> {
        let currency = currency.into();
        if currency.trim().is_empty() {
            return Err(InvalidInputError::MissingCurrency);
        }
        let value = validate_amount(value)?;
        // Normalise -0 so results never carry a negative sign.
        let value = if value.is_zero() { value.abs() } else { value };
        Ok(Self { value, currency })
    }

    /// Parses an amount from its wire representation, e.g. `"5000.00"`.
    pub fn parse(
        raw: &str,
        currency: impl Into<String>,
    ) -> Result<Self, InvalidInputError> {
        Self::new(parse_amount(raw)?, currency)
    }

    pub fn zero(currency: impl Into<String>) -> Result<Self, InvalidInputError> {
        Self::new(Decimal::ZERO, currency)
    }

    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Builds another amount in the same currency.
    pub fn with_value(
        &self,
        value: Decimal,
    ) -> Result<Self, InvalidInputError> {
        Self::new(value, self.currency.clone())
    }

    /// Fails unless both amounts share a currency.
    pub fn ensure_same_currency(
        &self,
        other: &TaxableAmount,
    ) -> Result<(), InvalidInputError> {
        if self.currency != other.currency {
            return Err(InvalidInputError::CurrencyMismatch {
                expected: self.currency.clone(),
                actual: other.currency.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn new_accepts_non_negative_value() {
        let amount = TaxableAmount::new(dec!(5000.00), "CNY").unwrap();

        assert_eq!(amount.value(), dec!(5000.00));
        assert_eq!(amount.currency(), "CNY");
    }

    #[test]
    fn new_rejects_negative_value() {
        assert_eq!(
            TaxableAmount::new(dec!(-1), "CNY"),
            Err(InvalidInputError::Negative(dec!(-1)))
        );
    }

    #[test]
    fn new_rejects_blank_currency() {
        assert_eq!(
            TaxableAmount::new(dec!(1), "  "),
            Err(InvalidInputError::MissingCurrency)
        );
    }

    #[test]
    fn negative_zero_is_normalised() {
        let amount = TaxableAmount::new(dec!(-0.00), "CNY").unwrap();

        assert!(!amount.value().is_sign_negative());
    }

    #[test]
    fn parse_reads_wire_string() {
        let amount = TaxableAmount::parse("12000.50", "CNY").unwrap();

        assert_eq!(amount.value(), dec!(12000.50));
    }

    #[test]
    fn parse_rejects_non_finite() {
        assert_eq!(
            TaxableAmount::parse("NaN", "CNY"),
            Err(InvalidInputError::NonFinite("NaN".to_string()))
        );
    }

    #[test]
    fn ensure_same_currency_reports_mismatch() {
        let cny = TaxableAmount::new(dec!(1), "CNY").unwrap();
        let usd = TaxableAmount::new(dec!(1), "USD").unwrap();

        assert_eq!(
            cny.ensure_same_currency(&usd),
            Err(InvalidInputError::CurrencyMismatch {
                expected: "CNY".to_string(),
                actual: "USD".to_string(),
            })
        );
    }

    #[test]
    fn deserializing_rejects_negative_value() {
        let result: Result<TaxableAmount, _> =
            serde_json::from_str(r#"{"value": "-5", "currency": "CNY"}"#);

        assert!(result.is_err());
    }

    #[test]
    fn deserializing_rejects_numeric_value() {
        let result: Result<TaxableAmount, _> =
            serde_json::from_str(r#"{"value": 5000.1, "currency": "CNY"}"#);

        assert!(result.is_err());
    }
}
