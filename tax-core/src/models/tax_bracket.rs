use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::validation::exact_decimal;

/// One contiguous income range taxed at a single rate.
///
/// `lower_bound` is inclusive, `upper_bound` is exclusive and `None` means
/// the bracket is unbounded above.
///
/// Decimals deserialize from strings only, so a rate written as a bare
/// float in a config file is rejected instead of rounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBracket {
    #[serde(deserialize_with = "exact_decimal::deserialize")]
    pub lower_bound: Decimal,
    #[serde(default, deserialize_with = "exact_decimal::option::deserialize")]
    pub upper_bound: Option<Decimal>,
    #[serde(deserialize_with = "exact_decimal::deserialize")]
    pub rate: Decimal,
}

impl TaxBracket {
    pub fn new(
        lower_bound: Decimal,
        upper_bound: Option<Decimal>,
        rate: Decimal,
    ) -> Self {
        Self {
            lower_bound,
            upper_bound,
            rate,
        }
    }

    /// Whether `amount` falls in `[lower_bound, upper_bound)`.
    pub fn contains(
        &self,
        amount: Decimal,
    ) -> bool {
        amount >= self.lower_bound && self.upper_bound.is_none_or(|upper| amount < upper)
    }

    /// Width of the bracket, `None` when unbounded.
    pub fn width(&self) -> Option<Decimal> {
        self.upper_bound.map(|upper| upper - self.lower_bound)
    }

    /// The part of `amount` that falls inside this bracket.
    pub fn portion_of(
        &self,
        amount: Decimal,
    ) -> Decimal {
        if amount <= self.lower_bound {
            return Decimal::ZERO;
        }
        let ceiling = match self.upper_bound {
            Some(upper) => amount.min(upper),
            None => amount,
        };
        ceiling - self.lower_bound
    }
}
