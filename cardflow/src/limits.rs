//! Percentage-of-principal calculators (credit lines, loans, staking)
//!
//! All arithmetic is decimal. The computed maximum keeps full precision;
//! rounding only happens in [`display_amount`].

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const ONE_HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Maximum amount available against `principal` at `rate_percent`
pub fn max_amount(principal: Decimal, rate_percent: Decimal) -> Result<Decimal> {
    if principal < Decimal::ZERO {
        return Err(Error::NegativeAmount(principal));
    }
    if rate_percent < Decimal::ZERO || rate_percent > ONE_HUNDRED {
        return Err(Error::InvalidRate(rate_percent));
    }

    principal
        .checked_mul(rate_percent)
        .map(|product| product / ONE_HUNDRED)
        .ok_or_else(|| Error::InvalidInput(format!("principal {} is too large", principal)))
}

/// Reject a requested amount above the computed maximum
pub fn check_requested_amount(
    requested: Decimal,
    principal: Decimal,
    rate_percent: Decimal,
) -> Result<Decimal> {
    if requested < Decimal::ZERO {
        return Err(Error::NegativeAmount(requested));
    }
    let maximum = max_amount(principal, rate_percent)?;
    if requested > maximum {
        return Err(Error::AmountExceedsMaximum { requested, maximum });
    }
    Ok(maximum)
}

/// Two-decimal display value, midpoints rounded away from zero
pub fn display_amount(amount: Decimal) -> String {
    format!(
        "{:.2}",
        amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    )
}

/// Collateral calculation shown next to an amount input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralQuote {
    pub principal: Decimal,
    pub rate_percent: Decimal,
    pub maximum: Decimal,
}

impl CollateralQuote {
    pub fn new(principal: Decimal, rate_percent: Decimal) -> Result<Self> {
        Ok(Self {
            principal,
            rate_percent,
            maximum: max_amount(principal, rate_percent)?,
        })
    }

    pub fn check(&self, requested: Decimal) -> Result<()> {
        check_requested_amount(requested, self.principal, self.rate_percent).map(|_| ())
    }

    pub fn display_maximum(&self) -> String {
        display_amount(self.maximum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn computes_ltv_maximum() {
        assert_eq!(max_amount(dec("10000"), dec("70")).unwrap(), dec("7000"));
        assert_eq!(max_amount(dec("0.10"), dec("33")).unwrap(), dec("0.033"));
    }

    #[test]
    fn display_rounds_half_away_from_zero() {
        assert_eq!(display_amount(dec("0.125")), "0.13");
        assert_eq!(display_amount(dec("7000")), "7000.00");
    }

    #[test]
    fn rejects_rate_out_of_range() {
        assert_eq!(max_amount(dec("100"), dec("100.01")), Err(Error::InvalidRate(dec("100.01"))));
        assert_eq!(max_amount(dec("100"), dec("-1")), Err(Error::InvalidRate(dec("-1"))));
    }
}
