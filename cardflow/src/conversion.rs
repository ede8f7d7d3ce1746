//! Crypto-to-fiat conversion quotes and the conversion step state machine

use std::collections::HashMap;
use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// USD prices for supported crypto assets and USD cross rates for fiat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    /// Asset symbol -> price in USD
    crypto_usd: HashMap<String, Decimal>,
    /// Fiat code -> units of that currency per USD
    fiat_per_usd: HashMap<String, Decimal>,
}

impl Default for RateTable {
    fn default() -> Self {
        let crypto_usd = [
            ("BTC", Decimal::new(4_325_000, 2)),
            ("ETH", Decimal::new(258_000, 2)),
            ("SOL", Decimal::new(9_850, 2)),
            ("USDT", Decimal::ONE),
            ("USDC", Decimal::ONE),
        ];
        let fiat_per_usd = [
            ("USD", Decimal::ONE),
            ("EUR", Decimal::new(92, 2)),
            ("GBP", Decimal::new(79, 2)),
        ];

        Self {
            crypto_usd: crypto_usd
                .into_iter()
                .map(|(symbol, price)| (symbol.to_string(), price))
                .collect(),
            fiat_per_usd: fiat_per_usd
                .into_iter()
                .map(|(code, rate)| (code.to_string(), rate))
                .collect(),
        }
    }
}

impl RateTable {
    pub fn empty() -> Self {
        Self {
            crypto_usd: HashMap::new(),
            fiat_per_usd: HashMap::new(),
        }
    }

    pub fn set_crypto_price(&mut self, symbol: &str, price_usd: Decimal) {
        self.crypto_usd.insert(symbol.to_ascii_uppercase(), price_usd);
    }

    pub fn set_fiat_rate(&mut self, code: &str, per_usd: Decimal) {
        self.fiat_per_usd.insert(code.to_ascii_uppercase(), per_usd);
    }

    pub fn crypto_price(&self, symbol: &str) -> Option<Decimal> {
        self.crypto_usd.get(&symbol.to_ascii_uppercase()).copied()
    }

    pub fn fiat_rate(&self, code: &str) -> Option<Decimal> {
        self.fiat_per_usd.get(&code.to_ascii_uppercase()).copied()
    }

    pub fn supported_assets(&self) -> Vec<&str> {
        let mut assets: Vec<&str> = self.crypto_usd.keys().map(String::as_str).collect();
        assets.sort_unstable();
        assets
    }

    /// Quote `amount` of `asset` in `fiat`, rounded to cents
    pub fn quote(&self, asset: &str, amount: Decimal, fiat: &str) -> Result<ConversionQuote> {
        if amount <= Decimal::ZERO {
            return Err(Error::Conversion(format!("amount must be positive, got {}", amount)));
        }
        let price = self
            .crypto_price(asset)
            .ok_or_else(|| Error::UnsupportedCurrency(asset.to_string()))?;
        let fiat_rate = self
            .fiat_rate(fiat)
            .ok_or_else(|| Error::UnsupportedCurrency(fiat.to_string()))?;

        let rate = price * fiat_rate;
        let fiat_amount = amount
            .checked_mul(rate)
            .ok_or_else(|| Error::Conversion(format!("amount {} is too large", amount)))?
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

        Ok(ConversionQuote {
            asset: asset.to_ascii_uppercase(),
            amount,
            fiat: fiat.to_ascii_uppercase(),
            rate,
            fiat_amount,
        })
    }
}

/// Priced conversion request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionQuote {
    pub asset: String,
    pub amount: Decimal,
    pub fiat: String,
    /// Fiat units per asset unit
    pub rate: Decimal,
    pub fiat_amount: Decimal,
}

/// Step of a running conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionStep {
    Pending,
    Validating,
    Converting,
    Settling,
    Completed,
    Failed(String),
    Cancelled,
}

impl ConversionStep {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConversionStep::Completed | ConversionStep::Failed(_) | ConversionStep::Cancelled
        )
    }

    /// Step reached when the current one completes
    fn successor(&self) -> Option<ConversionStep> {
        match self {
            ConversionStep::Pending => Some(ConversionStep::Validating),
            ConversionStep::Validating => Some(ConversionStep::Converting),
            ConversionStep::Converting => Some(ConversionStep::Settling),
            ConversionStep::Settling => Some(ConversionStep::Completed),
            _ => None,
        }
    }

    fn progress(&self) -> Option<u8> {
        match self {
            ConversionStep::Pending => Some(0),
            ConversionStep::Validating => Some(25),
            ConversionStep::Converting => Some(50),
            ConversionStep::Settling => Some(75),
            ConversionStep::Completed => Some(100),
            ConversionStep::Failed(_) | ConversionStep::Cancelled => None,
        }
    }
}

impl fmt::Display for ConversionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionStep::Pending => f.write_str("pending"),
            ConversionStep::Validating => f.write_str("validating"),
            ConversionStep::Converting => f.write_str("converting"),
            ConversionStep::Settling => f.write_str("settling"),
            ConversionStep::Completed => f.write_str("completed"),
            ConversionStep::Failed(reason) => write!(f, "failed: {}", reason),
            ConversionStep::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Completion signal that moves a conversion forward
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionEvent {
    StepCompleted,
    StepFailed(String),
    Cancel,
}

/// Conversion driven step by step by completion events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionFlow {
    quote: ConversionQuote,
    step: ConversionStep,
    progress: u8,
}

impl ConversionFlow {
    pub fn new(quote: ConversionQuote) -> Self {
        Self {
            quote,
            step: ConversionStep::Pending,
            progress: 0,
        }
    }

    pub fn quote(&self) -> &ConversionQuote {
        &self.quote
    }

    pub fn step(&self) -> &ConversionStep {
        &self.step
    }

    /// Progress of the last step reached; failures keep the value they stopped at
    pub fn progress_percent(&self) -> u8 {
        self.progress
    }

    pub fn is_finished(&self) -> bool {
        self.step.is_terminal()
    }

    /// Apply an event. Terminal flows reject every event.
    pub fn apply(&mut self, event: ConversionEvent) -> Result<&ConversionStep> {
        if self.step.is_terminal() {
            return Err(Error::Conversion(format!(
                "conversion already {}, cannot apply {:?}",
                self.step, event
            )));
        }

        let next = match event {
            ConversionEvent::StepCompleted => self
                .step
                .successor()
                .ok_or_else(|| Error::Conversion(format!("no step after {}", self.step)))?,
            ConversionEvent::StepFailed(reason) => ConversionStep::Failed(reason),
            ConversionEvent::Cancel => ConversionStep::Cancelled,
        };

        if let Some(progress) = next.progress() {
            self.progress = progress;
        }
        tracing::debug!(from = %self.step, to = %next, "conversion step");
        self.step = next;
        Ok(&self.step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_through_usd_cross_rate() {
        let quote = RateTable::default().quote("btc", Decimal::new(5, 1), "EUR").unwrap();
        // 0.5 * 43250 * 0.92
        assert_eq!(quote.fiat_amount, Decimal::new(1_989_500, 2));
        assert_eq!(quote.asset, "BTC");
    }

    #[test]
    fn unknown_asset_is_rejected() {
        let err = RateTable::default().quote("DOGE", Decimal::ONE, "USD").unwrap_err();
        assert_eq!(err, Error::UnsupportedCurrency("DOGE".to_string()));
    }
}
