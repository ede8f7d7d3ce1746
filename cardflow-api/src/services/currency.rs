//! Currency context: base currency, amount formatting and live FX rates

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::{Decimal, RoundingStrategy};
use tracing::info;

use cardflow::Error;

use crate::error::Result;
use crate::providers::RateProvider;
use crate::services::polling::{spawn_poller, PollHandle, PollState};

pub type RateSnapshot = HashMap<String, Decimal>;

/// Digits after the decimal point for a currency
pub fn minor_units(currency: &str) -> u32 {
    match currency.to_ascii_uppercase().as_str() {
        "JPY" | "KRW" | "VND" => 0,
        "BHD" | "KWD" | "OMR" => 3,
        _ => 2,
    }
}

pub fn currency_symbol(currency: &str) -> Option<&'static str> {
    match currency.to_ascii_uppercase().as_str() {
        "USD" => Some("$"),
        "EUR" => Some("€"),
        "GBP" => Some("£"),
        "JPY" => Some("¥"),
        "INR" => Some("₹"),
        _ => None,
    }
}

/// Format `amount` with thousands separators and the currency's minor units
pub fn format_money(amount: Decimal, currency: &str, show_symbol: bool) -> String {
    let units = minor_units(currency);
    let rounded = amount.round_dp_with_strategy(units, RoundingStrategy::MidpointAwayFromZero);
    let digits = format!("{:.*}", units as usize, rounded.abs());
    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (digits.as_str(), None),
    };

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if let Some(fraction) = fraction {
        grouped.push('.');
        grouped.push_str(fraction);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    match (show_symbol, currency_symbol(currency)) {
        (false, _) => format!("{}{}", sign, grouped),
        (true, Some(symbol)) => format!("{}{}{}", sign, symbol, grouped),
        (true, None) => format!("{}{} {}", sign, currency.to_ascii_uppercase(), grouped),
    }
}

/// Explicit currency state handed to whatever renders amounts
pub struct CurrencyContext {
    base_currency: String,
    fallback: RateSnapshot,
    poller: Option<PollHandle<RateSnapshot>>,
}

impl CurrencyContext {
    pub fn new(base_currency: &str) -> Self {
        let base_currency = base_currency.trim().to_ascii_uppercase();
        let fallback = HashMap::from([(base_currency.clone(), Decimal::ONE)]);
        Self {
            base_currency,
            fallback,
            poller: None,
        }
    }

    /// Rates used until (or instead of) a live poll, as units per one base
    pub fn with_rates(mut self, rates: RateSnapshot) -> Self {
        self.fallback.extend(rates);
        self
    }

    pub fn base_currency(&self) -> &str {
        &self.base_currency
    }

    /// Refresh rates from `provider` every `interval` while this context lives
    pub fn start_polling(&mut self, provider: Arc<dyn RateProvider>, interval: Duration) {
        info!(base = %self.base_currency, ?interval, "starting FX rate polling");
        let base = self.base_currency.clone();
        self.poller = Some(spawn_poller("fx-rates", interval, move || {
            let provider = provider.clone();
            let base = base.clone();
            async move { provider.fetch_rates(&base).await }
        }));
    }

    pub fn stop_polling(&mut self) {
        self.poller = None;
    }

    /// Loading/error state of the live rates, if polling
    pub fn rate_state(&self) -> Option<PollState<RateSnapshot>> {
        self.poller.as_ref().map(PollHandle::latest)
    }

    /// Wait for the first poll to finish
    pub async fn rates_ready(&self) -> Option<PollState<RateSnapshot>> {
        match &self.poller {
            Some(poller) => Some(poller.first_result().await),
            None => None,
        }
    }

    /// Latest live rates, falling back to the static snapshot
    pub fn rates(&self) -> RateSnapshot {
        let live = self.rate_state().and_then(|state| state.value);
        let mut rates = self.fallback.clone();
        if let Some(live) = live {
            rates.extend(live);
        }
        rates
    }

    pub fn format_amount(&self, amount: Decimal, show_symbol: bool) -> String {
        format_money(amount, &self.base_currency, show_symbol)
    }

    /// Convert between any two currencies the rate snapshot knows
    pub fn convert(&self, amount: Decimal, from: &str, to: &str) -> Result<Decimal> {
        let from = from.trim().to_ascii_uppercase();
        let to = to.trim().to_ascii_uppercase();
        if from == to {
            return Ok(amount);
        }

        let rates = self.rates();
        let rate = |code: &str| {
            rates
                .get(code)
                .copied()
                .filter(|rate| rate.is_sign_positive() && !rate.is_zero())
                .ok_or_else(|| Error::UnsupportedCurrency(code.to_string()))
        };

        let in_base = amount
            .checked_div(rate(&from)?)
            .ok_or_else(|| Error::Conversion(format!("cannot convert {} {}", amount, from)))?;
        let converted = in_base
            .checked_mul(rate(&to)?)
            .ok_or_else(|| Error::Conversion(format!("cannot convert {} {} to {}", amount, from, to)))?;
        Ok(converted.round_dp_with_strategy(minor_units(&to), RoundingStrategy::MidpointAwayFromZero))
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
    fn formats_with_grouping_and_minor_units() {
        assert_eq!(format_money(dec("1234567.891"), "USD", true), "$1,234,567.89");
        assert_eq!(format_money(dec("999.995"), "EUR", true), "€1,000.00");
        assert_eq!(format_money(dec("150000.4"), "JPY", true), "¥150,000");
        assert_eq!(format_money(dec("-42.5"), "GBP", true), "-£42.50");
        assert_eq!(format_money(dec("100"), "CHF", true), "CHF 100.00");
        assert_eq!(format_money(dec("0"), "USD", false), "0.00");
        assert_eq!(format_money(dec("-0.001"), "USD", false), "0.00");
    }

    #[test]
    fn converts_through_base_rates() {
        let context = CurrencyContext::new("usd")
            .with_rates(HashMap::from([("EUR".to_string(), dec("0.92")), ("JPY".to_string(), dec("149.50"))]));

        assert_eq!(context.base_currency(), "USD");
        assert_eq!(context.convert(dec("100"), "USD", "EUR").unwrap(), dec("92.00"));
        assert_eq!(context.convert(dec("92"), "EUR", "JPY").unwrap(), dec("14950"));
        assert_eq!(
            context.convert(dec("1"), "USD", "XYZ").unwrap_err().to_string(),
            Error::UnsupportedCurrency("XYZ".to_string()).to_string()
        );
    }
}
