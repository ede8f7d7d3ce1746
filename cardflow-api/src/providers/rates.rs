//! Static FX rate provider

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::{ProviderError, RateProvider};

/// Rates expressed per one USD
pub struct StaticRateProvider {
    per_usd: HashMap<String, Decimal>,
}

impl StaticRateProvider {
    pub fn new(per_usd: HashMap<String, Decimal>) -> Self {
        Self { per_usd }
    }
}

impl Default for StaticRateProvider {
    fn default() -> Self {
        let per_usd = [
            ("USD", Decimal::ONE),
            ("EUR", Decimal::new(92, 2)),
            ("GBP", Decimal::new(79, 2)),
            ("JPY", Decimal::new(14_950, 2)),
            ("INR", Decimal::new(8_310, 2)),
        ];
        Self::new(
            per_usd
                .into_iter()
                .map(|(code, rate)| (code.to_string(), rate))
                .collect(),
        )
    }
}

#[async_trait]
impl RateProvider for StaticRateProvider {
    async fn fetch_rates(&self, base: &str) -> Result<HashMap<String, Decimal>, ProviderError> {
        let base = base.to_ascii_uppercase();
        let base_per_usd = self
            .per_usd
            .get(&base)
            .copied()
            .filter(|rate| !rate.is_zero())
            .ok_or_else(|| ProviderError::NotFound(format!("No rate for {}", base)))?;

        Ok(self
            .per_usd
            .iter()
            .map(|(code, per_usd)| (code.clone(), *per_usd / base_per_usd))
            .collect())
    }
}
