//! Service configuration read from `CARDFLOW_*` environment variables

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::error::ServiceError;
use crate::providers::ProviderBackend;

/// Card service configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Card provider base URL; in-memory providers are used when unset
    pub provider_url: Option<String>,
    pub provider_api_key: Option<String>,
    pub backend: ProviderBackend,
    /// Checkout provider base URL for paid physical card orders
    pub checkout_url: Option<String>,
    pub checkout_api_key: Option<String>,
    pub checkout_success_url: String,
    pub checkout_cancel_url: String,
    pub webhook_secret: String,
    pub physical_card_fee: Decimal,
    pub base_currency: String,
    pub request_timeout: Duration,
    pub cache_ttl: Duration,
    pub rate_poll_interval: Duration,
    pub health_poll_interval: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            provider_url: None,
            provider_api_key: None,
            backend: ProviderBackend::default(),
            checkout_url: None,
            checkout_api_key: None,
            checkout_success_url: "https://app.cardflow.dev/cards?order=success".to_string(),
            checkout_cancel_url: "https://app.cardflow.dev/cards?order=cancelled".to_string(),
            webhook_secret: "whsec_development".to_string(),
            physical_card_fee: Decimal::new(999, 2),
            base_currency: "USD".to_string(),
            request_timeout: Duration::from_secs(30),
            cache_ttl: Duration::from_secs(60),
            rate_poll_interval: Duration::from_secs(60),
            health_poll_interval: Duration::from_secs(30),
        }
    }
}

impl ApiConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ServiceError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServiceError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Self {
            provider_url: get("CARDFLOW_PROVIDER_URL"),
            provider_api_key: get("CARDFLOW_PROVIDER_API_KEY"),
            backend: match get("CARDFLOW_BACKEND") {
                Some(value) => ProviderBackend::from_str(&value).map_err(ServiceError::Config)?,
                None => defaults.backend,
            },
            checkout_url: get("CARDFLOW_CHECKOUT_URL"),
            checkout_api_key: get("CARDFLOW_CHECKOUT_API_KEY"),
            checkout_success_url: get("CARDFLOW_CHECKOUT_SUCCESS_URL")
                .unwrap_or(defaults.checkout_success_url),
            checkout_cancel_url: get("CARDFLOW_CHECKOUT_CANCEL_URL")
                .unwrap_or(defaults.checkout_cancel_url),
            webhook_secret: get("CARDFLOW_WEBHOOK_SECRET").unwrap_or(defaults.webhook_secret),
            physical_card_fee: parse_or(
                get("CARDFLOW_PHYSICAL_CARD_FEE"),
                "CARDFLOW_PHYSICAL_CARD_FEE",
                defaults.physical_card_fee,
            )?,
            base_currency: get("CARDFLOW_BASE_CURRENCY")
                .map(|c| c.to_ascii_uppercase())
                .unwrap_or(defaults.base_currency),
            request_timeout: seconds_or(get("CARDFLOW_REQUEST_TIMEOUT_SECS"), "CARDFLOW_REQUEST_TIMEOUT_SECS", defaults.request_timeout)?,
            cache_ttl: seconds_or(get("CARDFLOW_CACHE_TTL_SECS"), "CARDFLOW_CACHE_TTL_SECS", defaults.cache_ttl)?,
            rate_poll_interval: seconds_or(get("CARDFLOW_RATE_POLL_SECS"), "CARDFLOW_RATE_POLL_SECS", defaults.rate_poll_interval)?,
            health_poll_interval: seconds_or(get("CARDFLOW_HEALTH_POLL_SECS"), "CARDFLOW_HEALTH_POLL_SECS", defaults.health_poll_interval)?,
        })
    }

    pub fn uses_in_memory_provider(&self) -> bool {
        self.provider_url.is_none()
    }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T, ServiceError> {
    match value {
        Some(raw) => raw
            .parse()
            .map_err(|_| ServiceError::Config(format!("{} has invalid value '{}'", key, raw))),
        None => Ok(default),
    }
}

fn seconds_or(value: Option<String>, key: &str, default: Duration) -> Result<Duration, ServiceError> {
    let secs: u64 = parse_or(value, key, default.as_secs())?;
    if secs == 0 {
        return Err(ServiceError::Config(format!("{} must be greater than zero", key)));
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_select_in_memory_provider() {
        let config = ApiConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.uses_in_memory_provider());
        assert_eq!(config.backend, ProviderBackend::Nium);
        assert_eq!(config.base_currency, "USD");
    }

    #[test]
    fn reads_overrides() {
        let config = ApiConfig::from_lookup(lookup(&[
            ("CARDFLOW_PROVIDER_URL", "https://issuer.test"),
            ("CARDFLOW_BACKEND", "Legacy"),
            ("CARDFLOW_PHYSICAL_CARD_FEE", "14.50"),
            ("CARDFLOW_CACHE_TTL_SECS", "5"),
            ("CARDFLOW_BASE_CURRENCY", "eur"),
        ]))
        .unwrap();
        assert_eq!(config.provider_url.as_deref(), Some("https://issuer.test"));
        assert_eq!(config.backend, ProviderBackend::Legacy);
        assert_eq!(config.physical_card_fee, Decimal::new(1450, 2));
        assert_eq!(config.cache_ttl, Duration::from_secs(5));
        assert_eq!(config.base_currency, "EUR");
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(ApiConfig::from_lookup(lookup(&[("CARDFLOW_BACKEND", "stripe")])).is_err());
        assert!(ApiConfig::from_lookup(lookup(&[("CARDFLOW_RATE_POLL_SECS", "0")])).is_err());
        assert!(ApiConfig::from_lookup(lookup(&[("CARDFLOW_PHYSICAL_CARD_FEE", "ten")])).is_err());
    }
}
