//! Shared application state: configuration, providers and caches

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::cache::ProviderCache;
use crate::config::ApiConfig;
use crate::error::{Result, ServiceError};
use crate::providers::{
    AccountsProvider, CardProvider, InMemoryCardProvider, InMemoryCheckoutProvider,
    PaymentProvider, ProfileProvider, RateProvider, RestCheckoutProvider, RestProvider,
    StaticRateProvider,
};

/// Counts mutations that have been sent and not yet answered
#[derive(Debug, Default)]
pub struct MutationTracker {
    in_flight: AtomicUsize,
}

impl MutationTracker {
    pub fn begin(&self) -> PendingMutation<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        PendingMutation { counter: &self.in_flight }
    }

    pub fn is_pending(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }
}

/// Marks a mutation as in flight until dropped
pub struct PendingMutation<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for PendingMutation<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Explicit dependencies of every service
pub struct AppState {
    pub config: ApiConfig,
    pub cards: Arc<dyn CardProvider>,
    pub accounts: Arc<dyn AccountsProvider>,
    pub profile: Arc<dyn ProfileProvider>,
    pub payments: Arc<dyn PaymentProvider>,
    pub rates: Arc<dyn RateProvider>,
    pub cache: ProviderCache,
    pub mutations: MutationTracker,
}

impl AppState {
    /// Build providers from configuration
    pub fn from_config(config: ApiConfig) -> Result<Self> {
        let Some(url) = config.provider_url.clone() else {
            info!("no provider URL configured, using in-memory providers");
            return Ok(Self::in_memory(
                config,
                Arc::new(InMemoryCardProvider::demo()),
                Arc::new(InMemoryCheckoutProvider::new()),
            ));
        };

        info!(%url, backend = %config.backend, "connecting to card provider");
        let rest = Arc::new(RestProvider::new(
            &url,
            config.provider_api_key.clone(),
            config.backend,
            config.request_timeout,
        )?);

        let payments: Arc<dyn PaymentProvider> = match &config.checkout_url {
            Some(checkout_url) => {
                let api_key = config.checkout_api_key.clone().ok_or_else(|| {
                    ServiceError::Config("CARDFLOW_CHECKOUT_API_KEY is required with CARDFLOW_CHECKOUT_URL".to_string())
                })?;
                Arc::new(RestCheckoutProvider::new(checkout_url, api_key, config.request_timeout)?)
            }
            None if config.backend.requires_checkout() => {
                return Err(ServiceError::Config(format!(
                    "backend '{}' requires CARDFLOW_CHECKOUT_URL",
                    config.backend
                )));
            }
            None => Arc::new(InMemoryCheckoutProvider::new()),
        };

        Ok(Self::with_providers(
            config,
            rest.clone(),
            rest.clone(),
            rest,
            payments,
            Arc::new(StaticRateProvider::default()),
        ))
    }

    /// State backed by one in-memory provider for cards, accounts and profile
    pub fn in_memory(
        config: ApiConfig,
        provider: Arc<InMemoryCardProvider>,
        payments: Arc<dyn PaymentProvider>,
    ) -> Self {
        Self::with_providers(
            config,
            provider.clone(),
            provider.clone(),
            provider,
            payments,
            Arc::new(StaticRateProvider::default()),
        )
    }

    pub fn with_providers(
        config: ApiConfig,
        cards: Arc<dyn CardProvider>,
        accounts: Arc<dyn AccountsProvider>,
        profile: Arc<dyn ProfileProvider>,
        payments: Arc<dyn PaymentProvider>,
        rates: Arc<dyn RateProvider>,
    ) -> Self {
        let cache = ProviderCache::new(config.cache_ttl);
        Self {
            config,
            cards,
            accounts,
            profile,
            payments,
            rates,
            cache,
            mutations: MutationTracker::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_flag_follows_guards() {
        let tracker = MutationTracker::default();
        assert!(!tracker.is_pending());
        {
            let _first = tracker.begin();
            let _second = tracker.begin();
            assert!(tracker.is_pending());
        }
        assert!(!tracker.is_pending());
    }

    #[test]
    fn legacy_backend_without_checkout_is_rejected() {
        let config = ApiConfig {
            provider_url: Some("https://issuer.test".to_string()),
            backend: crate::providers::ProviderBackend::Legacy,
            ..ApiConfig::default()
        };
        assert!(matches!(AppState::from_config(config), Err(ServiceError::Config(_))));
    }
}
