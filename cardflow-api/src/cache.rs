//! Read-through cache for provider data
//!
//! The card list is a read replica of the issuer's data with no authority of
//! its own: entries expire after the configured TTL and every successful
//! mutation invalidates them.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache as MokaCache;
use tracing::debug;

use cardflow::{Account, Card};

use crate::providers::{Profile, ProviderError};

const CARDS_KEY: &str = "cards";
const PROFILE_KEY: &str = "profile";
const ACCOUNTS_KEY: &str = "accounts";

/// Cached provider reads keyed per session
pub struct ProviderCache {
    cards: MokaCache<&'static str, Arc<Vec<Card>>>,
    profile: MokaCache<&'static str, Profile>,
    accounts: MokaCache<&'static str, Arc<Vec<Account>>>,
}

impl ProviderCache {
    pub fn new(ttl: Duration) -> Self {
        debug!(?ttl, "initializing provider cache");
        Self {
            cards: MokaCache::builder().max_capacity(1).time_to_live(ttl).build(),
            profile: MokaCache::builder().max_capacity(1).time_to_live(ttl).build(),
            accounts: MokaCache::builder().max_capacity(1).time_to_live(ttl).build(),
        }
    }

    pub async fn cards<F, Fut>(&self, fetch: F) -> Result<Arc<Vec<Card>>, ProviderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Card>, ProviderError>>,
    {
        self.cards
            .try_get_with(CARDS_KEY, async move { fetch().await.map(Arc::new) })
            .await
            .map_err(|e| (*e).clone())
    }

    pub async fn profile<F, Fut>(&self, fetch: F) -> Result<Profile, ProviderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Profile, ProviderError>>,
    {
        self.profile
            .try_get_with(PROFILE_KEY, fetch())
            .await
            .map_err(|e| (*e).clone())
    }

    pub async fn accounts<F, Fut>(&self, fetch: F) -> Result<Arc<Vec<Account>>, ProviderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Account>, ProviderError>>,
    {
        self.accounts
            .try_get_with(ACCOUNTS_KEY, async move { fetch().await.map(Arc::new) })
            .await
            .map_err(|e| (*e).clone())
    }

    /// Drop the cached card list so the next read goes to the provider
    pub async fn invalidate_cards(&self) {
        debug!("invalidating cached cards");
        self.cards.invalidate(&CARDS_KEY).await;
    }

    pub fn invalidate_all(&self) {
        self.cards.invalidate_all();
        self.profile.invalidate_all();
        self.accounts.invalidate_all();
    }
}
