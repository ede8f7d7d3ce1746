//! Card service: issuance, block/unblock, controls, limits and listing

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use cardflow::card::IssueCardRequest;
use cardflow::{Account, Card, CardControls, CardFilter, CardStats, SpendingLimits};

use crate::error::{Result, ServiceError};
use crate::middleware::CardGuard;
use crate::providers::{HealthReport, ProviderError};
use crate::state::AppState;

/// Card operations against the configured provider
pub struct CardService {
    state: Arc<AppState>,
    guard: CardGuard,
    /// Held from the quota check until the provider answers
    issuance: AsyncMutex<()>,
    toggle_locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl CardService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            guard: CardGuard::new(),
            issuance: AsyncMutex::new(()),
            toggle_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Whether any mutation is waiting on the provider
    pub fn is_pending(&self) -> bool {
        self.state.mutations.is_pending()
    }

    /// All cards, served from the cache while it is fresh
    pub async fn list_cards(&self) -> Result<Arc<Vec<Card>>> {
        let provider = self.state.cards.clone();
        self.state
            .cache
            .cards(|| async move { provider.list_cards().await })
            .await
            .map_err(|e| remote("list cards", e))
    }

    pub async fn filtered_cards(&self, filter: &CardFilter) -> Result<Vec<Card>> {
        let cards = self.list_cards().await?;
        Ok(filter.apply(&cards))
    }

    /// Aggregates over the full, unfiltered card list
    pub async fn stats(&self) -> Result<CardStats> {
        let cards = self.list_cards().await?;
        Ok(CardStats::from_cards(&cards))
    }

    #[instrument(skip(self, request), fields(card_type = %request.card_type))]
    pub async fn issue_card(&self, request: IssueCardRequest) -> Result<Card> {
        // Form-level checks need no provider data
        self.guard.validate_request(&request)?;

        // Concurrent issues each count the cards the previous one left
        let _issuing = self.issuance.lock().await;
        let tier = self.membership_tier().await?;
        self.state.cache.invalidate_cards().await;
        let existing = self.list_cards().await?;
        let accounts = match request.linked_account_id {
            Some(_) => self.accounts().await?,
            None => Arc::new(Vec::new()),
        };
        self.guard
            .validate_card_issuance(&request, tier, existing.len(), &accounts)?;

        let _pending = self.state.mutations.begin();
        let card = self
            .state
            .cards
            .issue_card(&request)
            .await
            .map_err(|e| remote("issue card", e))?;
        self.state.cache.invalidate_cards().await;

        info!(card_id = %card.id, %tier, "card issued");
        Ok(card)
    }

    /// Block an active card or unblock any other card. Toggles of one card
    /// run one at a time, each deciding from the status the previous left.
    #[instrument(skip(self))]
    pub async fn toggle_card(&self, card_id: Uuid) -> Result<Card> {
        let lock = self.toggle_lock(card_id)?;
        let result = {
            let _serialized = lock.lock().await;
            self.toggle_locked(card_id).await
        };
        drop(lock);
        self.release_toggle_lock(card_id);
        result
    }

    async fn toggle_locked(&self, card_id: Uuid) -> Result<Card> {
        self.state.cache.invalidate_cards().await;
        let cards = self.list_cards().await?;
        let card = self.guard.validate_card_exists(&cards, card_id)?;
        let action = self.guard.validate_toggle(card)?;

        let _pending = self.state.mutations.begin();
        let updated = self
            .state
            .cards
            .toggle_card(card_id, action, action.default_reason())
            .await
            .map_err(|e| remote("toggle card", e))?;
        self.state.cache.invalidate_cards().await;

        info!(%card_id, %action, status = %updated.status, "card toggled");
        Ok(updated)
    }

    #[instrument(skip(self, controls))]
    pub async fn update_card_controls(&self, card_id: Uuid, controls: CardControls) -> Result<Card> {
        let cards = self.list_cards().await?;
        self.guard.validate_card_exists(&cards, card_id)?;

        let _pending = self.state.mutations.begin();
        let card = self
            .state
            .cards
            .update_card_controls(card_id, controls)
            .await
            .map_err(|e| remote("update card controls", e))?;
        self.state.cache.invalidate_cards().await;
        Ok(card)
    }

    #[instrument(skip(self, limits))]
    pub async fn update_spending_limits(&self, card_id: Uuid, limits: SpendingLimits) -> Result<Card> {
        self.guard.validate_spending_limits(&limits)?;
        let cards = self.list_cards().await?;
        self.guard.validate_card_exists(&cards, card_id)?;

        let _pending = self.state.mutations.begin();
        let card = self
            .state
            .cards
            .update_spending_limits(card_id, limits)
            .await
            .map_err(|e| remote("update spending limits", e))?;
        self.state.cache.invalidate_cards().await;

        info!(%card_id, spending_limit = %card.spending_limit, daily_limit = %card.daily_limit, "spending limits updated");
        Ok(card)
    }

    pub async fn health_check(&self) -> Result<HealthReport> {
        self.state
            .cards
            .health_check()
            .await
            .map_err(|e| remote("health check", e))
    }

    async fn membership_tier(&self) -> Result<cardflow::MembershipTier> {
        let provider = self.state.profile.clone();
        let profile = self
            .state
            .cache
            .profile(|| async move { provider.get_profile().await })
            .await
            .map_err(|e| remote("get profile", e))?;
        Ok(profile.membership_tier)
    }

    async fn accounts(&self) -> Result<Arc<Vec<Account>>> {
        let provider = self.state.accounts.clone();
        self.state
            .cache
            .accounts(|| async move { provider.list_accounts().await })
            .await
            .map_err(|e| remote("list accounts", e))
    }

    fn toggle_lock(&self, card_id: Uuid) -> Result<Arc<AsyncMutex<()>>> {
        let mut locks = self
            .toggle_locks
            .lock()
            .map_err(|_| ServiceError::Internal("toggle lock table poisoned".to_string()))?;
        Ok(locks.entry(card_id).or_default().clone())
    }

    /// Forget a card's lock once no toggle holds or waits on it
    fn release_toggle_lock(&self, card_id: Uuid) {
        if let Ok(mut locks) = self.toggle_locks.lock() {
            if locks.get(&card_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                locks.remove(&card_id);
            }
        }
    }

    #[cfg(test)]
    fn tracked_toggle_locks(&self) -> usize {
        self.toggle_locks.lock().map(|locks| locks.len()).unwrap_or_default()
    }
}

pub(crate) fn remote(operation: &str, error: ProviderError) -> ServiceError {
    warn!(operation, %error, "card provider call failed");
    ServiceError::Provider(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::providers::{InMemoryCardProvider, InMemoryCheckoutProvider};
    use cardflow::{CardStatus, CardSubType, CardType, MembershipTier};
    use rust_decimal::Decimal;

    fn request() -> IssueCardRequest {
        IssueCardRequest {
            card_type: CardType::Virtual,
            card_sub_type: CardSubType::Debit,
            card_holder_name: "Sam Lee".to_string(),
            spending_limit: Decimal::from(2000),
            daily_limit: Decimal::from(300),
            currency: "USD".to_string(),
            linked_account_id: None,
        }
    }

    fn service(provider: Arc<InMemoryCardProvider>) -> CardService {
        let state = AppState::in_memory(
            ApiConfig::default(),
            provider,
            Arc::new(InMemoryCheckoutProvider::new()),
        );
        CardService::new(Arc::new(state))
    }

    #[tokio::test]
    async fn issuing_refreshes_cached_list() {
        let provider = Arc::new(InMemoryCardProvider::new().with_tier(MembershipTier::Silver));
        let service = service(provider.clone());

        assert!(service.list_cards().await.unwrap().is_empty());
        let card = service.issue_card(request()).await.unwrap();
        assert_eq!(card.status, CardStatus::Issued);

        let cards = service.list_cards().await.unwrap();
        assert_eq!(cards.len(), 1);
        // Issuance always counts against a fresh list
        assert_eq!(provider.calls().list_cards, 3);
        assert!(!service.is_pending());
    }

    #[tokio::test]
    async fn toggle_locks_are_released_after_use() {
        let mut card = cardflow::Card::issued(
            &request(),
            "4000111122223333",
            chrono::Utc::now() + chrono::Duration::days(365),
        );
        card.status = CardStatus::Active;
        let id = card.id;
        let provider = Arc::new(InMemoryCardProvider::new().with_cards(vec![card]));
        let service = service(provider.clone());

        let (first, second) = futures::join!(service.toggle_card(id), service.toggle_card(id));
        first.unwrap();
        second.unwrap();
        assert!(service.toggle_card(Uuid::new_v4()).await.is_err());

        assert_eq!(service.tracked_toggle_locks(), 0);
        assert_eq!(provider.calls().toggle_card, 2);
    }

    #[tokio::test]
    async fn invalid_limits_never_reach_provider() {
        let provider = Arc::new(InMemoryCardProvider::new());
        let service = service(provider.clone());

        let mut bad = request();
        bad.daily_limit = Decimal::from(5000);
        let err = service.issue_card(bad).await.unwrap_err();
        assert!(err.is_local());
        assert_eq!(provider.calls(), Default::default());
    }

    #[tokio::test]
    async fn unknown_card_is_rejected_locally() {
        let provider = Arc::new(InMemoryCardProvider::new());
        let service = service(provider.clone());

        let err = service.toggle_card(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(cardflow::Error::CardNotFound(_))));
        assert_eq!(provider.calls().mutations(), 0);
    }
}
