//! In-memory card issuer, accounts and profile provider
//!
//! Used by the CLI when no provider URL is configured and by tests, which
//! read the per-method call counters to assert that rejected requests never
//! reached the issuer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::{thread_rng, Rng};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use cardflow::card::IssueCardRequest;
use cardflow::{
    Account, Card, CardControls, CardStatus, CardSubType, CardType, MembershipTier,
    PhysicalCardStatus, SpendingLimits, ToggleAction,
};

use super::{
    AccountsProvider, CardProvider, HealthReport, PhysicalCardOrder, Profile, ProfileProvider,
    ProviderError,
};

/// Snapshot of how often each provider method was called
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub list_cards: usize,
    pub issue_card: usize,
    pub toggle_card: usize,
    pub order_physical_card: usize,
    pub update_card_controls: usize,
    pub update_spending_limits: usize,
    pub health_check: usize,
    pub list_accounts: usize,
    pub get_profile: usize,
}

impl CallCounts {
    /// Calls that change provider state
    pub fn mutations(&self) -> usize {
        self.issue_card
            + self.toggle_card
            + self.order_physical_card
            + self.update_card_controls
            + self.update_spending_limits
    }
}

#[derive(Default)]
struct Counters {
    list_cards: AtomicUsize,
    issue_card: AtomicUsize,
    toggle_card: AtomicUsize,
    order_physical_card: AtomicUsize,
    update_card_controls: AtomicUsize,
    update_spending_limits: AtomicUsize,
    health_check: AtomicUsize,
    list_accounts: AtomicUsize,
    get_profile: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

/// In-memory provider implementation
pub struct InMemoryCardProvider {
    cards: RwLock<Vec<Card>>,
    accounts: RwLock<Vec<Account>>,
    profile: RwLock<Profile>,
    counters: Counters,
    next_failure: Mutex<Option<ProviderError>>,
    latency: Duration,
}

impl InMemoryCardProvider {
    pub fn new() -> Self {
        Self {
            cards: RwLock::new(Vec::new()),
            accounts: RwLock::new(Vec::new()),
            profile: RwLock::new(Profile::default()),
            counters: Counters::default(),
            next_failure: Mutex::new(None),
            latency: Duration::ZERO,
        }
    }

    pub fn with_cards(self, cards: Vec<Card>) -> Self {
        Self {
            cards: RwLock::new(cards),
            ..self
        }
    }

    pub fn with_accounts(self, accounts: Vec<Account>) -> Self {
        Self {
            accounts: RwLock::new(accounts),
            ..self
        }
    }

    pub fn with_tier(self, tier: MembershipTier) -> Self {
        Self {
            profile: RwLock::new(Profile { membership_tier: tier }),
            ..self
        }
    }

    /// Delay every call, widening the window for concurrent requests
    pub fn with_latency(self, latency: Duration) -> Self {
        Self { latency, ..self }
    }

    /// Provider pre-populated with a small demo portfolio
    pub fn demo() -> Self {
        let checking = Account {
            id: Uuid::new_v4(),
            account_type: "checking".to_string(),
            currency: "USD".to_string(),
            balance: Decimal::new(1_250_000, 2),
        };

        let mut everyday = new_card(&IssueCardRequest {
            card_type: CardType::Virtual,
            card_sub_type: CardSubType::Debit,
            card_holder_name: "Alex Morgan".to_string(),
            spending_limit: Decimal::from(5000),
            daily_limit: Decimal::from(1000),
            currency: "USD".to_string(),
            linked_account_id: Some(checking.id),
        });
        everyday.status = CardStatus::Active;
        everyday.balance = Decimal::new(245_000, 2);

        let mut travel = new_card(&IssueCardRequest {
            card_type: CardType::Physical,
            card_sub_type: CardSubType::Prepaid,
            card_holder_name: "Alex Morgan".to_string(),
            spending_limit: Decimal::from(3000),
            daily_limit: Decimal::from(500),
            currency: "EUR".to_string(),
            linked_account_id: None,
        });
        travel.status = CardStatus::Blocked;
        travel.balance = Decimal::new(32_050, 2);
        travel.physical_card_status = Some(PhysicalCardStatus::Delivered);

        Self::new()
            .with_cards(vec![everyday, travel])
            .with_accounts(vec![checking])
    }

    pub async fn set_tier(&self, tier: MembershipTier) {
        self.profile.write().await.membership_tier = tier;
    }

    /// Current cards without counting a provider call
    pub async fn snapshot(&self) -> Vec<Card> {
        self.cards.read().await.clone()
    }

    pub fn calls(&self) -> CallCounts {
        let c = &self.counters;
        CallCounts {
            list_cards: c.list_cards.load(Ordering::SeqCst),
            issue_card: c.issue_card.load(Ordering::SeqCst),
            toggle_card: c.toggle_card.load(Ordering::SeqCst),
            order_physical_card: c.order_physical_card.load(Ordering::SeqCst),
            update_card_controls: c.update_card_controls.load(Ordering::SeqCst),
            update_spending_limits: c.update_spending_limits.load(Ordering::SeqCst),
            health_check: c.health_check.load(Ordering::SeqCst),
            list_accounts: c.list_accounts.load(Ordering::SeqCst),
            get_profile: c.get_profile.load(Ordering::SeqCst),
        }
    }

    /// Make the next provider call fail with `error`
    pub fn fail_next(&self, error: ProviderError) {
        if let Ok(mut next) = self.next_failure.lock() {
            *next = Some(error);
        }
    }

    async fn enter(&self, counter: &AtomicUsize) -> Result<(), ProviderError> {
        bump(counter);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let failure = self.next_failure.lock().ok().and_then(|mut next| next.take());
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn modify_card<F>(&self, card_id: Uuid, apply: F) -> Result<Card, ProviderError>
    where
        F: FnOnce(&mut Card) -> Result<(), ProviderError>,
    {
        let mut cards = self.cards.write().await;
        let card = cards
            .iter_mut()
            .find(|card| card.id == card_id)
            .ok_or_else(|| ProviderError::NotFound(format!("Card {} not found", card_id)))?;
        apply(card)?;
        card.updated_at = Utc::now();
        Ok(card.clone())
    }
}

impl Default for InMemoryCardProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a 16 digit test card number on the 4000 BIN
fn generate_card_number() -> String {
    let mut rng = thread_rng();
    let mut card_number = String::from("4000");
    for _ in 0..12 {
        card_number.push_str(&rng.gen_range(0..10).to_string());
    }
    card_number
}

fn generate_tracking_number() -> String {
    let mut rng = thread_rng();
    format!("TRK{:010}", rng.gen_range(0..10_000_000_000u64))
}

fn new_card(request: &IssueCardRequest) -> Card {
    // Cards are valid for three years
    let expires_at = Utc::now() + chrono::Duration::days(3 * 365);
    let mut card = Card::issued(request, &generate_card_number(), expires_at);
    if card.card_type == CardType::Physical {
        card.activation_url = Some(format!("https://cards.cardflow.dev/activate/{}", card.id));
    }
    card
}

fn rejected(status: u16, message: impl Into<String>) -> ProviderError {
    ProviderError::Rejected { status, message: message.into() }
}

#[async_trait]
impl CardProvider for InMemoryCardProvider {
    async fn list_cards(&self) -> Result<Vec<Card>, ProviderError> {
        self.enter(&self.counters.list_cards).await?;
        Ok(self.cards.read().await.clone())
    }

    async fn issue_card(&self, request: &IssueCardRequest) -> Result<Card, ProviderError> {
        self.enter(&self.counters.issue_card).await?;
        let card = new_card(request);
        debug!(card_id = %card.id, card_type = %card.card_type, "issued in-memory card");
        self.cards.write().await.push(card.clone());
        Ok(card)
    }

    async fn toggle_card(
        &self,
        card_id: Uuid,
        action: ToggleAction,
        reason: Option<&str>,
    ) -> Result<Card, ProviderError> {
        self.enter(&self.counters.toggle_card).await?;
        debug!(%card_id, %action, ?reason, "toggling in-memory card");
        self.modify_card(card_id, |card| {
            card.status = card
                .status
                .transition_to(action.target_status())
                .map_err(|e| rejected(409, e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn order_physical_card(&self, order: &PhysicalCardOrder) -> Result<Card, ProviderError> {
        self.enter(&self.counters.order_physical_card).await?;
        self.modify_card(order.card_id, |card| {
            if matches!(
                card.physical_card_status,
                Some(PhysicalCardStatus::Ordered | PhysicalCardStatus::Shipped | PhysicalCardStatus::Delivered)
            ) {
                return Err(rejected(409, "Physical card already ordered"));
            }
            card.physical_card_status = Some(PhysicalCardStatus::Ordered);
            card.tracking_number = Some(generate_tracking_number());
            Ok(())
        })
        .await
    }

    async fn update_card_controls(
        &self,
        card_id: Uuid,
        controls: CardControls,
    ) -> Result<Card, ProviderError> {
        self.enter(&self.counters.update_card_controls).await?;
        self.modify_card(card_id, |card| {
            card.controls = controls;
            Ok(())
        })
        .await
    }

    async fn update_spending_limits(
        &self,
        card_id: Uuid,
        limits: SpendingLimits,
    ) -> Result<Card, ProviderError> {
        self.enter(&self.counters.update_spending_limits).await?;
        self.modify_card(card_id, |card| {
            card.update_limits(limits).map_err(|e| rejected(422, e.to_string()))
        })
        .await
    }

    async fn health_check(&self) -> Result<HealthReport, ProviderError> {
        self.enter(&self.counters.health_check).await?;
        Ok(HealthReport {
            ok: true,
            project_id: Some("in-memory".to_string()),
            message: format!("{} cards in memory", self.cards.read().await.len()),
        })
    }
}

#[async_trait]
impl AccountsProvider for InMemoryCardProvider {
    async fn list_accounts(&self) -> Result<Vec<Account>, ProviderError> {
        self.enter(&self.counters.list_accounts).await?;
        Ok(self.accounts.read().await.clone())
    }
}

#[async_trait]
impl ProfileProvider for InMemoryCardProvider {
    async fn get_profile(&self) -> Result<Profile, ProviderError> {
        self.enter(&self.counters.get_profile).await?;
        Ok(*self.profile.read().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_numbers_use_test_bin() {
        let number = generate_card_number();
        assert_eq!(number.len(), 16);
        assert!(number.starts_with("4000"));
        assert!(number.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn provider_rejects_invalid_transition() {
        let provider = InMemoryCardProvider::demo();
        let blocked = provider
            .snapshot()
            .await
            .into_iter()
            .find(|card| card.status == CardStatus::Blocked)
            .unwrap();

        let err = provider
            .toggle_card(blocked.id, ToggleAction::Block, Some(ToggleAction::USER_REQUESTED))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Rejected { status: 409, .. }));
        assert_eq!(provider.calls().toggle_card, 1);
    }

    #[tokio::test]
    async fn injected_failure_applies_once() {
        let provider = InMemoryCardProvider::new();
        provider.fail_next(ProviderError::Unavailable);
        assert_eq!(provider.list_cards().await, Err(ProviderError::Unavailable));
        assert!(provider.list_cards().await.unwrap().is_empty());
    }
}
