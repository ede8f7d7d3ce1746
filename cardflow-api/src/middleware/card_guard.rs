//! Card guard for validating card operations before they reach the issuer

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

use cardflow::account::find_account;
use cardflow::card::IssueCardRequest;
use cardflow::limits::check_requested_amount;
use cardflow::{
    Account, Card, Error, MembershipTier, Result, ShippingAddress, SpendingLimits, ToggleAction,
};

/// Local validation for card operations. A failing check means no request
/// is sent to the card provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct CardGuard;

impl CardGuard {
    pub fn new() -> Self {
        Self
    }

    /// Holder name and limits, checked before any data is fetched
    pub fn validate_request(&self, request: &IssueCardRequest) -> Result<()> {
        if request.holder_name().is_empty() {
            return Err(Error::MissingHolderName);
        }
        request.limits().validate()?;
        if request.currency.trim().is_empty() {
            return Err(Error::InvalidInput("currency is required".to_string()));
        }
        Ok(())
    }

    /// Validate card issuance eligibility
    pub fn validate_card_issuance(
        &self,
        request: &IssueCardRequest,
        tier: MembershipTier,
        existing_cards: usize,
        accounts: &[Account],
    ) -> Result<()> {
        self.validate_request(request)?;
        tier.check_quota(existing_cards)?;

        if let Some(account_id) = request.linked_account_id {
            if find_account(accounts, account_id).is_none() {
                return Err(Error::AccountNotFound(account_id));
            }
        }

        debug!(%tier, existing_cards, max = tier.max_cards(), "card issuance allowed");
        Ok(())
    }

    /// Find the card a request refers to
    pub fn validate_card_exists<'a>(&self, cards: &'a [Card], card_id: Uuid) -> Result<&'a Card> {
        cards
            .iter()
            .find(|card| card.id == card_id)
            .ok_or(Error::CardNotFound(card_id))
    }

    /// Toggle action for the card's current status, rejecting moves the
    /// status rules forbid. A card past its expiry date counts as expired
    /// and cannot be unblocked.
    pub fn validate_toggle(&self, card: &Card) -> Result<ToggleAction> {
        let status = card.effective_status(Utc::now());
        let action = ToggleAction::for_status(status);
        status.transition_to(action.target_status())?;
        Ok(action)
    }

    pub fn validate_shipping_address(&self, address: &ShippingAddress) -> Result<()> {
        address.validate()
    }

    pub fn validate_spending_limits(&self, limits: &SpendingLimits) -> Result<()> {
        limits.validate()
    }

    /// Requested amount against `principal * rate / 100`
    pub fn validate_requested_amount(
        &self,
        requested: Decimal,
        principal: Decimal,
        rate_percent: Decimal,
    ) -> Result<Decimal> {
        check_requested_amount(requested, principal, rate_percent)
    }
}
