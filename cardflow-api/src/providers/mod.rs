//! External collaborators: card issuer, accounts, profile, payments and FX rates

pub mod memory;
pub mod rest;
pub mod checkout;
pub mod rates;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cardflow::card::IssueCardRequest;
use cardflow::{Account, Card, CardControls, MembershipTier, ShippingAddress, SpendingLimits, ToggleAction};

pub use checkout::{InMemoryCheckoutProvider, RestCheckoutProvider};
pub use memory::{CallCounts, InMemoryCardProvider};
pub use rates::StaticRateProvider;
pub use rest::RestProvider;

/// Provider error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Provider unavailable")]
    Unavailable,
}

impl ProviderError {
    /// Message the provider itself supplied, if any
    pub fn provider_message(&self) -> Option<&str> {
        match self {
            ProviderError::Rejected { message, .. } if !message.trim().is_empty() => Some(message),
            ProviderError::NotFound(message) if !message.trim().is_empty() => Some(message),
            _ => None,
        }
    }
}

/// Card-issuing backend a provider talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderBackend {
    /// Physical cards are paid for through a checkout session first
    Legacy,
    /// Physical cards are ordered directly from the issuer
    Nium,
}

impl Default for ProviderBackend {
    fn default() -> Self {
        ProviderBackend::Nium
    }
}

impl ProviderBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderBackend::Legacy => "legacy",
            ProviderBackend::Nium => "nium",
        }
    }

    pub fn requires_checkout(&self) -> bool {
        matches!(self, ProviderBackend::Legacy)
    }
}

impl fmt::Display for ProviderBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(ProviderBackend::Legacy),
            "nium" => Ok(ProviderBackend::Nium),
            other => Err(format!("unknown provider backend '{}'", other)),
        }
    }
}

/// Physical card order sent to the issuer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalCardOrder {
    pub card_id: Uuid,
    pub shipping_address: ShippingAddress,
}

/// Provider health report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub message: String,
}

/// User profile fields this layer reads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub membership_tier: MembershipTier,
}

/// Checkout session request for a physical card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub card_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub shipping_address: ShippingAddress,
    pub success_url: String,
    pub cancel_url: String,
}

/// Created checkout session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Card-issuing provider
#[async_trait]
pub trait CardProvider: Send + Sync {
    /// List every card of the current user
    async fn list_cards(&self) -> Result<Vec<Card>, ProviderError>;

    /// Issue a new card
    async fn issue_card(&self, request: &IssueCardRequest) -> Result<Card, ProviderError>;

    /// Block or unblock a card
    async fn toggle_card(
        &self,
        card_id: Uuid,
        action: ToggleAction,
        reason: Option<&str>,
    ) -> Result<Card, ProviderError>;

    /// Order a physical card for an existing card
    async fn order_physical_card(&self, order: &PhysicalCardOrder) -> Result<Card, ProviderError>;

    /// Replace merchant controls
    async fn update_card_controls(
        &self,
        card_id: Uuid,
        controls: CardControls,
    ) -> Result<Card, ProviderError>;

    /// Replace spending limits
    async fn update_spending_limits(
        &self,
        card_id: Uuid,
        limits: SpendingLimits,
    ) -> Result<Card, ProviderError>;

    /// Provider connectivity check
    async fn health_check(&self) -> Result<HealthReport, ProviderError>;
}

/// Accounts subsystem
#[async_trait]
pub trait AccountsProvider: Send + Sync {
    async fn list_accounts(&self) -> Result<Vec<Account>, ProviderError>;
}

/// User profile subsystem
#[async_trait]
pub trait ProfileProvider: Send + Sync {
    async fn get_profile(&self) -> Result<Profile, ProviderError>;
}

/// Stripe-style payment provider
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, ProviderError>;
}

/// Live FX rates, expressed as units of each currency per one `base`
#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn fetch_rates(&self, base: &str) -> Result<HashMap<String, Decimal>, ProviderError>;
}
