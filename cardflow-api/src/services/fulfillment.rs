//! Physical card fulfillment
//!
//! Every backend is driven through [`FulfillmentService::order_physical_card`].
//! Backends that charge for the card hand back a checkout session; the order
//! is then submitted by [`FulfillmentService::complete_checkout`] once the
//! payment provider reports the session as paid.

use std::collections::HashMap;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use cardflow::{Card, Error, PhysicalCardStatus, ShippingAddress};

use crate::error::{Result, ServiceError};
use crate::middleware::CardGuard;
use crate::providers::{CheckoutRequest, PhysicalCardOrder, ProviderBackend, ProviderError};
use crate::services::cards::remote;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";
const CHECKOUT_COMPLETED: &str = "checkout.completed";

/// Result of a physical card order
#[derive(Debug, Clone, PartialEq)]
pub enum FulfillmentOutcome {
    /// The user must pay at `url` before the order is placed
    CheckoutRequired { session_id: String, url: String },
    /// The issuer accepted the order
    Ordered(Card),
}

#[derive(Debug, Deserialize)]
struct CheckoutEvent {
    #[serde(rename = "type")]
    event_type: String,
    session_id: String,
}

/// Order parked until its checkout session is paid
#[derive(Debug, Clone)]
struct PendingCheckout {
    order: PhysicalCardOrder,
    url: String,
}

/// Physical card ordering across card-issuing backends
pub struct FulfillmentService {
    state: Arc<AppState>,
    guard: CardGuard,
    /// Keyed by checkout session id; at most one session per card
    awaiting_payment: AsyncMutex<HashMap<String, PendingCheckout>>,
}

impl FulfillmentService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            guard: CardGuard::new(),
            awaiting_payment: AsyncMutex::new(HashMap::new()),
        }
    }

    pub fn backend(&self) -> ProviderBackend {
        self.state.config.backend
    }

    #[instrument(skip(self, address), fields(backend = %self.backend()))]
    pub async fn order_physical_card(
        &self,
        card_id: Uuid,
        address: ShippingAddress,
    ) -> Result<FulfillmentOutcome> {
        self.guard.validate_shipping_address(&address)?;
        let address = address.normalized();

        let provider = self.state.cards.clone();
        let cards = self
            .state
            .cache
            .cards(|| async move { provider.list_cards().await })
            .await
            .map_err(|e| remote("list cards", e))?;
        let card = self.guard.validate_card_exists(&cards, card_id)?;
        if matches!(
            card.physical_card_status,
            Some(PhysicalCardStatus::Ordered | PhysicalCardStatus::Shipped | PhysicalCardStatus::Delivered)
        ) {
            return Err(Error::InvalidInput(format!("physical card already ordered for card {}", card_id)).into());
        }

        let order = PhysicalCardOrder { card_id, shipping_address: address };
        match self.backend() {
            ProviderBackend::Legacy => self.start_checkout(order, &card.currency).await,
            ProviderBackend::Nium => self.submit(&order).await.map(FulfillmentOutcome::Ordered),
        }
    }

    /// Handle a payment webhook. Returns the ordered card for a completed
    /// checkout and `None` for events that need no action. The order stays
    /// parked until the issuer accepts it, so a redelivered webhook retries.
    #[instrument(skip_all)]
    pub async fn complete_checkout(&self, payload: &[u8], signature: &str) -> Result<Option<Card>> {
        verify_signature(&self.state.config.webhook_secret, payload, signature)?;

        let event: CheckoutEvent = serde_json::from_slice(payload)
            .map_err(|e| ServiceError::Webhook(format!("invalid event payload: {}", e)))?;
        if event.event_type != CHECKOUT_COMPLETED {
            debug!(event_type = %event.event_type, "ignoring checkout event");
            return Ok(None);
        }

        let mut pending = self.awaiting_payment.lock().await;
        let order = pending
            .get(&event.session_id)
            .map(|checkout| checkout.order.clone())
            .ok_or_else(|| ServiceError::Webhook(format!("unknown checkout session {}", event.session_id)))?;

        info!(session_id = %event.session_id, card_id = %order.card_id, "checkout completed");
        let card = self.submit(&order).await?;
        pending.remove(&event.session_id);
        Ok(Some(card))
    }

    /// Sessions still waiting for payment
    pub async fn awaiting_payment(&self) -> usize {
        self.awaiting_payment.lock().await.len()
    }

    /// Reuses the card's unpaid session rather than opening a second charge
    async fn start_checkout(&self, order: PhysicalCardOrder, currency: &str) -> Result<FulfillmentOutcome> {
        let mut pending = self.awaiting_payment.lock().await;
        if let Some((session_id, checkout)) = pending
            .iter()
            .find(|(_, checkout)| checkout.order.card_id == order.card_id)
        {
            info!(%session_id, card_id = %order.card_id, "reusing unpaid checkout session");
            return Ok(FulfillmentOutcome::CheckoutRequired {
                session_id: session_id.clone(),
                url: checkout.url.clone(),
            });
        }

        let config = &self.state.config;
        let request = CheckoutRequest {
            card_id: order.card_id,
            amount: config.physical_card_fee,
            currency: currency.to_string(),
            shipping_address: order.shipping_address.clone(),
            success_url: config.checkout_success_url.clone(),
            cancel_url: config.checkout_cancel_url.clone(),
        };

        let _pending = self.state.mutations.begin();
        let session = self
            .state
            .payments
            .create_checkout_session(&request)
            .await
            .map_err(|e| remote("create checkout session", e))?;
        let url = session.url.ok_or_else(|| {
            warn!(session_id = %session.id, "checkout session has no redirect URL");
            ServiceError::Provider(ProviderError::InvalidResponse(
                "checkout session has no redirect URL".to_string(),
            ))
        })?;

        pending.insert(session.id.clone(), PendingCheckout { order, url: url.clone() });
        info!(session_id = %session.id, "physical card awaiting payment");
        Ok(FulfillmentOutcome::CheckoutRequired { session_id: session.id, url })
    }

    async fn submit(&self, order: &PhysicalCardOrder) -> Result<Card> {
        let _pending = self.state.mutations.begin();
        let card = self
            .state
            .cards
            .order_physical_card(order)
            .await
            .map_err(|e| remote("order physical card", e))?;
        self.state.cache.invalidate_cards().await;

        info!(card_id = %card.id, tracking = ?card.tracking_number, "physical card ordered");
        Ok(card)
    }
}

/// `sha256=<hex>` HMAC of `payload` under `secret`
pub fn sign_payload(secret: &str, payload: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ServiceError::Webhook(e.to_string()))?;
    mac.update(payload);
    Ok(format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes())))
}

/// Constant-time check of a `sha256=<hex>` webhook signature
pub fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> Result<()> {
    let digest = signature
        .trim()
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or_else(|| ServiceError::Webhook("signature must start with sha256=".to_string()))?;
    let expected = hex::decode(digest)
        .map_err(|_| ServiceError::Webhook("signature is not valid hex".to_string()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ServiceError::Webhook(e.to_string()))?;
    mac.update(payload);
    mac.verify_slice(&expected)
        .map_err(|_| ServiceError::Webhook("signature mismatch".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_round_trip() {
        let payload = br#"{"type":"checkout.completed","session_id":"cs_1"}"#;
        let signature = sign_payload("whsec_test", payload).unwrap();
        assert!(signature.starts_with("sha256="));
        assert!(verify_signature("whsec_test", payload, &signature).is_ok());
        assert!(verify_signature("other", payload, &signature).is_err());
    }

    #[test]
    fn malformed_signatures_are_rejected() {
        let payload = b"{}";
        assert!(verify_signature("whsec_test", payload, "deadbeef").is_err());
        assert!(verify_signature("whsec_test", payload, "sha256=zz").is_err());
    }
}
