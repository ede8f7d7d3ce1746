//! Stripe-style checkout sessions for paid physical card orders

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use uuid::Uuid;

use super::rest::error_from_status;
use super::{CheckoutRequest, CheckoutSession, PaymentProvider, ProviderError};

/// Checkout provider over HTTP
pub struct RestCheckoutProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestCheckoutProvider {
    pub fn new(base_url: &str, api_key: String, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl PaymentProvider for RestCheckoutProvider {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        let url = format!("{}/checkout/sessions", self.base_url);
        debug!(%url, card_id = %request.card_id, "creating checkout session");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(error_from_status(status, &body));
        }
        serde_json::from_slice(&body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

/// Checkout provider that records requests and hands out local URLs
pub struct InMemoryCheckoutProvider {
    requests: Mutex<Vec<CheckoutRequest>>,
    return_url: bool,
}

impl InMemoryCheckoutProvider {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            return_url: true,
        }
    }

    /// Sessions come back without a redirect URL
    pub fn without_url() -> Self {
        Self {
            return_url: false,
            ..Self::new()
        }
    }

    pub fn requests(&self) -> Vec<CheckoutRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Default for InMemoryCheckoutProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentProvider for InMemoryCheckoutProvider {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        self.requests
            .lock()
            .map_err(|_| ProviderError::Unavailable)?
            .push(request.clone());

        let id = format!("cs_{}", Uuid::new_v4().simple());
        let url = self
            .return_url
            .then(|| format!("https://checkout.cardflow.dev/pay/{}", id));
        Ok(CheckoutSession { id, url })
    }
}
