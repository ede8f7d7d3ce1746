//! JSON-over-HTTP client for the card-issuing backends

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use cardflow::card::IssueCardRequest;
use cardflow::{Account, Card, CardControls, SpendingLimits, ToggleAction};

use super::{
    AccountsProvider, CardProvider, HealthReport, PhysicalCardOrder, Profile, ProfileProvider,
    ProviderBackend, ProviderError,
};

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            ProviderError::InvalidResponse(error.to_string())
        } else {
            ProviderError::Network(error.to_string())
        }
    }
}

/// Payloads arrive either bare or wrapped in a named field
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CardsEnvelope {
    Wrapped { cards: Vec<Card> },
    Bare(Vec<Card>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CardEnvelope {
    Wrapped { card: Card },
    Bare(Card),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AccountsEnvelope {
    Wrapped { accounts: Vec<Account> },
    Bare(Vec<Account>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProfileEnvelope {
    Wrapped { profile: Profile },
    Bare(Profile),
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct ToggleBody<'a> {
    action: ToggleAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

pub(crate) fn decode_cards(body: &[u8]) -> Result<Vec<Card>, ProviderError> {
    match serde_json::from_slice(body) {
        Ok(CardsEnvelope::Wrapped { cards }) | Ok(CardsEnvelope::Bare(cards)) => Ok(cards),
        Err(e) => Err(ProviderError::InvalidResponse(e.to_string())),
    }
}

pub(crate) fn decode_card(body: &[u8]) -> Result<Card, ProviderError> {
    match serde_json::from_slice(body) {
        Ok(CardEnvelope::Wrapped { card }) | Ok(CardEnvelope::Bare(card)) => Ok(card),
        Err(e) => Err(ProviderError::InvalidResponse(e.to_string())),
    }
}

/// Map an unsuccessful status and body to a provider error
pub(crate) fn error_from_status(status: StatusCode, body: &[u8]) -> ProviderError {
    let parsed: ErrorBody = serde_json::from_slice(body).unwrap_or_default();
    let message = parsed
        .error
        .or(parsed.message)
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());

    match status {
        StatusCode::NOT_FOUND => ProviderError::NotFound(message),
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => {
            ProviderError::Unavailable
        }
        _ => ProviderError::Rejected { status: status.as_u16(), message },
    }
}

/// REST provider for card, accounts and profile endpoints
pub struct RestProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    backend: ProviderBackend,
}

impl RestProvider {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        backend: ProviderBackend,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            backend,
        })
    }

    pub fn backend(&self) -> ProviderBackend {
        self.backend
    }

    fn cards_root(&self) -> String {
        match self.backend {
            ProviderBackend::Legacy => format!("{}/cards", self.base_url),
            ProviderBackend::Nium => format!("{}/nium/cards", self.base_url),
        }
    }

    pub(crate) fn card_url(&self, card_id: Uuid, action: &str) -> String {
        format!("{}/{}/{}", self.cards_root(), card_id, action)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn read(response: Response) -> Result<Vec<u8>, ProviderError> {
        let status = response.status();
        let body = response.bytes().await?.to_vec();
        if status.is_success() {
            Ok(body)
        } else {
            let error = error_from_status(status, &body);
            warn!(%status, %error, "card provider request failed");
            Err(error)
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Vec<u8>, ProviderError> {
        let response = builder.send().await?;
        Self::read(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ProviderError> {
        debug!(url, "GET");
        let body = self.send(self.request(Method::GET, url)).await?;
        serde_json::from_slice(&body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    async fn card_mutation<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        payload: &B,
    ) -> Result<Card, ProviderError> {
        debug!(url, %method, "card mutation");
        let body = self.send(self.request(method, url).json(payload)).await?;
        decode_card(&body)
    }
}

#[async_trait]
impl CardProvider for RestProvider {
    async fn list_cards(&self) -> Result<Vec<Card>, ProviderError> {
        let body = self.send(self.request(Method::GET, &self.cards_root())).await?;
        decode_cards(&body)
    }

    async fn issue_card(&self, request: &IssueCardRequest) -> Result<Card, ProviderError> {
        self.card_mutation(Method::POST, &self.cards_root(), request).await
    }

    async fn toggle_card(
        &self,
        card_id: Uuid,
        action: ToggleAction,
        reason: Option<&str>,
    ) -> Result<Card, ProviderError> {
        let payload = ToggleBody { action, reason };
        self.card_mutation(Method::POST, &self.card_url(card_id, "toggle"), &payload)
            .await
    }

    async fn order_physical_card(&self, order: &PhysicalCardOrder) -> Result<Card, ProviderError> {
        self.card_mutation(Method::POST, &self.card_url(order.card_id, "physical"), order)
            .await
    }

    async fn update_card_controls(
        &self,
        card_id: Uuid,
        controls: CardControls,
    ) -> Result<Card, ProviderError> {
        self.card_mutation(Method::PUT, &self.card_url(card_id, "controls"), &controls)
            .await
    }

    async fn update_spending_limits(
        &self,
        card_id: Uuid,
        limits: SpendingLimits,
    ) -> Result<Card, ProviderError> {
        self.card_mutation(Method::PUT, &self.card_url(card_id, "limits"), &limits)
            .await
    }

    async fn health_check(&self) -> Result<HealthReport, ProviderError> {
        self.get_json(&format!("{}/health", self.cards_root())).await
    }
}

#[async_trait]
impl AccountsProvider for RestProvider {
    async fn list_accounts(&self) -> Result<Vec<Account>, ProviderError> {
        let envelope: AccountsEnvelope = self.get_json(&format!("{}/accounts", self.base_url)).await?;
        Ok(match envelope {
            AccountsEnvelope::Wrapped { accounts } | AccountsEnvelope::Bare(accounts) => accounts,
        })
    }
}

#[async_trait]
impl ProfileProvider for RestProvider {
    async fn get_profile(&self) -> Result<Profile, ProviderError> {
        let envelope: ProfileEnvelope = self.get_json(&format!("{}/profile", self.base_url)).await?;
        Ok(match envelope {
            ProfileEnvelope::Wrapped { profile } | ProfileEnvelope::Bare(profile) => profile,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CARD_JSON: &str = r#"{
        "id": "7b1c6f5e-2a51-4f0e-9f5c-3b8f1f7d2a10",
        "masked_number": "****-****-****-4242",
        "card_holder_name": "Jane Doe",
        "card_type": "virtual",
        "card_sub_type": "debit",
        "status": "active",
        "currency": "USD",
        "balance": "125.40",
        "spending_limit": "1000",
        "daily_limit": "200",
        "expiry_month": 9,
        "expiry_year": 2028,
        "created_at": "2026-01-05T10:00:00Z",
        "updated_at": "2026-01-05T10:00:00Z"
    }"#;

    #[test]
    fn decodes_bare_and_wrapped_lists() {
        let bare = format!("[{}]", CARD_JSON);
        let wrapped = format!(r#"{{"cards": [{}]}}"#, CARD_JSON);
        assert_eq!(decode_cards(bare.as_bytes()).unwrap().len(), 1);
        assert_eq!(decode_cards(wrapped.as_bytes()).unwrap().len(), 1);

        let card = decode_card(CARD_JSON.as_bytes()).unwrap();
        assert_eq!(card.last_four(), "4242");
        assert_eq!(card.controls, CardControls::default());
    }

    #[test]
    fn error_body_message_is_preserved() {
        let err = error_from_status(StatusCode::UNPROCESSABLE_ENTITY, br#"{"error":"Limit too high"}"#);
        assert_eq!(err, ProviderError::Rejected { status: 422, message: "Limit too high".to_string() });
        assert_eq!(err.provider_message(), Some("Limit too high"));

        assert_eq!(error_from_status(StatusCode::BAD_GATEWAY, b""), ProviderError::Unavailable);
    }

    #[test]
    fn backend_selects_card_routes() {
        let id = Uuid::nil();
        let legacy =
            RestProvider::new("https://api.test/", None, ProviderBackend::Legacy, Duration::from_secs(5)).unwrap();
        let nium =
            RestProvider::new("https://api.test", None, ProviderBackend::Nium, Duration::from_secs(5)).unwrap();

        assert_eq!(
            legacy.card_url(id, "toggle"),
            format!("https://api.test/cards/{}/toggle", id)
        );
        assert_eq!(
            nium.card_url(id, "physical"),
            format!("https://api.test/nium/cards/{}/physical", id)
        );
    }
}
