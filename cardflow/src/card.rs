//! Card entity, status transitions and toggle actions

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Card type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    Virtual,
    Physical,
}

impl Default for CardType {
    fn default() -> Self {
        CardType::Virtual
    }
}

impl CardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Virtual => "virtual",
            CardType::Physical => "physical",
        }
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "virtual" => Ok(CardType::Virtual),
            "physical" => Ok(CardType::Physical),
            other => Err(Error::InvalidInput(format!("unknown card type '{}'", other))),
        }
    }
}

/// Funding model of a card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardSubType {
    Debit,
    Prepaid,
    Credit,
}

impl Default for CardSubType {
    fn default() -> Self {
        CardSubType::Debit
    }
}

impl CardSubType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardSubType::Debit => "debit",
            CardSubType::Prepaid => "prepaid",
            CardSubType::Credit => "credit",
        }
    }
}

impl fmt::Display for CardSubType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardSubType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debit" => Ok(CardSubType::Debit),
            "prepaid" => Ok(CardSubType::Prepaid),
            "credit" => Ok(CardSubType::Credit),
            other => Err(Error::InvalidInput(format!("unknown card sub-type '{}'", other))),
        }
    }
}

/// Card status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    Issued,
    Active,
    Blocked,
    Expired,
}

impl Default for CardStatus {
    fn default() -> Self {
        CardStatus::Issued
    }
}

impl CardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::Issued => "issued",
            CardStatus::Active => "active",
            CardStatus::Blocked => "blocked",
            CardStatus::Expired => "expired",
        }
    }

    /// Whether a card may move from this status to `next`.
    ///
    /// Allowed moves are `issued -> active`, `active <-> blocked` and any
    /// non-expired status to `expired`. Expired is terminal.
    pub fn can_transition_to(&self, next: CardStatus) -> bool {
        matches!(
            (self, next),
            (CardStatus::Issued, CardStatus::Active)
                | (CardStatus::Active, CardStatus::Blocked)
                | (CardStatus::Blocked, CardStatus::Active)
                | (CardStatus::Issued, CardStatus::Expired)
                | (CardStatus::Active, CardStatus::Expired)
                | (CardStatus::Blocked, CardStatus::Expired)
        )
    }

    /// Check a transition, returning the target status on success
    pub fn transition_to(&self, next: CardStatus) -> Result<CardStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidTransition { from: *self, to: next })
        }
    }
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "issued" => Ok(CardStatus::Issued),
            "active" => Ok(CardStatus::Active),
            "blocked" => Ok(CardStatus::Blocked),
            "expired" => Ok(CardStatus::Expired),
            other => Err(Error::InvalidInput(format!("unknown card status '{}'", other))),
        }
    }
}

/// Fulfillment progress of a physical card order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhysicalCardStatus {
    AwaitingPayment,
    Ordered,
    Shipped,
    Delivered,
}

/// Block/unblock action applied by a status toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleAction {
    Block,
    Unblock,
}

impl ToggleAction {
    /// Reason attached to user-initiated blocks
    pub const USER_REQUESTED: &'static str = "User requested";

    /// An active card gets blocked; every other status gets unblocked.
    pub fn for_status(status: CardStatus) -> Self {
        match status {
            CardStatus::Active => ToggleAction::Block,
            _ => ToggleAction::Unblock,
        }
    }

    pub fn target_status(&self) -> CardStatus {
        match self {
            ToggleAction::Block => CardStatus::Blocked,
            ToggleAction::Unblock => CardStatus::Active,
        }
    }

    pub fn default_reason(&self) -> Option<&'static str> {
        match self {
            ToggleAction::Block => Some(Self::USER_REQUESTED),
            ToggleAction::Unblock => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToggleAction::Block => "block",
            ToggleAction::Unblock => "unblock",
        }
    }
}

impl fmt::Display for ToggleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Card spending limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendingLimits {
    /// Monthly spending limit
    pub spending_limit: Decimal,
    pub daily_limit: Decimal,
}

impl SpendingLimits {
    pub fn new(spending_limit: Decimal, daily_limit: Decimal) -> Self {
        Self { spending_limit, daily_limit }
    }

    /// Both limits non-negative, daily limit not above the monthly one
    pub fn validate(&self) -> Result<()> {
        if self.spending_limit < Decimal::ZERO {
            return Err(Error::InvalidLimit(format!(
                "spending limit must not be negative, got {}",
                self.spending_limit
            )));
        }
        if self.daily_limit < Decimal::ZERO {
            return Err(Error::InvalidLimit(format!(
                "daily limit must not be negative, got {}",
                self.daily_limit
            )));
        }
        if self.daily_limit > self.spending_limit {
            return Err(Error::InvalidLimit(format!(
                "daily limit {} exceeds monthly limit {}",
                self.daily_limit, self.spending_limit
            )));
        }
        Ok(())
    }
}

impl Default for SpendingLimits {
    fn default() -> Self {
        Self {
            spending_limit: Decimal::from(5000),
            daily_limit: Decimal::from(1000),
        }
    }
}

/// Merchant-facing card controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardControls {
    pub online_payments: bool,
    pub international: bool,
    pub atm_withdrawals: bool,
    pub contactless: bool,
}

impl Default for CardControls {
    fn default() -> Self {
        Self {
            online_payments: true,
            international: false,
            atm_withdrawals: true,
            contactless: true,
        }
    }
}

/// Parameters of a card issuance request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueCardRequest {
    pub card_type: CardType,
    pub card_sub_type: CardSubType,
    pub card_holder_name: String,
    pub spending_limit: Decimal,
    pub daily_limit: Decimal,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_account_id: Option<Uuid>,
}

impl IssueCardRequest {
    pub fn limits(&self) -> SpendingLimits {
        SpendingLimits::new(self.spending_limit, self.daily_limit)
    }

    /// Holder name with surrounding whitespace removed
    pub fn holder_name(&self) -> &str {
        self.card_holder_name.trim()
    }
}

/// Issued card as reported by the card provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: Uuid,
    /// Masked display (****-****-****-1234)
    pub masked_number: String,
    /// Full number, only present in the issuance response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_number: Option<String>,
    pub card_holder_name: String,
    pub card_type: CardType,
    pub card_sub_type: CardSubType,
    pub status: CardStatus,
    pub currency: String,
    pub balance: Decimal,
    /// Monthly spending limit
    pub spending_limit: Decimal,
    pub daily_limit: Decimal,
    pub expiry_month: u32,
    pub expiry_year: i32,
    #[serde(default)]
    pub controls: CardControls,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_account_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_card_status: Option<PhysicalCardStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    /// Build a freshly issued card from a request and a generated number
    pub fn issued(request: &IssueCardRequest, card_number: &str, expires_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            masked_number: mask_card_number(card_number),
            card_number: Some(card_number.to_string()),
            card_holder_name: request.holder_name().to_string(),
            card_type: request.card_type,
            card_sub_type: request.card_sub_type,
            status: CardStatus::Issued,
            currency: request.currency.clone(),
            balance: Decimal::ZERO,
            spending_limit: request.spending_limit,
            daily_limit: request.daily_limit,
            expiry_month: expires_at.month(),
            expiry_year: expires_at.year(),
            controls: CardControls::default(),
            linked_account_id: request.linked_account_id,
            physical_card_status: None,
            tracking_number: None,
            activation_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn last_four(&self) -> &str {
        let len = self.masked_number.len();
        self.masked_number.get(len.saturating_sub(4)..).unwrap_or("")
    }

    pub fn limits(&self) -> SpendingLimits {
        SpendingLimits::new(self.spending_limit, self.daily_limit)
    }

    pub fn is_active(&self) -> bool {
        self.status == CardStatus::Active
    }

    /// Apply a status change, enforcing the transition rules
    pub fn update_status(&mut self, next: CardStatus) -> Result<()> {
        self.status = self.status.transition_to(next)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Apply new spending limits after validating them
    pub fn update_limits(&mut self, limits: SpendingLimits) -> Result<()> {
        limits.validate()?;
        self.spending_limit = limits.spending_limit;
        self.daily_limit = limits.daily_limit;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Whether the card's expiry month has passed at `now`
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        (now.year(), now.month()) > (self.expiry_year, self.expiry_month)
    }

    /// Status with the expiry date applied; issuers may lag behind the calendar
    pub fn effective_status(&self, now: DateTime<Utc>) -> CardStatus {
        if self.is_past_expiry(now) {
            CardStatus::Expired
        } else {
            self.status
        }
    }
}

/// Mask a card number down to its last four digits
pub fn mask_card_number(number: &str) -> String {
    let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
    let last_four = digits.get(digits.len().saturating_sub(4)..).unwrap_or("");
    format!("****-****-****-{}", last_four)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn masks_all_but_last_four() {
        assert_eq!(mask_card_number("4000123456789012"), "****-****-****-9012");
        assert_eq!(mask_card_number("4000 1234 5678 9012"), "****-****-****-9012");
    }

    #[test]
    fn expired_is_terminal() {
        for next in [CardStatus::Issued, CardStatus::Active, CardStatus::Blocked, CardStatus::Expired] {
            assert!(!CardStatus::Expired.can_transition_to(next));
        }
    }

    #[test]
    fn issued_cannot_be_blocked_directly() {
        assert!(!CardStatus::Issued.can_transition_to(CardStatus::Blocked));
        assert!(CardStatus::Issued.can_transition_to(CardStatus::Active));
    }

    #[test]
    fn expiry_date_overrides_reported_status() {
        let request = IssueCardRequest {
            card_type: CardType::Virtual,
            card_sub_type: CardSubType::Debit,
            card_holder_name: "Jane Doe".to_string(),
            spending_limit: Decimal::from(1000),
            daily_limit: Decimal::from(200),
            currency: "USD".to_string(),
            linked_account_id: None,
        };
        let expires_at = Utc.with_ymd_and_hms(2027, 3, 31, 0, 0, 0).unwrap();
        let mut card = Card::issued(&request, "4000123412341234", expires_at);
        card.status = CardStatus::Active;

        let within = Utc.with_ymd_and_hms(2027, 3, 31, 23, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2027, 4, 1, 0, 0, 0).unwrap();
        assert!(!card.is_past_expiry(within));
        assert_eq!(card.effective_status(within), CardStatus::Active);
        assert!(card.is_past_expiry(after));
        assert_eq!(card.effective_status(after), CardStatus::Expired);
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Active".parse::<CardStatus>().unwrap(), CardStatus::Active);
        assert!("frozen".parse::<CardStatus>().is_err());
    }
}
