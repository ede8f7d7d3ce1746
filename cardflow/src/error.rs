//! Error types for local card rules

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::card::CardStatus;
use crate::tier::MembershipTier;

/// Validation error raised before any provider is contacted
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Card holder name is required")]
    MissingHolderName,

    #[error("Card limit reached: {tier} membership allows up to {max} cards")]
    QuotaExceeded { tier: MembershipTier, max: usize },

    #[error("Invalid limit: {0}")]
    InvalidLimit(String),

    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Cannot move card from {from} to {to}")]
    InvalidTransition { from: CardStatus, to: CardStatus },

    #[error("Requested amount {requested} exceeds maximum {maximum}")]
    AmountExceedsMaximum { requested: Decimal, maximum: Decimal },

    #[error("Rate must be between 0 and 100, got {0}")]
    InvalidRate(Decimal),

    #[error("Amount must not be negative: {0}")]
    NegativeAmount(Decimal),

    #[error("Card not found: {0}")]
    CardNotFound(Uuid),

    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    #[error("Unsupported currency or asset: {0}")]
    UnsupportedCurrency(String),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for local card rules
pub type Result<T> = std::result::Result<T, Error>;
