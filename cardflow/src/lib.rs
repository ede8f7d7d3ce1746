//! Cardflow Core - virtual card lifecycle rules
//!
//! This library holds the domain model for issued payment cards and every rule
//! that can be checked locally before a card-issuing provider is contacted:
//! membership quotas, status transitions, spending limits, shipping address
//! completeness, collateral calculations, filtering, aggregation and the
//! crypto-to-fiat conversion workflow.

pub mod error;
pub mod card;
pub mod tier;
pub mod address;
pub mod account;
pub mod limits;
pub mod filter;
pub mod conversion;

// Re-export commonly used types for convenience
pub use error::{Error, Result};
pub use card::{
    Card, CardControls, CardStatus, CardSubType, CardType, PhysicalCardStatus, SpendingLimits,
    ToggleAction,
};
pub use tier::MembershipTier;
pub use address::ShippingAddress;
pub use account::Account;
pub use filter::{CardFilter, CardStats, Selection};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
