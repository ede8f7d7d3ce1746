//! Cardflow API - card lifecycle service layer
//!
//! Wires the local rules from the `cardflow` crate to card-issuing, payment
//! and FX providers. Every mutation is validated by [`middleware::CardGuard`]
//! before it is sent, and the cached card list is refreshed afterwards.

pub mod cache;
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod providers;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{Result, ServiceError};
pub use services::{CardService, CurrencyContext, FulfillmentOutcome, FulfillmentService};
pub use state::AppState;
