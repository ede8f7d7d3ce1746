//! Error handling for the card service layer

use thiserror::Error;

use crate::providers::ProviderError;

/// Generic message shown when a provider error carries nothing useful
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";

/// Errors returned by card service operations
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Local validation failed, no mutation was sent
    #[error(transparent)]
    Validation(#[from] cardflow::Error),

    /// The provider rejected or failed the request
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Webhook error: {0}")]
    Webhook(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Whether the failure was detected before any remote mutation
    pub fn is_local(&self) -> bool {
        matches!(self, ServiceError::Validation(_) | ServiceError::Webhook(_))
    }

    /// Message suitable for a toast: the provider's own message or a fallback
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::Validation(e) => e.to_string(),
            ServiceError::Provider(e) => e
                .provider_message()
                .map(str::to_string)
                .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string()),
            ServiceError::Webhook(_) | ServiceError::Config(_) | ServiceError::Internal(_) => {
                GENERIC_FAILURE_MESSAGE.to_string()
            }
        }
    }
}

/// Result type for card service operations
pub type Result<T> = std::result::Result<T, ServiceError>;
