//! Payment Error Types

use premium_core::CoreError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Stripe API error
    #[error("Stripe error: {0}")]
    Stripe(String),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Activation names a user that does not exist (yet)
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Store(#[from] CoreError),

    /// Notification delivery failed
    #[error("Notification error: {0}")]
    Notification(String),
}

impl PaymentError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::Stripe(_) | PaymentError::UserNotFound(_) => true,
            PaymentError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            PaymentError::Stripe(_) => "Payment processing failed. Please try again.",
            PaymentError::UserNotFound(_) => "User not found.",
            PaymentError::Config(_) => "Service configuration error.",
            _ => "An error occurred processing your request.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(PaymentError::UserNotFound("u1".into()).is_retryable());
        assert!(PaymentError::Store(CoreError::Unavailable("down".into())).is_retryable());
        assert!(!PaymentError::Store(CoreError::Conflict("cus_1".into())).is_retryable());
        assert!(!PaymentError::WebhookParse("bad".into()).is_retryable());
    }
}
