//! Error Types

use thiserror::Error;

/// Result type alias for store and identity operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error types
#[derive(Error, Debug)]
pub enum CoreError {
    /// Backing store could not be reached or answered with a server error
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Write rejected by a uniqueness constraint
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Identity credential rejected by the provider
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Unavailable(_))
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            CoreError::Unavailable(_) => "The service is temporarily unavailable. Please try again.",
            CoreError::NotFound(_) => "User not found.",
            CoreError::InvalidCredential(_) => "Your Google session is invalid or expired.",
            _ => "An unexpected error occurred.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_retryable() {
        assert!(CoreError::Unavailable("timeout".into()).is_retryable());
        assert!(!CoreError::Conflict("cus_1".into()).is_retryable());
        assert!(!CoreError::InvalidCredential("expired".into()).is_retryable());
    }
}
