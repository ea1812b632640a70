//! Billing Customer Directory
//!
//! Secondary lookup used when a billing reference matches no local user:
//! ask the billing provider which email the customer was created with.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    /// Email on file for a billing customer, if any
    async fn customer_email(&self, billing_reference: &str) -> Result<Option<String>>;
}

/// Directory that knows nobody (billing provider not configured)
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyDirectory;

#[async_trait]
impl CustomerDirectory for EmptyDirectory {
    async fn customer_email(&self, _billing_reference: &str) -> Result<Option<String>> {
        Ok(None)
    }
}
