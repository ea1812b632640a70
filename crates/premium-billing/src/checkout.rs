//! Stripe Checkout Integration
//!
//! Hosted checkout for the single LottoMestre Premium price. The local user
//! id travels as `client_reference_id` so the completed session can be
//! attributed without matching on email.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stripe::{
    CheckoutSession as StripeCheckoutSession, CheckoutSessionMode, Client,
    CreateCheckoutSession, CreateCheckoutSessionLineItems, Customer, CustomerId,
};

use crate::directory::CustomerDirectory;
use crate::error::{PaymentError, Result};

const DEFAULT_SUCCESS_URL: &str =
    "https://lottomestre.com.br/sucesso?session_id={CHECKOUT_SESSION_ID}";
const DEFAULT_CANCEL_URL: &str = "https://lottomestre.com.br/cancelou";

/// Stripe client wrapper
pub struct StripeClient {
    client: Client,
    webhook_secret: String,
    price_id: String,
    success_url: String,
    cancel_url: String,
}

impl StripeClient {
    /// Create a new Stripe client
    pub fn new(secret_key: &str, webhook_secret: &str, price_id: &str) -> Self {
        Self {
            client: Client::new(secret_key),
            webhook_secret: webhook_secret.to_string(),
            price_id: price_id.to_string(),
            success_url: DEFAULT_SUCCESS_URL.to_string(),
            cancel_url: DEFAULT_CANCEL_URL.to_string(),
        }
    }

    /// Override the post-checkout redirect URLs
    pub fn with_redirects(mut self, success_url: impl Into<String>, cancel_url: impl Into<String>) -> Self {
        self.success_url = success_url.into();
        self.cancel_url = cancel_url.into();
        self
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let secret_key = require_env("STRIPE_SECRET_KEY")?;
        let webhook_secret = require_env("STRIPE_WEBHOOK_SECRET")?;
        let price_id = require_env("STRIPE_PRICE_ID")?;

        let success_url = std::env::var("CHECKOUT_SUCCESS_URL")
            .unwrap_or_else(|_| DEFAULT_SUCCESS_URL.into());
        let cancel_url = std::env::var("CHECKOUT_CANCEL_URL")
            .unwrap_or_else(|_| DEFAULT_CANCEL_URL.into());

        Ok(Self::new(&secret_key, &webhook_secret, &price_id).with_redirects(success_url, cancel_url))
    }

    /// Get the webhook secret
    pub fn webhook_secret(&self) -> &str {
        &self.webhook_secret
    }

    /// Create a Stripe Checkout session (Hosted approach)
    ///
    /// Returns a URL to redirect the user to Stripe's hosted checkout page.
    pub async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<CheckoutSession> {
        let mut params = CreateCheckoutSession::new();
        params.client_reference_id = Some(&request.user_id);
        params.customer_email = request.customer_email.as_deref();
        params.success_url = Some(&self.success_url);
        params.cancel_url = Some(&self.cancel_url);
        params.mode = Some(CheckoutSessionMode::Subscription);

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("user_id".to_string(), request.user_id.clone());
        params.metadata = Some(metadata);

        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(self.price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);

        let session = StripeCheckoutSession::create(&self.client, params)
            .await
            .map_err(|e| PaymentError::Stripe(e.to_string()))?;

        let checkout_url = session.url.ok_or_else(|| {
            PaymentError::Stripe("No checkout URL returned".into())
        })?;

        tracing::info!(
            session_id = %session.id,
            user_id = %request.user_id,
            "Created checkout session"
        );

        Ok(CheckoutSession {
            id: session.id.to_string(),
            checkout_url,
        })
    }
}

#[async_trait]
impl CustomerDirectory for StripeClient {
    async fn customer_email(&self, billing_reference: &str) -> Result<Option<String>> {
        let id: CustomerId = billing_reference
            .parse()
            .map_err(|e| PaymentError::Stripe(format!("invalid customer id {billing_reference}: {e}")))?;

        let customer = Customer::retrieve(&self.client, &id, &[])
            .await
            .map_err(|e| PaymentError::Stripe(e.to_string()))?;

        Ok(customer.email)
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| PaymentError::Config(format!("{key} not set")))
}

/// Request to create a checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Local user id, echoed back as `client_reference_id`
    pub user_id: String,

    /// Prefills the email field on the hosted page
    #[serde(default)]
    pub customer_email: Option<String>,
}

/// Result of creating a checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Stripe session ID
    pub id: String,

    /// URL to redirect user to
    pub checkout_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_redirects() {
        let client = StripeClient::new("sk_test_x", "whsec_x", "price_1");
        assert_eq!(client.success_url, DEFAULT_SUCCESS_URL);
        assert_eq!(client.cancel_url, DEFAULT_CANCEL_URL);
        assert_eq!(client.price_id, "price_1");
        assert_eq!(client.webhook_secret(), "whsec_x");
    }

    #[test]
    fn test_redirect_override() {
        let client = StripeClient::new("sk_test_x", "whsec_x", "price_1")
            .with_redirects("https://example.com/ok", "https://example.com/no");
        assert_eq!(client.success_url, "https://example.com/ok");
        assert_eq!(client.cancel_url, "https://example.com/no");
    }
}
