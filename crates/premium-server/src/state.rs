//! Application State

use std::sync::Arc;

use premium_billing::{Reconciler, StripeClient};
use premium_core::{IdentityProvider, UserStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// User table (Supabase, or in-memory for development)
    pub store: Arc<dyn UserStore>,

    /// Login backend
    pub identity: Arc<dyn IdentityProvider>,

    /// Applies verified Stripe events to user entitlements
    pub reconciler: Arc<Reconciler>,

    /// Stripe client (optional - None if not configured)
    pub stripe: Option<Arc<StripeClient>>,

    /// `chrome-extension://<id>`; login requests must come from it when set
    pub allowed_origin: Option<String>,
}
