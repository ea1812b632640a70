//! LottoMestre Premium HTTP Server
//!
//! Axum server behind the browser extension: Google login, plan status,
//! Stripe checkout, and the Stripe webhook that keeps plans in sync.

mod config;
mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use premium_billing::{
    CustomerDirectory, EmptyDirectory, NoopNotifier, Notifier, Reconciler, StripeClient,
};
use premium_core::{MemoryUserStore, UserStore};
use premium_runtime::{GoogleIdentityProvider, ResendNotifier, SupabaseUserStore};

use crate::config::ServerConfig;
use crate::handlers::{create_checkout, google_auth, health_check, stripe_webhook, user_status};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();
    let config = ServerConfig::from_env();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // User store
    let store: Arc<dyn UserStore> = match SupabaseUserStore::from_env() {
        Ok(store) => {
            tracing::info!("✓ Supabase user store configured");
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!("⚠ Supabase not configured ({}) - using in-memory users", e);
            tracing::warn!("  Set SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY in .env");
            Arc::new(MemoryUserStore::new())
        }
    };

    // Email
    let notifier: Arc<dyn Notifier> = match ResendNotifier::from_env() {
        Ok(notifier) => {
            tracing::info!("✓ Resend email configured");
            Arc::new(notifier)
        }
        Err(_) => {
            tracing::warn!("⚠ RESEND_API_KEY not set - emails will only be logged");
            Arc::new(NoopNotifier)
        }
    };

    // Payments
    let stripe = StripeClient::from_env().ok().map(Arc::new);
    if stripe.is_some() {
        tracing::info!("✓ Stripe configured");
    } else {
        tracing::warn!("⚠ Stripe not configured - payments disabled");
        tracing::warn!("  Set STRIPE_SECRET_KEY, STRIPE_WEBHOOK_SECRET and STRIPE_PRICE_ID in .env");
    }

    let directory: Arc<dyn CustomerDirectory> = match &stripe {
        Some(stripe) => stripe.clone() as Arc<dyn CustomerDirectory>,
        None => Arc::new(EmptyDirectory),
    };
    let reconciler = Arc::new(Reconciler::new(store.clone(), directory, notifier));

    let allowed_origin = config.allowed_origin();
    if allowed_origin.is_none() {
        tracing::warn!("⚠ CHROME_EXTENSION_ID not set - CORS is open to any origin");
    }

    // Build application state
    let state = AppState {
        store,
        identity: Arc::new(GoogleIdentityProvider::google()?),
        reconciler,
        stripe,
        allowed_origin: allowed_origin.clone(),
    };

    let app = build_router(state, cors_layer(allowed_origin.as_deref())?);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("🚀 premium-server running on http://{}", config.bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                              - Health check");
    tracing::info!("  POST /api/auth/google                     - Google login");
    tracing::info!("  POST /api/user/status                     - Plan status");
    tracing::info!("  POST /api/payments/create-checkout-session - Stripe checkout");
    tracing::info!("  POST /api/webhooks/stripe                 - Stripe webhook");

    axum::serve(listener, app).await?;

    Ok(())
}

/// CORS restricted to the extension, or fully open when no extension id is set
pub fn cors_layer(allowed_origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    Ok(match allowed_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_methods([Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE]),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    })
}

pub fn build_router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Extension API
        .route("/api/auth/google", post(google_auth))
        .route("/api/user/status", post(user_status))
        .route("/api/payments/create-checkout-session", post(create_checkout))
        // Stripe
        .route("/api/webhooks/stripe", post(stripe_webhook))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
