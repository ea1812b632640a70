//! HTTP Handlers

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
};
use serde::{Deserialize, Serialize};

use premium_billing::{
    CheckoutRequest as PaymentCheckoutRequest, PaymentError, Reconciliation, construct_event,
};
use premium_core::{CoreError, User};

use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub stripe_configured: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

fn store_error(e: &CoreError) -> ApiError {
    tracing::error!("User store error: {}", e);
    let status = if e.is_retryable() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    api_error(status, "STORE_ERROR", e.user_message())
}

#[derive(Debug, Deserialize)]
pub struct GoogleAuthRequest {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserRequest {
    #[serde(default, rename = "userId")]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub url: String,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Reconciliation>,
}

fn required(value: Option<String>, code: &str, message: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, code, message))
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        stripe_configured: state.stripe.is_some(),
    })
}

/// Exchange a Google access token for the user row, creating it on first login
pub async fn google_auth(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<GoogleAuthRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    if let Some(allowed) = &state.allowed_origin {
        let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
        if origin != Some(allowed.as_str()) {
            tracing::warn!(origin = ?origin, "Login from disallowed origin");
            return Err(api_error(
                StatusCode::FORBIDDEN,
                "ORIGIN_NOT_ALLOWED",
                "Forbidden: Origin not allowed",
            ));
        }
    }

    let token = required(payload.token, "TOKEN_REQUIRED", "Token is required")?;

    let identity = state.identity.identify(&token).await.map_err(|e| match e {
        CoreError::InvalidCredential(_) => {
            tracing::warn!("Rejected {} credential: {}", state.identity.name(), e);
            api_error(StatusCode::UNAUTHORIZED, "INVALID_TOKEN", e.user_message())
        }
        other => {
            tracing::error!("Identity provider error: {}", other);
            api_error(StatusCode::BAD_GATEWAY, "IDENTITY_UNAVAILABLE", other.user_message())
        }
    })?;

    let user = state
        .store
        .create_if_absent(identity.into())
        .await
        .map_err(|e| store_error(&e))?;

    tracing::info!(user_id = %user.id, plan = %user.plan, "User signed in");
    Ok(Json(UserResponse { user }))
}

/// Current plan of a user
pub async fn user_status(
    State(state): State<AppState>,
    Json(payload): Json<UserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let user_id = required(payload.user_id, "USER_ID_REQUIRED", "User ID is required")?;

    match state.store.get(&user_id).await {
        Ok(Some(user)) => Ok(Json(UserResponse { user })),
        Ok(None) => Err(api_error(StatusCode::NOT_FOUND, "USER_NOT_FOUND", "User not found")),
        Err(e) => Err(store_error(&e)),
    }
}

/// Create Stripe checkout session
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(payload): Json<UserRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let stripe = state.stripe.as_ref().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "PAYMENTS_DISABLED",
            "Payments not configured",
        )
    })?;

    let user_id = required(payload.user_id, "USER_ID_REQUIRED", "User ID is required")?;

    let user = match state.store.get(&user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return Err(api_error(StatusCode::NOT_FOUND, "USER_NOT_FOUND", "User not found"));
        }
        Err(e) => return Err(store_error(&e)),
    };

    if user.plan.is_premium() {
        return Err(api_error(
            StatusCode::CONFLICT,
            "ALREADY_PREMIUM",
            "User already has an active premium plan",
        ));
    }

    let session = stripe
        .create_checkout_session(PaymentCheckoutRequest {
            user_id: user.id,
            customer_email: Some(user.email),
        })
        .await
        .map_err(|e| {
            tracing::error!("Checkout error: {}", e);
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "CHECKOUT_ERROR",
                e.user_message(),
            )
        })?;

    Ok(Json(CheckoutResponse {
        url: session.checkout_url,
        session_id: session.id,
    }))
}

/// Stripe webhook handler
///
/// Once the signature checks out the event is always acknowledged, except
/// for activations naming an unknown user, which Stripe should redeliver.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookAck>, ApiError> {
    let stripe = state.stripe.as_ref().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "PAYMENTS_DISABLED",
            "Payments not configured",
        )
    })?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            api_error(
                StatusCode::BAD_REQUEST,
                "MISSING_SIGNATURE",
                "Missing Stripe signature",
            )
        })?;

    let event = match construct_event(&body, signature, stripe.webhook_secret()) {
        Ok(event) => event,
        Err(PaymentError::WebhookParse(e)) => {
            tracing::warn!("Webhook payload does not match schema: {}", e);
            return Ok(Json(WebhookAck {
                received: true,
                event_id: None,
                outcome: Some(Reconciliation::Ignored { reason: e }),
            }));
        }
        Err(e) => {
            tracing::warn!("Webhook signature failed: {}", e);
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "INVALID_SIGNATURE",
                "Invalid signature",
            ));
        }
    };

    tracing::info!(event_id = %event.id, event_type = %event.event_type, "Received Stripe webhook");

    match state.reconciler.reconcile(&event.event).await {
        Ok(outcome) => Ok(Json(WebhookAck {
            received: true,
            event_id: Some(event.id),
            outcome: Some(outcome),
        })),
        Err(e) if e.is_retryable() => {
            tracing::error!(event_id = %event.id, "Webhook processing error: {}", e);
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "WEBHOOK_ERROR",
                "Webhook processing failed",
            ))
        }
        Err(e) => {
            tracing::error!(event_id = %event.id, "Webhook processing error (acknowledged): {}", e);
            Ok(Json(WebhookAck {
                received: true,
                event_id: Some(event.id),
                outcome: None,
            }))
        }
    }
}
