//! Stripe Webhook Signatures
//!
//! Header format: `Stripe-Signature: t=1712000000,v1=<hex>,v1=<hex>`. The
//! signed payload is `"{t}.{raw body}"` under HMAC-SHA256 with the endpoint
//! secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{PaymentError, Result};
use crate::event::{StripeEvent, decode_event};

type HmacSha256 = Hmac<Sha256>;

/// Maximum clock skew accepted between Stripe and this server
pub const TOLERANCE_SECS: i64 = 300;

/// Verify a `Stripe-Signature` header against the raw request body
pub fn verify_signature(payload: &[u8], header: &str, secret: &str, now: i64) -> Result<()> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse::<i64>().ok(),
            "v1" => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| PaymentError::WebhookSignature("missing timestamp".into()))?;
    if signatures.is_empty() {
        return Err(PaymentError::WebhookSignature("no v1 signature".into()));
    }
    if (now - timestamp).abs() > TOLERANCE_SECS {
        return Err(PaymentError::WebhookSignature(format!(
            "timestamp {timestamp} outside tolerance"
        )));
    }

    for signature in signatures {
        let Ok(expected) = hex::decode(signature) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| PaymentError::WebhookSignature(e.to_string()))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }

    Err(PaymentError::WebhookSignature("no matching signature".into()))
}

/// Build a `Stripe-Signature` header for `payload`, as Stripe would.
///
/// Used to replay captured events locally and in tests.
pub fn signature_header(payload: &[u8], secret: &str, timestamp: i64) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::WebhookSignature(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Verify the signature, then decode the event
pub fn construct_event(payload: &str, header: &str, secret: &str) -> Result<StripeEvent> {
    verify_signature(
        payload.as_bytes(),
        header,
        secret,
        chrono::Utc::now().timestamp(),
    )?;
    decode_event(payload)
}
