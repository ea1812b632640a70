//! Billing Events
//!
//! Stripe delivers `{ id, type, data: { object } }`. Only the three event
//! families that move an entitlement are decoded, each into a variant with an
//! explicit field set. A known event type whose object does not match its
//! schema is rejected instead of being read field by field.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{PaymentError, Result};

/// A decoded Stripe event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StripeEvent {
    /// Stripe event id (`evt_...`)
    pub id: String,

    /// Raw Stripe type, e.g. `checkout.session.completed`
    pub event_type: String,

    pub event: BillingEvent,
}

/// Entitlement-relevant billing lifecycle events
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BillingEvent {
    /// Checkout completed - a paying subscription exists
    SubscriptionActivated(Activation),

    /// Subscription deleted or updated - terminal only if the status says so
    SubscriptionTerminated(Termination),

    /// The Stripe customer itself was deleted
    CustomerRemoved(Removal),

    /// Unhandled event type
    Other { event_type: String },
}

impl BillingEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            BillingEvent::SubscriptionActivated(_) => "subscription_activated",
            BillingEvent::SubscriptionTerminated(_) => "subscription_terminated",
            BillingEvent::CustomerRemoved(_) => "customer_removed",
            BillingEvent::Other { .. } => "other",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Activation {
    pub session_id: String,

    /// `client_reference_id` set at checkout: the local user id
    pub client_reference: Option<String>,

    /// Stripe customer id
    pub billing_reference: Option<String>,

    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Termination {
    pub subscription_id: String,
    pub billing_reference: String,
    pub status: String,
    pub cancel_at_period_end: bool,
    pub ended_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
}

impl Termination {
    /// Canceled, ended, or scheduled to cancel at period end
    pub fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "canceled" | "ended") || self.cancel_at_period_end
    }

    /// Last day of paid access, if Stripe told us
    pub fn cycle_end(&self) -> Option<DateTime<Utc>> {
        if self.cancel_at_period_end {
            self.current_period_end.or(self.ended_at).or(self.canceled_at)
        } else {
            self.ended_at.or(self.canceled_at).or(self.current_period_end)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Removal {
    pub billing_reference: String,

    /// Email on the deleted customer object, when Stripe still includes it
    pub email: Option<String>,
}

// ============================================================================
// Wire schema
// ============================================================================

#[derive(Deserialize)]
struct Envelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: EnvelopeData,
}

#[derive(Deserialize)]
struct EnvelopeData {
    object: serde_json::Value,
}

/// A Stripe reference that may arrive expanded
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum IdOrObject {
    Id(String),
    Object { id: String },
}

impl IdOrObject {
    fn into_id(self) -> String {
        match self {
            IdOrObject::Id(id) | IdOrObject::Object { id } => id,
        }
    }
}

#[derive(Deserialize)]
struct CheckoutSessionObject {
    id: String,
    #[serde(default)]
    client_reference_id: Option<String>,
    #[serde(default)]
    customer: Option<IdOrObject>,
    #[serde(default)]
    customer_email: Option<String>,
    #[serde(default)]
    customer_details: Option<CustomerDetails>,
}

#[derive(Deserialize)]
struct CustomerDetails {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct SubscriptionObject {
    id: String,
    customer: IdOrObject,
    status: String,
    #[serde(default)]
    cancel_at_period_end: bool,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    ended_at: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    canceled_at: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    current_period_end: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct CustomerObject {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn object<T: serde::de::DeserializeOwned>(event_type: &str, value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| PaymentError::WebhookParse(format!("{event_type}: {e}")))
}

/// Decode a raw (already verified) Stripe event payload
pub fn decode_event(payload: &str) -> Result<StripeEvent> {
    let envelope: Envelope =
        serde_json::from_str(payload).map_err(|e| PaymentError::WebhookParse(e.to_string()))?;
    let object_value = envelope.data.object;

    let event = match envelope.event_type.as_str() {
        "checkout.session.completed" => {
            let session: CheckoutSessionObject = object(&envelope.event_type, object_value)?;
            let details = session.customer_details;
            let (detail_email, detail_name) = details
                .map(|d| (d.email, d.name))
                .unwrap_or_default();

            BillingEvent::SubscriptionActivated(Activation {
                session_id: session.id,
                client_reference: non_blank(session.client_reference_id),
                billing_reference: non_blank(session.customer.map(IdOrObject::into_id)),
                customer_email: non_blank(detail_email).or(non_blank(session.customer_email)),
                customer_name: non_blank(detail_name),
            })
        }

        "customer.subscription.deleted" | "customer.subscription.updated" => {
            let sub: SubscriptionObject = object(&envelope.event_type, object_value)?;
            BillingEvent::SubscriptionTerminated(Termination {
                subscription_id: sub.id,
                billing_reference: sub.customer.into_id(),
                status: sub.status,
                cancel_at_period_end: sub.cancel_at_period_end,
                ended_at: sub.ended_at,
                canceled_at: sub.canceled_at,
                current_period_end: sub.current_period_end,
            })
        }

        "customer.deleted" => {
            let customer: CustomerObject = object(&envelope.event_type, object_value)?;
            BillingEvent::CustomerRemoved(Removal {
                billing_reference: customer.id,
                email: non_blank(customer.email),
            })
        }

        other => BillingEvent::Other {
            event_type: other.to_string(),
        },
    };

    Ok(StripeEvent {
        id: envelope.id,
        event_type: envelope.event_type,
        event,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(event_type: &str, object: serde_json::Value) -> String {
        json!({
            "id": "evt_1",
            "object": "event",
            "type": event_type,
            "data": { "object": object }
        })
        .to_string()
    }

    #[test]
    fn test_checkout_completed() {
        let raw = payload(
            "checkout.session.completed",
            json!({
                "id": "cs_1",
                "object": "checkout.session",
                "client_reference_id": "u1",
                "customer": "cus_1",
                "customer_details": { "email": "maria@example.com", "name": "Maria" }
            }),
        );
        let decoded = decode_event(&raw).unwrap();
        assert_eq!(decoded.id, "evt_1");
        let BillingEvent::SubscriptionActivated(activation) = decoded.event else {
            panic!("expected activation");
        };
        assert_eq!(activation.client_reference.as_deref(), Some("u1"));
        assert_eq!(activation.billing_reference.as_deref(), Some("cus_1"));
        assert_eq!(activation.customer_email.as_deref(), Some("maria@example.com"));
    }

    #[test]
    fn test_blank_client_reference_is_absent() {
        let raw = payload(
            "checkout.session.completed",
            json!({ "id": "cs_1", "client_reference_id": "  ", "customer": { "id": "cus_1" } }),
        );
        let BillingEvent::SubscriptionActivated(activation) = decode_event(&raw).unwrap().event
        else {
            panic!("expected activation");
        };
        assert_eq!(activation.client_reference, None);
        assert_eq!(activation.billing_reference.as_deref(), Some("cus_1"));
    }

    #[test]
    fn test_subscription_deleted() {
        let raw = payload(
            "customer.subscription.deleted",
            json!({
                "id": "sub_1",
                "customer": "cus_1",
                "status": "canceled",
                "cancel_at_period_end": false,
                "canceled_at": 1_712_000_000,
                "ended_at": null
            }),
        );
        let BillingEvent::SubscriptionTerminated(t) = decode_event(&raw).unwrap().event else {
            panic!("expected termination");
        };
        assert!(t.is_terminal());
        assert_eq!(t.billing_reference, "cus_1");
        assert_eq!(t.cycle_end().map(|d| d.timestamp()), Some(1_712_000_000));
    }

    #[test]
    fn test_active_update_is_not_terminal() {
        let raw = payload(
            "customer.subscription.updated",
            json!({ "id": "sub_1", "customer": "cus_1", "status": "trialing" }),
        );
        let BillingEvent::SubscriptionTerminated(t) = decode_event(&raw).unwrap().event else {
            panic!("expected termination");
        };
        assert!(!t.is_terminal());
    }

    #[test]
    fn test_period_end_cancellation_uses_period_end() {
        let raw = payload(
            "customer.subscription.updated",
            json!({
                "id": "sub_1",
                "customer": "cus_1",
                "status": "active",
                "cancel_at_period_end": true,
                "canceled_at": 1_712_000_000,
                "current_period_end": 1_714_000_000
            }),
        );
        let BillingEvent::SubscriptionTerminated(t) = decode_event(&raw).unwrap().event else {
            panic!("expected termination");
        };
        assert!(t.is_terminal());
        assert_eq!(t.cycle_end().map(|d| d.timestamp()), Some(1_714_000_000));
    }

    #[test]
    fn test_customer_deleted() {
        let raw = payload(
            "customer.deleted",
            json!({ "id": "cus_1", "email": "maria@example.com", "deleted": true }),
        );
        let decoded = decode_event(&raw).unwrap();
        assert_eq!(decoded.event.kind(), "customer_removed");
        assert_eq!(
            decoded.event,
            BillingEvent::CustomerRemoved(Removal {
                billing_reference: "cus_1".into(),
                email: Some("maria@example.com".into()),
            })
        );
    }

    #[test]
    fn test_schema_mismatch_rejected() {
        let raw = payload("customer.subscription.deleted", json!({ "id": "sub_1" }));
        assert!(matches!(decode_event(&raw), Err(PaymentError::WebhookParse(_))));
    }

    #[test]
    fn test_unhandled_type() {
        let raw = payload("invoice.paid", json!({ "id": "in_1" }));
        assert_eq!(
            decode_event(&raw).unwrap().event,
            BillingEvent::Other { event_type: "invoice.paid".into() }
        );
    }
}
