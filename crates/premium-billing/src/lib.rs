//! # premium-billing
//!
//! Stripe billing for LottoMestre Premium: hosted checkout, webhook
//! verification, and reconciliation of subscription lifecycle events onto
//! the user's plan.
//!
//! ## Event flow
//!
//! ```text
//! ┌──────────┐  signed  ┌───────────────┐  BillingEvent  ┌────────────┐
//! │  Stripe  │─────────▶│ construct_    │───────────────▶│ Reconciler │
//! │ webhooks │          │ event (HMAC)  │                └─────┬──────┘
//! └──────────┘          └───────────────┘                      │
//!                         ┌──────────────┬─────────────────────┤
//!                         ▼              ▼                     ▼
//!                   ┌───────────┐  ┌───────────┐        ┌────────────┐
//!                   │ UserStore │  │ Customer  │        │  Notifier  │
//!                   │ (1 write) │  │ Directory │        │ (≤1 email) │
//!                   └───────────┘  └───────────┘        └────────────┘
//! ```
//!
//! | Stripe event                     | Effect on the user                        |
//! |----------------------------------|-------------------------------------------|
//! | `checkout.session.completed`     | `premium`, billing reference set, welcome |
//! | `customer.subscription.deleted`  | `free` if terminal, cancellation email    |
//! | `customer.subscription.updated`  | same, only when canceling at period end   |
//! | `customer.deleted`               | `free`, billing reference cleared         |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use premium_billing::{construct_event, Reconciler, StripeClient};
//!
//! let stripe = Arc::new(StripeClient::from_env()?);
//! let reconciler = Reconciler::new(store, stripe.clone(), notifier);
//!
//! let event = construct_event(&body, signature, stripe.webhook_secret())?;
//! let outcome = reconciler.reconcile(&event.event).await?;
//! ```

mod checkout;
mod directory;
mod error;
mod event;
mod notify;
mod reconciler;
mod signature;

pub use checkout::{CheckoutRequest, CheckoutSession, StripeClient};
pub use directory::{CustomerDirectory, EmptyDirectory};
pub use error::{PaymentError, Result};
pub use event::{Activation, BillingEvent, Removal, StripeEvent, Termination, decode_event};
pub use notify::{NoopNotifier, Notification, Notifier, RenderedEmail, Template, UNKNOWN_END_DATE};
pub use reconciler::{Reconciler, Reconciliation, Resolver};
pub use signature::{TOLERANCE_SECS, construct_event, signature_header, verify_signature};
