//! Entitlement Reconciler
//!
//! Maps one verified billing event onto at most one conditional write of a
//! user's entitlement, followed by at most one email.
//!
//! Every path except "activation names an unknown user" is acknowledged:
//! redelivering an event cannot fix a missing reference or a store outage,
//! so those outcomes are surfaced through logs only.

use serde::Serialize;
use std::sync::Arc;

use premium_core::{EntitlementUpdate, User, UserStore};

use crate::directory::CustomerDirectory;
use crate::error::{PaymentError, Result};
use crate::event::{Activation, BillingEvent, Removal, Termination};
use crate::notify::{Notification, Notifier, Template};

/// What handling an event did
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Reconciliation {
    /// User moved to premium
    Activated { user_id: String },

    /// User moved to free, billing reference kept
    Downgraded { user_id: String },

    /// User moved to free and billing reference cleared
    Detached { user_id: String },

    /// User already in the target state (redelivery)
    Unchanged { user_id: String },

    /// Nothing to do: malformed, non-terminal, or unhandled event
    Ignored { reason: String },

    /// No user matched any lookup strategy
    Unresolved { reason: String },

    /// Store unavailable or write rejected
    StoreFailure { reason: String },
}

impl Reconciliation {
    /// Whether a user row was written
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Reconciliation::Activated { .. }
                | Reconciliation::Downgraded { .. }
                | Reconciliation::Detached { .. }
        )
    }
}

/// Ways to find the user behind a billing reference, tried in order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolver {
    ByBillingReference,
    ByCustomerEmail,
}

impl Resolver {
    pub const CHAIN: [Resolver; 2] = [Resolver::ByBillingReference, Resolver::ByCustomerEmail];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resolver::ByBillingReference => "billing_reference",
            Resolver::ByCustomerEmail => "customer_email",
        }
    }
}

enum Resolution {
    Found(User, Resolver),
    NotFound,
    StoreUnavailable(String),
}

/// Entitlement reconciler
pub struct Reconciler {
    store: Arc<dyn UserStore>,
    directory: Arc<dyn CustomerDirectory>,
    notifier: Arc<dyn Notifier>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn UserStore>,
        directory: Arc<dyn CustomerDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
        }
    }

    /// Apply one verified event.
    ///
    /// Returns `Err(PaymentError::UserNotFound)` only when an activation's
    /// client reference names no user; every other failure is an `Ok` outcome.
    pub async fn reconcile(&self, event: &BillingEvent) -> Result<Reconciliation> {
        let outcome = match event {
            BillingEvent::SubscriptionActivated(activation) => self.activate(activation).await?,
            BillingEvent::SubscriptionTerminated(termination) => self.terminate(termination).await,
            BillingEvent::CustomerRemoved(removal) => self.remove(removal).await,
            BillingEvent::Other { event_type } => {
                tracing::debug!(event_type = %event_type, "Unhandled webhook event");
                Reconciliation::Ignored {
                    reason: format!("unhandled event type {event_type}"),
                }
            }
        };

        tracing::info!(kind = event.kind(), outcome = ?outcome, "Reconciled billing event");
        Ok(outcome)
    }

    async fn activate(&self, activation: &Activation) -> Result<Reconciliation> {
        let Some(user_id) = activation.client_reference.as_deref() else {
            tracing::warn!(
                session_id = %activation.session_id,
                email = ?activation.customer_email,
                "Checkout completed without client_reference_id - not attributing"
            );
            return Ok(Reconciliation::Ignored {
                reason: "activation without client reference".into(),
            });
        };

        let Some(billing_reference) = activation.billing_reference.as_deref() else {
            tracing::warn!(
                session_id = %activation.session_id,
                user_id = %user_id,
                "Checkout completed without a customer - cannot grant premium"
            );
            return Ok(Reconciliation::Ignored {
                reason: "activation without billing reference".into(),
            });
        };

        let user = match self.store.get(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::error!(
                    critical = true,
                    session_id = %activation.session_id,
                    user_id = %user_id,
                    "Activation references an unknown user"
                );
                return Err(PaymentError::UserNotFound(user_id.to_string()));
            }
            Err(e) => {
                tracing::error!(
                    critical = true,
                    user_id = %user_id,
                    error = %e,
                    "User store unavailable during activation"
                );
                return Ok(Reconciliation::StoreFailure {
                    reason: e.to_string(),
                });
            }
        };

        let update = EntitlementUpdate::premium(billing_reference);
        Ok(self
            .write(
                &user,
                &update,
                Reconciliation::Activated { user_id: user.id.clone() },
                Some(Template::WelcomePremium),
            )
            .await)
    }

    async fn terminate(&self, termination: &Termination) -> Reconciliation {
        if !termination.is_terminal() {
            tracing::debug!(
                subscription_id = %termination.subscription_id,
                status = %termination.status,
                "Subscription change is not terminal"
            );
            return Reconciliation::Ignored {
                reason: format!("subscription status {} is not terminal", termination.status),
            };
        }

        let user = match self.resolve(&termination.billing_reference, None).await {
            Resolution::Found(user, _) => user,
            Resolution::NotFound => {
                return unresolved(&termination.billing_reference, "subscription_terminated");
            }
            Resolution::StoreUnavailable(reason) => {
                return store_unavailable(&termination.billing_reference, reason);
            }
        };

        let template = Template::Cancellation {
            period_end: termination.cycle_end(),
        };
        self.write(
            &user,
            &EntitlementUpdate::downgrade(),
            Reconciliation::Downgraded { user_id: user.id.clone() },
            Some(template),
        )
        .await
    }

    async fn remove(&self, removal: &Removal) -> Reconciliation {
        let user = match self
            .resolve(&removal.billing_reference, removal.email.as_deref())
            .await
        {
            Resolution::Found(user, Resolver::ByCustomerEmail)
                if user
                    .billing_reference
                    .as_deref()
                    .is_some_and(|own| own != removal.billing_reference) =>
            {
                tracing::error!(
                    critical = true,
                    user_id = %user.id,
                    billing_reference = %removal.billing_reference,
                    user_billing_reference = ?user.billing_reference,
                    "Removed customer matched by email holds another billing reference - not detaching"
                );
                return Reconciliation::Unresolved {
                    reason: format!(
                        "user {} is billed under another customer than {}",
                        user.id, removal.billing_reference
                    ),
                };
            }
            Resolution::Found(user, _) => user,
            Resolution::NotFound => {
                return unresolved(&removal.billing_reference, "customer_removed");
            }
            Resolution::StoreUnavailable(reason) => {
                return store_unavailable(&removal.billing_reference, reason);
            }
        };

        self.write(
            &user,
            &EntitlementUpdate::detach(),
            Reconciliation::Detached { user_id: user.id.clone() },
            None,
        )
        .await
    }

    /// Conditional write, then notify only if the row actually changed
    async fn write(
        &self,
        user: &User,
        update: &EntitlementUpdate,
        changed: Reconciliation,
        template: Option<Template>,
    ) -> Reconciliation {
        match self.store.update_entitlement(&user.id, update).await {
            Ok(Some(updated)) => {
                tracing::info!(
                    user_id = %updated.id,
                    email = %updated.email,
                    plan = %updated.plan,
                    billing_reference = ?updated.billing_reference,
                    "Entitlement updated"
                );
                if let Some(template) = template {
                    self.notify(&updated, template).await;
                }
                changed
            }
            Ok(None) => {
                tracing::info!(
                    user_id = %user.id,
                    plan = %update.plan(),
                    "Entitlement already applied - skipping"
                );
                Reconciliation::Unchanged {
                    user_id: user.id.clone(),
                }
            }
            Err(e) => {
                tracing::error!(
                    critical = true,
                    user_id = %user.id,
                    error = %e,
                    "Entitlement write failed"
                );
                Reconciliation::StoreFailure {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn notify(&self, user: &User, template: Template) {
        let notification = Notification {
            to_email: user.email.clone(),
            to_name: user.display_name().to_string(),
            template,
        };

        if let Err(e) = self.notifier.send(&notification).await {
            tracing::error!(
                user_id = %user.id,
                template = notification.template.id(),
                notifier = self.notifier.name(),
                error = %e,
                "Failed to send notification"
            );
        }
    }

    /// Walk `Resolver::CHAIN`, stopping at the first hit
    async fn resolve(&self, billing_reference: &str, email_hint: Option<&str>) -> Resolution {
        let mut store_error = None;

        for resolver in Resolver::CHAIN {
            match self.try_resolver(resolver, billing_reference, email_hint).await {
                Ok(Some(user)) => {
                    tracing::debug!(
                        user_id = %user.id,
                        resolver = resolver.as_str(),
                        "Resolved user"
                    );
                    return Resolution::Found(user, resolver);
                }
                Ok(None) => {
                    tracing::debug!(
                        billing_reference = %billing_reference,
                        resolver = resolver.as_str(),
                        "No user matched"
                    );
                }
                Err(PaymentError::Store(e)) => {
                    tracing::warn!(resolver = resolver.as_str(), error = %e, "Store lookup failed");
                    store_error = Some(e.to_string());
                }
                Err(e) => {
                    tracing::warn!(resolver = resolver.as_str(), error = %e, "Lookup failed");
                }
            }
        }

        store_error.map_or(Resolution::NotFound, Resolution::StoreUnavailable)
    }

    async fn try_resolver(
        &self,
        resolver: Resolver,
        billing_reference: &str,
        email_hint: Option<&str>,
    ) -> Result<Option<User>> {
        match resolver {
            Resolver::ByBillingReference => Ok(self
                .store
                .find_by_billing_reference(billing_reference)
                .await?),
            Resolver::ByCustomerEmail => {
                let email = match email_hint {
                    Some(email) => Some(email.to_string()),
                    None => self.directory.customer_email(billing_reference).await?,
                };
                match email {
                    Some(email) => Ok(self.store.find_by_email(&email).await?),
                    None => Ok(None),
                }
            }
        }
    }
}

fn unresolved(billing_reference: &str, kind: &str) -> Reconciliation {
    tracing::error!(
        critical = true,
        billing_reference = %billing_reference,
        kind,
        "No user matches billing reference or customer email - manual follow-up required"
    );
    Reconciliation::Unresolved {
        reason: format!("no user for billing reference {billing_reference}"),
    }
}

fn store_unavailable(billing_reference: &str, reason: String) -> Reconciliation {
    tracing::error!(
        critical = true,
        billing_reference = %billing_reference,
        error = %reason,
        "User store unavailable - reconciliation skipped"
    );
    Reconciliation::StoreFailure { reason }
}
