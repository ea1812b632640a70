//! User Entitlement Model
//!
//! A single `users` row per account. `plan` and `billing_reference` are the
//! only fields that change after the account is created.

use serde::{Deserialize, Serialize};

/// Subscription plan tiers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Free,
    Premium,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Premium => "premium",
        }
    }

    pub fn is_premium(&self) -> bool {
        matches!(self, Plan::Premium)
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Identity-provider subject, immutable primary key
    pub id: String,

    /// Unique, used as the fallback lookup key
    pub email: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub picture: Option<String>,

    #[serde(default)]
    pub plan: Plan,

    /// Stripe customer id, absent until the first successful checkout
    #[serde(default, rename = "stripe_customer_id")]
    pub billing_reference: Option<String>,
}

impl User {
    /// Name to greet the user with, falling back to the mailbox name
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => self.email.split('@').next().unwrap_or(&self.email),
        }
    }
}

/// Fields known when an account is first created
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

impl NewUser {
    pub fn into_user(self) -> User {
        User {
            id: self.id,
            email: self.email,
            name: self.name,
            picture: self.picture,
            plan: Plan::Free,
            billing_reference: None,
        }
    }
}

/// What an entitlement write does to `billing_reference`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReferenceChange {
    Keep,
    Set(String),
    Clear,
}

/// Target state of a conditional entitlement write
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntitlementUpdate {
    plan: Plan,
    billing_reference: ReferenceChange,
}

impl EntitlementUpdate {
    /// Upgrade to premium. A premium entitlement always carries its billing reference.
    pub fn premium(billing_reference: impl Into<String>) -> Self {
        Self {
            plan: Plan::Premium,
            billing_reference: ReferenceChange::Set(billing_reference.into()),
        }
    }

    /// Back to free, billing reference retained for a later resubscription
    pub fn downgrade() -> Self {
        Self {
            plan: Plan::Free,
            billing_reference: ReferenceChange::Keep,
        }
    }

    /// Back to free and forget the billing identity
    pub fn detach() -> Self {
        Self {
            plan: Plan::Free,
            billing_reference: ReferenceChange::Clear,
        }
    }

    pub fn plan(&self) -> Plan {
        self.plan
    }

    pub fn billing_reference(&self) -> &ReferenceChange {
        &self.billing_reference
    }

    /// True when this update must not be written to `user`.
    ///
    /// A `Set` update is spent once the row carries its reference, whatever
    /// the plan: a termination keeps the reference, so a stale activation
    /// for the same customer arriving afterwards must not regrant premium.
    pub fn is_satisfied_by(&self, user: &User) -> bool {
        match &self.billing_reference {
            ReferenceChange::Set(reference) => {
                user.billing_reference.as_deref() == Some(reference.as_str())
            }
            ReferenceChange::Keep => user.plan == self.plan,
            ReferenceChange::Clear => user.plan == self.plan && user.billing_reference.is_none(),
        }
    }

    pub fn apply_to(&self, user: &mut User) {
        user.plan = self.plan;
        match &self.billing_reference {
            ReferenceChange::Keep => {}
            ReferenceChange::Set(reference) => user.billing_reference = Some(reference.clone()),
            ReferenceChange::Clear => user.billing_reference = None,
        }
    }
}
