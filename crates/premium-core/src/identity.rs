//! Identity Provider Strategy
//!
//! The browser extension hands the backend an OAuth bearer token; an
//! `IdentityProvider` exchanges it for the profile of the signed-in account.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::user::NewUser;

/// Profile returned by the identity provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable subject identifier, used as the user's primary key
    pub subject_id: String,

    pub email: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub picture: Option<String>,
}

impl From<Identity> for NewUser {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.subject_id,
            email: identity.email,
            name: identity.name,
            picture: identity.picture,
        }
    }
}

/// Identity provider trait (Strategy pattern)
///
/// Implement this for each login backend: Google, a static test provider, etc.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange a bearer credential for the account profile
    async fn identify(&self, credential: &str) -> Result<Identity>;

    /// Provider name
    fn name(&self) -> &str;
}
