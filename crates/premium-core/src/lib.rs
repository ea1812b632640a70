//! # premium-core
//!
//! User entitlement model shared by every LottoMestre premium handler.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       premium-server                          │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐  │
//! │  │  Reconciler  │──▶│  UserStore   │◀──│ IdentityProvider │  │
//! │  │  (billing)   │   │  (Strategy)  │   │   (Strategy)     │  │
//! │  └──────────────┘   └──────────────┘   └──────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The collaborator traits let the server swap Supabase, Google, or the
//! in-memory implementations without touching the handlers.

pub mod error;
pub mod identity;
pub mod store;
pub mod user;

pub use error::{CoreError, Result};
pub use identity::{Identity, IdentityProvider};
pub use store::{MemoryUserStore, UserStore};
pub use user::{EntitlementUpdate, NewUser, Plan, ReferenceChange, User};
