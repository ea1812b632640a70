//! # premium-runtime
//!
//! Concrete collaborators for the premium backend, all spoken over HTTP
//! with `reqwest`.
//!
//! ## Providers
//!
//! - **Supabase** (default): `users` table through PostgREST
//! - **Resend** (default): transactional email
//! - **Google** (default): OAuth userinfo as the identity provider
//!
//! ## Usage
//!
//! ```rust,ignore
//! use premium_runtime::{GoogleIdentityProvider, ResendNotifier, SupabaseUserStore};
//!
//! let store = Arc::new(SupabaseUserStore::from_env()?);
//! let notifier = Arc::new(ResendNotifier::from_env()?);
//! let identity = Arc::new(GoogleIdentityProvider::google()?);
//! ```

#[cfg(feature = "supabase")]
pub mod supabase;

#[cfg(feature = "resend")]
pub mod resend;

#[cfg(feature = "google")]
pub mod google;

#[cfg(feature = "supabase")]
pub use supabase::{SupabaseConfig, SupabaseUserStore};

#[cfg(feature = "resend")]
pub use resend::{ResendConfig, ResendNotifier};

#[cfg(feature = "google")]
pub use google::GoogleIdentityProvider;

// Re-export core types for convenience
pub use premium_core::{CoreError, Identity, IdentityProvider, User, UserStore};
