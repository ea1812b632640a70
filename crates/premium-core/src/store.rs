//! User Storage
//!
//! `UserStore` is the only path through which a user row is read or
//! mutated. Entitlement writes are conditional: a store reports a change
//! only when the row was not already in the requested state, which is what
//! makes redelivered billing events harmless.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{CoreError, Result};
use crate::user::{EntitlementUpdate, NewUser, ReferenceChange, User};

/// User storage trait
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Point lookup by primary key
    async fn get(&self, id: &str) -> Result<Option<User>>;

    /// Point lookup by email
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Point lookup by billing reference
    async fn find_by_billing_reference(&self, reference: &str) -> Result<Option<User>>;

    /// Conditional update keyed by `id`.
    ///
    /// Returns the updated row when something changed, `None` when the row
    /// already satisfied `update` (or no longer exists).
    async fn update_entitlement(&self, id: &str, update: &EntitlementUpdate)
        -> Result<Option<User>>;

    /// Insert a free user unless `id` already exists; returns the stored row
    async fn create_if_absent(&self, new_user: NewUser) -> Result<User>;
}

/// In-memory user store (for development and tests)
pub struct MemoryUserStore {
    inner: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    by_billing_reference: HashMap<String, String>,
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Tables::default()),
        }
    }

    /// Seed a fully-formed row, replacing any row with the same id
    pub async fn insert(&self, user: User) -> Result<()> {
        let mut tables = self.inner.write().await;
        if let Some(reference) = &user.billing_reference {
            if let Some(owner) = tables.by_billing_reference.get(reference) {
                if owner != &user.id {
                    return Err(CoreError::Conflict(format!(
                        "billing reference {reference} already belongs to {owner}"
                    )));
                }
            }
        }
        if let Some(previous) = tables.users.remove(&user.id) {
            if let Some(reference) = previous.billing_reference {
                tables.by_billing_reference.remove(&reference);
            }
        }
        if let Some(reference) = &user.billing_reference {
            tables
                .by_billing_reference
                .insert(reference.clone(), user.id.clone());
        }
        tables.users.insert(user.id.clone(), user);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get(&self, id: &str) -> Result<Option<User>> {
        Ok(self.inner.read().await.users.get(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let tables = self.inner.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_billing_reference(&self, reference: &str) -> Result<Option<User>> {
        let tables = self.inner.read().await;
        Ok(tables
            .by_billing_reference
            .get(reference)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn update_entitlement(
        &self,
        id: &str,
        update: &EntitlementUpdate,
    ) -> Result<Option<User>> {
        let mut tables = self.inner.write().await;

        let Some(current) = tables.users.get(id).cloned() else {
            return Ok(None);
        };
        if update.is_satisfied_by(&current) {
            return Ok(None);
        }

        if let ReferenceChange::Set(reference) = update.billing_reference() {
            if let Some(owner) = tables.by_billing_reference.get(reference) {
                if owner != id {
                    return Err(CoreError::Conflict(format!(
                        "billing reference {reference} already belongs to {owner}"
                    )));
                }
            }
        }

        let mut updated = current.clone();
        update.apply_to(&mut updated);

        if let Some(old) = &current.billing_reference {
            if updated.billing_reference.as_ref() != Some(old) {
                tables.by_billing_reference.remove(old);
            }
        }
        if let Some(reference) = &updated.billing_reference {
            tables
                .by_billing_reference
                .insert(reference.clone(), id.to_string());
        }
        tables.users.insert(id.to_string(), updated.clone());

        tracing::debug!(user_id = %id, plan = %updated.plan, "Entitlement written");
        Ok(Some(updated))
    }

    async fn create_if_absent(&self, new_user: NewUser) -> Result<User> {
        let mut tables = self.inner.write().await;
        if let Some(existing) = tables.users.get(&new_user.id) {
            return Ok(existing.clone());
        }
        let user = new_user.into_user();
        tables.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::Plan;

    fn new_user(id: &str, email: &str) -> NewUser {
        NewUser {
            id: id.into(),
            email: email.into(),
            name: Some("Maria".into()),
            picture: None,
        }
    }

    #[tokio::test]
    async fn test_create_if_absent_defaults_to_free() {
        let store = MemoryUserStore::new();
        let user = store.create_if_absent(new_user("u1", "a@example.com")).await.unwrap();
        assert_eq!(user.plan, Plan::Free);
        assert_eq!(user.billing_reference, None);

        store
            .update_entitlement("u1", &EntitlementUpdate::premium("cus_1"))
            .await
            .unwrap();
        let again = store.create_if_absent(new_user("u1", "a@example.com")).await.unwrap();
        assert_eq!(again.plan, Plan::Premium);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_conditional_update_reports_change_once() {
        let store = MemoryUserStore::new();
        store.create_if_absent(new_user("u1", "a@example.com")).await.unwrap();

        let update = EntitlementUpdate::premium("cus_1");
        assert!(store.update_entitlement("u1", &update).await.unwrap().is_some());
        assert!(store.update_entitlement("u1", &update).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_billing_reference_index_follows_writes() {
        let store = MemoryUserStore::new();
        store.create_if_absent(new_user("u1", "a@example.com")).await.unwrap();
        store
            .update_entitlement("u1", &EntitlementUpdate::premium("cus_1"))
            .await
            .unwrap();
        assert_eq!(
            store.find_by_billing_reference("cus_1").await.unwrap().map(|u| u.id),
            Some("u1".to_string())
        );

        store
            .update_entitlement("u1", &EntitlementUpdate::detach())
            .await
            .unwrap();
        assert!(store.find_by_billing_reference("cus_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reference_is_unique_across_users() {
        let store = MemoryUserStore::new();
        store.create_if_absent(new_user("u1", "a@example.com")).await.unwrap();
        store.create_if_absent(new_user("u2", "b@example.com")).await.unwrap();
        store
            .update_entitlement("u1", &EntitlementUpdate::premium("cus_1"))
            .await
            .unwrap();

        let err = store
            .update_entitlement("u2", &EntitlementUpdate::premium("cus_1"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_email_lookup_ignores_case() {
        let store = MemoryUserStore::new();
        store.create_if_absent(new_user("u1", "Maria@Example.com")).await.unwrap();
        assert!(store.find_by_email("maria@example.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_missing_user_is_none() {
        let store = MemoryUserStore::new();
        let result = store
            .update_entitlement("ghost", &EntitlementUpdate::downgrade())
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
