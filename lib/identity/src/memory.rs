//! In-process backends for the host collaborator traits.
//!
//! Used by tests and by the server when no database is configured. State
//! is lost on restart.

use crate::claims::normalize_email;
use crate::error::{DirectoryError, StoreError};
use crate::store::KeyValueStore;
use crate::user::{LocalUser, NewUser, OidcLink, UserDirectory};
use async_trait::async_trait;
use forum_oidc_core::UserId;
use rootcause::Report;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tokio::sync::RwLock;

/// Object-field store backed by nested hash maps.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    objects: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl MemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get_field(
        &self,
        key: &str,
        field: &str,
    ) -> Result<Option<String>, Report<StoreError>> {
        let objects = self.objects.read().await;
        Ok(objects.get(key).and_then(|o| o.get(field)).cloned())
    }

    async fn set_field(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<(), Report<StoreError>> {
        let mut objects = self.objects.write().await;
        objects
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn set_field_if_absent(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<String>, Report<StoreError>> {
        let mut objects = self.objects.write().await;
        match objects.entry(key.to_string()).or_default().entry(field.to_string()) {
            Entry::Occupied(existing) => Ok(Some(existing.get().clone())),
            Entry::Vacant(slot) => {
                slot.insert(value.to_string());
                Ok(None)
            }
        }
    }

    async fn delete_field(&self, key: &str, field: &str) -> Result<(), Report<StoreError>> {
        let mut objects = self.objects.write().await;
        if let Some(object) = objects.get_mut(key) {
            object.remove(field);
            if object.is_empty() {
                objects.remove(key);
            }
        }
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<HashMap<String, String>, Report<StoreError>> {
        let objects = self.objects.read().await;
        Ok(objects.get(key).cloned().unwrap_or_default())
    }
}

/// User directory enforcing unique usernames.
///
/// Emails are not unique; email lookups return the oldest matching account.
#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<UserId, LocalUser>>,
}

impl MemoryUserDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accounts.
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }

    /// Inserts a pre-built record, as a host would for accounts that
    /// predate OIDC login.
    pub async fn insert(&self, user: LocalUser) {
        self.users.write().await.insert(user.id(), user);
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn create(&self, user: NewUser) -> Result<UserId, Report<DirectoryError>> {
        let mut users = self.users.write().await;

        if users.values().any(|u| u.username() == user.username) {
            return Err(DirectoryError::UsernameTaken {
                username: user.username,
            }
            .into());
        }
        let record = LocalUser::new(user.username, user.email);
        let id = record.id();
        users.insert(id, record);
        Ok(id)
    }

    async fn get(&self, id: UserId) -> Result<Option<LocalUser>, Report<DirectoryError>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserId>, Report<DirectoryError>> {
        let wanted = normalize_email(email);
        let users = self.users.read().await;
        Ok(users
            .values()
            .filter(|u| u.email().is_some_and(|e| normalize_email(e) == wanted))
            .min_by_key(|u| (u.created_at(), u.id()))
            .map(LocalUser::id))
    }

    async fn set_oidc_link(
        &self,
        id: UserId,
        link: &OidcLink,
    ) -> Result<(), Report<DirectoryError>> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&id)
            .ok_or(DirectoryError::NotFound { user_id: id })?;
        user.set_oidc(Some(link.clone()));
        Ok(())
    }

    async fn oidc_link(&self, id: UserId) -> Result<Option<OidcLink>, Report<DirectoryError>> {
        let users = self.users.read().await;
        let user = users
            .get(&id)
            .ok_or(DirectoryError::NotFound { user_id: id })?;
        Ok(user.oidc().cloned())
    }

    async fn delete(&self, id: UserId) -> Result<(), Report<DirectoryError>> {
        self.users.write().await.remove(&id);
        Ok(())
    }
}
