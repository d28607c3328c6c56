//! Login sessions.
//!
//! A session is created once the callback has resolved the login to a
//! local account, and is all the server keeps about the login.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use forum_oidc_core::{SessionId, UserId};
use forum_oidc_identity::StoreError;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// An authenticated session for a local account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    user_id: UserId,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Session {
    /// Creates a session for the given user, valid for `duration`.
    #[must_use]
    pub fn new(user_id: UserId, duration: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            user_id,
            created_at: now,
            expires_at: now + duration,
        }
    }

    /// Reconstitutes a session from storage.
    #[must_use]
    pub fn with_all_fields(
        id: SessionId,
        user_id: UserId,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            created_at,
            expires_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Session persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: &Session) -> Result<(), Report<StoreError>>;

    async fn find(&self, id: SessionId) -> Result<Option<Session>, Report<StoreError>>;

    /// Deletes a session (logout). No-op if absent.
    async fn delete(&self, id: SessionId) -> Result<(), Report<StoreError>>;

    async fn delete_all_for_user(&self, user_id: UserId) -> Result<(), Report<StoreError>>;

    /// Deletes expired sessions and returns how many were removed.
    async fn delete_expired(&self) -> Result<u64, Report<StoreError>>;
}

/// Sessions held in process memory.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions, expired ones included.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: &Session) -> Result<(), Report<StoreError>> {
        self.sessions
            .write()
            .await
            .insert(session.id(), session.clone());
        Ok(())
    }

    async fn find(&self, id: SessionId) -> Result<Option<Session>, Report<StoreError>> {
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn delete(&self, id: SessionId) -> Result<(), Report<StoreError>> {
        self.sessions.write().await.remove(&id);
        Ok(())
    }

    async fn delete_all_for_user(&self, user_id: UserId) -> Result<(), Report<StoreError>> {
        self.sessions
            .write()
            .await
            .retain(|_, s| s.user_id() != user_id);
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64, Report<StoreError>> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired());
        Ok((before - sessions.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_expires_after_duration() {
        let session = Session::new(UserId::new(), Duration::minutes(30));
        assert!(!session.is_expired());
        assert_eq!(
            session.expires_at() - session.created_at(),
            Duration::minutes(30)
        );
    }

    #[test]
    fn session_in_the_past_is_expired() {
        let now = Utc::now();
        let session = Session::with_all_fields(
            SessionId::new(),
            UserId::new(),
            now - Duration::hours(2),
            now - Duration::hours(1),
        );
        assert!(session.is_expired());
    }

    #[tokio::test]
    async fn memory_store_roundtrip_and_delete() {
        let store = MemorySessionStore::new();
        let session = Session::new(UserId::new(), Duration::minutes(5));

        store.create(&session).await.unwrap();
        assert_eq!(store.find(session.id()).await.unwrap(), Some(session.clone()));

        store.delete(session.id()).await.unwrap();
        assert_eq!(store.find(session.id()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_store_drops_only_expired() {
        let store = MemorySessionStore::new();
        let now = Utc::now();
        let live = Session::new(UserId::new(), Duration::minutes(5));
        let stale = Session::with_all_fields(
            SessionId::new(),
            UserId::new(),
            now - Duration::hours(2),
            now - Duration::hours(1),
        );
        store.create(&live).await.unwrap();
        store.create(&stale).await.unwrap();

        assert_eq!(store.delete_expired().await.unwrap(), 1);
        assert!(store.find(live.id()).await.unwrap().is_some());
        assert!(store.find(stale.id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_deletes_all_for_user() {
        let store = MemorySessionStore::new();
        let user = UserId::new();
        let a = Session::new(user, Duration::minutes(5));
        let b = Session::new(user, Duration::minutes(5));
        let other = Session::new(UserId::new(), Duration::minutes(5));
        for s in [&a, &b, &other] {
            store.create(s).await.unwrap();
        }

        store.delete_all_for_user(user).await.unwrap();

        assert!(store.find(a.id()).await.unwrap().is_none());
        assert!(store.find(b.id()).await.unwrap().is_none());
        assert!(store.find(other.id()).await.unwrap().is_some());
    }
}
