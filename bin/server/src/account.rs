//! Account deletion.
//!
//! The identity mapping entry is keyed by the issuer/subject stored on the
//! account, so it has to be removed before the account itself.

use forum_oidc_core::UserId;
use forum_oidc_identity::{IdentityResolver, UserDirectory};
use rootcause::Report;
use rootcause::prelude::ResultExt;
use std::fmt;
use tracing::{info, instrument};

use crate::session::SessionStore;

/// Errors from deleting an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    /// The identity mapping could not be cleaned up. The account was kept.
    Cleanup { user_id: UserId },
    /// The account could not be removed from the directory.
    Delete { user_id: UserId },
    /// The account's sessions could not be revoked.
    Sessions { user_id: UserId },
}

impl fmt::Display for AccountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cleanup { user_id } => {
                write!(f, "failed to clean up identity mapping of {user_id}")
            }
            Self::Delete { user_id } => write!(f, "failed to delete account {user_id}"),
            Self::Sessions { user_id } => write!(f, "failed to revoke sessions of {user_id}"),
        }
    }
}

impl std::error::Error for AccountError {}

/// Deletes an account along with its identity mapping and sessions.
#[instrument(skip(resolver, users, sessions))]
pub async fn delete_user(
    resolver: &IdentityResolver,
    users: &dyn UserDirectory,
    sessions: &dyn SessionStore,
    user_id: UserId,
) -> Result<(), Report<AccountError>> {
    resolver
        .forget_user(user_id)
        .await
        .context(AccountError::Cleanup { user_id })?;

    sessions
        .delete_all_for_user(user_id)
        .await
        .context(AccountError::Sessions { user_id })?;

    users
        .delete(user_id)
        .await
        .context(AccountError::Delete { user_id })?;

    info!("account deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MemorySessionStore, Session};
    use chrono::Duration;
    use forum_oidc_identity::{
        MemoryKeyValueStore, MemoryUserDirectory, ResolverConfig, VerifiedClaims,
    };
    use std::sync::Arc;

    #[tokio::test]
    async fn deleting_account_frees_identity_for_a_new_account() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let users = Arc::new(MemoryUserDirectory::new());
        let sessions = MemorySessionStore::new();
        let resolver = IdentityResolver::new(kv, users.clone());
        let claims = VerifiedClaims::new("https://idp.example", "abc")
            .with_preferred_username(Some("alice".to_string()));
        let config = ResolverConfig::default();

        let first = resolver.resolve(&claims, &config).await.unwrap();
        let session = Session::new(first.user_id, Duration::minutes(5));
        sessions.create(&session).await.unwrap();

        delete_user(&resolver, users.as_ref(), &sessions, first.user_id)
            .await
            .unwrap();

        assert!(users.get(first.user_id).await.unwrap().is_none());
        assert!(sessions.find(session.id()).await.unwrap().is_none());
        assert_eq!(
            resolver.mapping().get(&claims.fingerprint()).await.unwrap(),
            None
        );

        let second = resolver.resolve(&claims, &config).await.unwrap();
        assert_ne!(second.user_id, first.user_id);
        assert!(second.outcome.is_created());
    }

    #[tokio::test]
    async fn unknown_account_fails_cleanup() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let users = Arc::new(MemoryUserDirectory::new());
        let sessions = MemorySessionStore::new();
        let resolver = IdentityResolver::new(kv, users.clone());

        let err = delete_user(&resolver, users.as_ref(), &sessions, UserId::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to clean up identity mapping"));
    }
}
