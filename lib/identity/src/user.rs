//! Local user records and the user directory contract.
//!
//! The host owns user records; this crate only reads and writes the
//! fields it needs. The OIDC issuer and subject stored on a user are for
//! display and audit. Lookups always go through the identity mapping.

use crate::error::DirectoryError;
use crate::fingerprint::Fingerprint;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use forum_oidc_core::UserId;
use rootcause::Report;
use serde::{Deserialize, Serialize};

/// The provider identity an account was linked with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcLink {
    pub issuer: String,
    pub subject: String,
}

impl OidcLink {
    #[must_use]
    pub fn new(issuer: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            subject: subject.into(),
        }
    }

    /// Recomputes the mapping key for this link.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::compute(&self.issuer, &self.subject)
    }
}

/// Request to create a local account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    /// Already normalized.
    pub email: Option<String>,
}

/// A local forum account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalUser {
    id: UserId,
    username: String,
    email: Option<String>,
    oidc: Option<OidcLink>,
    created_at: DateTime<Utc>,
}

impl LocalUser {
    /// Creates a record for a new account with a generated ID.
    #[must_use]
    pub fn new(username: String, email: Option<String>) -> Self {
        Self {
            id: UserId::new(),
            username,
            email,
            oidc: None,
            created_at: Utc::now(),
        }
    }

    /// Reconstitutes a record from storage.
    #[must_use]
    pub fn with_all_fields(
        id: UserId,
        username: String,
        email: Option<String>,
        oidc: Option<OidcLink>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            username,
            email,
            oidc,
            created_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> UserId {
        self.id
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// The provider identity last linked to this account, if any.
    #[must_use]
    pub fn oidc(&self) -> Option<&OidcLink> {
        self.oidc.as_ref()
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn set_oidc(&mut self, link: Option<OidcLink>) {
        self.oidc = link;
    }
}

/// Host user store.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Creates an account and returns its ID.
    ///
    /// # Errors
    ///
    /// `UsernameTaken` when the host's uniqueness rules reject the request.
    async fn create(&self, user: NewUser) -> Result<UserId, Report<DirectoryError>>;

    async fn get(&self, id: UserId) -> Result<Option<LocalUser>, Report<DirectoryError>>;

    /// Finds an account by normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserId>, Report<DirectoryError>>;

    /// Records the linked issuer/subject on an account.
    async fn set_oidc_link(&self, id: UserId, link: &OidcLink) -> Result<(), Report<DirectoryError>>;

    /// Reads the linked issuer/subject of an account.
    async fn oidc_link(&self, id: UserId) -> Result<Option<OidcLink>, Report<DirectoryError>>;

    async fn delete(&self, id: UserId) -> Result<(), Report<DirectoryError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_has_generated_id_and_no_link() {
        let user = LocalUser::new("alice".to_string(), Some("alice@example.com".to_string()));
        assert!(user.id().to_string().starts_with("usr_"));
        assert_eq!(user.username(), "alice");
        assert_eq!(user.email(), Some("alice@example.com"));
        assert!(user.oidc().is_none());
    }

    #[test]
    fn link_fingerprint_matches_claims_fingerprint() {
        let link = OidcLink::new("https://idp.example", "abc123");
        assert_eq!(
            link.fingerprint(),
            Fingerprint::compute("https://idp.example", "abc123")
        );
    }

    #[test]
    fn with_all_fields_preserves_values() {
        let id = UserId::new();
        let created = Utc::now() - chrono::Duration::days(3);
        let user = LocalUser::with_all_fields(
            id,
            "bob".to_string(),
            None,
            Some(OidcLink::new("iss", "sub")),
            created,
        );

        assert_eq!(user.id(), id);
        assert_eq!(user.oidc(), Some(&OidcLink::new("iss", "sub")));
        assert_eq!(user.created_at(), created);
    }

    #[test]
    fn user_serialization_roundtrip() {
        let mut user = LocalUser::new("carol".to_string(), None);
        user.set_oidc(Some(OidcLink::new("iss", "sub")));

        let json = serde_json::to_string(&user).expect("serialize");
        let parsed: LocalUser = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(user, parsed);
    }
}
