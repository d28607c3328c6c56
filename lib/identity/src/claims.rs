//! Verified claims handed over by the OIDC client.

use crate::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};

/// Claims from a verified ID token.
///
/// Only produced after the OIDC client has checked signature, audience,
/// nonce and timestamps. `(issuer, subject)` identifies the end-user at
/// the provider and is the durable key for account linking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedClaims {
    /// The `iss` claim.
    pub issuer: String,
    /// The `sub` claim.
    pub subject: String,
    /// The `email` claim, from the `email` scope.
    pub email: Option<String>,
    /// The `preferred_username` claim, from the `profile` scope.
    pub preferred_username: Option<String>,
}

impl VerifiedClaims {
    #[must_use]
    pub fn new(issuer: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            subject: subject.into(),
            email: None,
            preferred_username: None,
        }
    }

    /// Sets the email claim.
    #[must_use]
    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email;
        self
    }

    /// Sets the preferred username claim.
    #[must_use]
    pub fn with_preferred_username(mut self, username: Option<String>) -> Self {
        self.preferred_username = username;
        self
    }

    /// Mapping key for this issuer/subject pair.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::compute(&self.issuer, &self.subject)
    }

    /// The email claim, lowercased.
    #[must_use]
    pub fn normalized_email(&self) -> Option<String> {
        self.email.as_deref().map(normalize_email)
    }

    /// Username for a new account: `preferred_username`, else the email claim as sent.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.preferred_username
            .as_deref()
            .filter(|name| !name.is_empty())
            .or_else(|| self.email.as_deref().filter(|email| !email.is_empty()))
    }
}

/// Case-folds an email address for lookups and storage.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_optional_claims() {
        let claims = VerifiedClaims::new("https://idp.example", "abc123")
            .with_email(Some("alice@example.com".to_string()))
            .with_preferred_username(Some("alice".to_string()));

        assert_eq!(claims.issuer, "https://idp.example");
        assert_eq!(claims.subject, "abc123");
        assert_eq!(claims.email.as_deref(), Some("alice@example.com"));
        assert_eq!(claims.preferred_username.as_deref(), Some("alice"));
    }

    #[test]
    fn username_prefers_preferred_username() {
        let claims = VerifiedClaims::new("iss", "sub")
            .with_email(Some("a@b.com".to_string()))
            .with_preferred_username(Some("alice".to_string()));
        assert_eq!(claims.username(), Some("alice"));
    }

    #[test]
    fn username_falls_back_to_email() {
        let claims = VerifiedClaims::new("iss", "sub").with_email(Some("a@b.com".to_string()));
        assert_eq!(claims.username(), Some("a@b.com"));
    }

    #[test]
    fn empty_preferred_username_is_skipped() {
        let claims = VerifiedClaims::new("iss", "sub")
            .with_email(Some("a@b.com".to_string()))
            .with_preferred_username(Some(String::new()));
        assert_eq!(claims.username(), Some("a@b.com"));
    }

    #[test]
    fn username_absent_without_either_claim() {
        assert_eq!(VerifiedClaims::new("iss", "sub").username(), None);
    }

    #[test]
    fn email_is_lowercased() {
        assert_eq!(normalize_email("User@Example.COM"), "user@example.com");
        let claims = VerifiedClaims::new("iss", "sub").with_email(Some("Bob@X.org".to_string()));
        assert_eq!(claims.normalized_email().as_deref(), Some("bob@x.org"));
    }

    #[test]
    fn claims_deserialize_without_optionals() {
        let json = r#"{"issuer": "https://idp.example", "subject": "s1", "email": null, "preferred_username": null}"#;
        let claims: VerifiedClaims = serde_json::from_str(json).expect("deserialize");
        assert_eq!(claims, VerifiedClaims::new("https://idp.example", "s1"));
    }
}
