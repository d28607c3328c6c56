//! Identity resolution: verified claims to exactly one local account.
//!
//! Resolution order for a login attempt:
//! 1. **Linked identity** - the claims' fingerprint already maps to an account
//! 2. **Email match** - when enabled, an account with the same email is linked
//! 3. **New account** - an account is created and linked
//!
//! Once an identity has been linked by (2) or (3), every later login takes
//! path (1), which costs a single mapping read.

use crate::claims::VerifiedClaims;
use crate::error::{CleanupError, ResolutionError};
use crate::fingerprint::Fingerprint;
use crate::mapping::{IdentityMappingStore, LinkOutcome};
use crate::settings::ResolverConfig;
use crate::store::KeyValueStore;
use crate::user::{NewUser, OidcLink, UserDirectory};
use forum_oidc_core::UserId;
use rootcause::Report;
use rootcause::prelude::ResultExt;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// How a login attempt was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// The identity was already linked.
    Existing,
    /// An account with the same email was found and linked.
    LinkedByEmail,
    /// A new account was created.
    Created,
}

impl ResolutionOutcome {
    #[must_use]
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created)
    }

    #[must_use]
    pub fn is_linked(&self) -> bool {
        matches!(self, Self::LinkedByEmail)
    }
}

impl fmt::Display for ResolutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Existing => write!(f, "existing"),
            Self::LinkedByEmail => write!(f, "linked_by_email"),
            Self::Created => write!(f, "created"),
        }
    }
}

/// The account a login attempt resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub user_id: UserId,
    pub outcome: ResolutionOutcome,
}

/// Maps verified claims to local accounts, linking or creating as needed.
///
/// Holds no per-request state; one instance serves every login.
#[derive(Clone)]
pub struct IdentityResolver {
    mapping: IdentityMappingStore,
    users: Arc<dyn UserDirectory>,
}

impl IdentityResolver {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>, users: Arc<dyn UserDirectory>) -> Self {
        Self {
            mapping: IdentityMappingStore::new(kv),
            users,
        }
    }

    #[must_use]
    pub fn mapping(&self) -> &IdentityMappingStore {
        &self.mapping
    }

    /// Resolves claims to a local account.
    ///
    /// # Errors
    ///
    /// Any store failure, a missing username source, or a concurrent link of
    /// the same identity to another account. The caller must not log the
    /// user in.
    #[instrument(
        skip_all,
        fields(issuer = %claims.issuer, fingerprint = %claims.fingerprint())
    )]
    pub async fn resolve(
        &self,
        claims: &VerifiedClaims,
        config: &ResolverConfig,
    ) -> Result<Resolution, Report<ResolutionError>> {
        let fingerprint = claims.fingerprint();

        if let Some(user_id) = self
            .mapping
            .get(&fingerprint)
            .await
            .context(ResolutionError::MappingLookup)?
        {
            debug!(%user_id, "identity already linked");
            return Ok(Resolution {
                user_id,
                outcome: ResolutionOutcome::Existing,
            });
        }

        let email = claims.normalized_email();
        let link = OidcLink::new(claims.issuer.clone(), claims.subject.clone());

        if config.match_user_by_email {
            if let Some(email) = email.as_deref() {
                debug!("no linked account, trying email match");
                let found = self
                    .users
                    .find_by_email(email)
                    .await
                    .context(ResolutionError::EmailLookup)?;

                if let Some(user_id) = found {
                    info!(%user_id, "linking identity to account with matching email");
                    self.attach(user_id, &link, &fingerprint).await?;
                    return Ok(Resolution {
                        user_id,
                        outcome: ResolutionOutcome::LinkedByEmail,
                    });
                }
            }
        }

        let username = claims
            .username()
            .ok_or(ResolutionError::MissingUsername)?
            .to_string();

        let user_id = self
            .users
            .create(NewUser { username, email })
            .await
            .context(ResolutionError::CreateUser)?;
        info!(%user_id, "created account for new identity");

        self.attach(user_id, &link, &fingerprint).await?;
        Ok(Resolution {
            user_id,
            outcome: ResolutionOutcome::Created,
        })
    }

    /// Writes the link fields onto the account, then the mapping entry.
    async fn attach(
        &self,
        user_id: UserId,
        link: &OidcLink,
        fingerprint: &Fingerprint,
    ) -> Result<(), Report<ResolutionError>> {
        self.users
            .set_oidc_link(user_id, link)
            .await
            .context(ResolutionError::LinkUser { user_id })?;

        let outcome = self
            .mapping
            .link(fingerprint, user_id)
            .await
            .context(ResolutionError::MappingWrite)?;

        match outcome {
            LinkOutcome::Inserted => Ok(()),
            LinkOutcome::AlreadyLinked(existing) if existing == user_id => Ok(()),
            LinkOutcome::AlreadyLinked(existing) => {
                warn!(%fingerprint, %user_id, %existing, "identity linked concurrently");
                Err(ResolutionError::MappingConflict {
                    fingerprint: fingerprint.to_string(),
                    existing,
                }
                .into())
            }
        }
    }

    /// Removes every mapping entry of an account that is being deleted.
    ///
    /// Must run before the host drops the account. An account reached by
    /// several identities (first login, then email merges) owns one entry
    /// per identity, but only the last link is stored on the account, so
    /// entries are found by scanning the mapping for the account's id.
    /// Accounts that were never linked are left alone. Returns the removed
    /// fingerprints.
    #[instrument(skip(self))]
    pub async fn forget_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Fingerprint>, Report<CleanupError>> {
        if self
            .users
            .oidc_link(user_id)
            .await
            .context(CleanupError::ReadLink { user_id })?
            .is_none()
        {
            debug!("account has no OIDC link");
            return Ok(Vec::new());
        }

        let linked = self
            .mapping
            .linked_to(user_id)
            .await
            .context(CleanupError::Mapping { user_id })?;

        for fingerprint in &linked {
            self.mapping
                .remove(fingerprint)
                .await
                .context(CleanupError::Mapping { user_id })?;
            info!(%fingerprint, "removed identity mapping");
        }
        Ok(linked)
    }
}
