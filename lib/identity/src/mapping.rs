//! Fingerprint to local user association.
//!
//! All entries live as fields of the single `oidc:uid` object in the
//! host key-value store: field = fingerprint, value = rendered `UserId`.

use crate::error::StoreError;
use crate::fingerprint::Fingerprint;
use crate::store::KeyValueStore;
use forum_oidc_core::UserId;
use rootcause::Report;
use std::sync::Arc;
use tracing::debug;

/// Object key holding every identity mapping entry.
pub const MAPPING_KEY: &str = "oidc:uid";

/// Outcome of a write-once link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The entry was created.
    Inserted,
    /// An entry already existed; it was left untouched.
    AlreadyLinked(UserId),
}

/// Durable fingerprint → user id store.
#[derive(Clone)]
pub struct IdentityMappingStore {
    kv: Arc<dyn KeyValueStore>,
}

impl IdentityMappingStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Looks up the user linked to a fingerprint.
    pub async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<UserId>, Report<StoreError>> {
        let raw = self.kv.get_field(MAPPING_KEY, fingerprint.as_str()).await?;
        raw.map(|value| parse_user_id(fingerprint, &value))
            .transpose()
    }

    /// Links a fingerprint to a user, replacing any existing entry.
    pub async fn set(&self, fingerprint: &Fingerprint, user_id: UserId) -> Result<(), Report<StoreError>> {
        self.kv
            .set_field(MAPPING_KEY, fingerprint.as_str(), &user_id.to_string())
            .await
    }

    /// Links a fingerprint to a user unless it is already linked.
    pub async fn link(
        &self,
        fingerprint: &Fingerprint,
        user_id: UserId,
    ) -> Result<LinkOutcome, Report<StoreError>> {
        let existing = self
            .kv
            .set_field_if_absent(MAPPING_KEY, fingerprint.as_str(), &user_id.to_string())
            .await?;

        match existing {
            None => {
                debug!(%fingerprint, %user_id, "identity mapping created");
                Ok(LinkOutcome::Inserted)
            }
            Some(value) => Ok(LinkOutcome::AlreadyLinked(parse_user_id(
                fingerprint,
                &value,
            )?)),
        }
    }

    /// Every fingerprint currently linked to a user.
    ///
    /// Scans the whole mapping object. Entries that do not parse are skipped.
    pub async fn linked_to(&self, user_id: UserId) -> Result<Vec<Fingerprint>, Report<StoreError>> {
        let entries = self.kv.get_object(MAPPING_KEY).await?;
        let mut linked: Vec<Fingerprint> = entries
            .into_iter()
            .filter(|(_, value)| value.parse::<UserId>().ok() == Some(user_id))
            .map(|(field, _)| Fingerprint::from_stored(field))
            .collect();
        linked.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(linked)
    }

    /// Removes a fingerprint's entry. Absent entries are ignored.
    pub async fn remove(&self, fingerprint: &Fingerprint) -> Result<(), Report<StoreError>> {
        self.kv.delete_field(MAPPING_KEY, fingerprint.as_str()).await
    }
}

fn parse_user_id(fingerprint: &Fingerprint, value: &str) -> Result<UserId, Report<StoreError>> {
    let user_id = value.parse::<UserId>().map_err(|e| StoreError::Corrupt {
        key: MAPPING_KEY.to_string(),
        field: fingerprint.to_string(),
        reason: e.to_string(),
    })?;
    Ok(user_id)
}
