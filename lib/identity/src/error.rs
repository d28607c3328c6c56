//! Error types for the identity crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `StoreError`: Failures from the host key-value store
//! - `DirectoryError`: Failures from the host user directory
//! - `ConfigError`: Missing or unusable plugin settings
//! - `ResolutionError`: A login attempt could not be mapped to a local user
//! - `CleanupError`: Mapping cleanup after account deletion failed

use forum_oidc_core::UserId;
use std::fmt;

/// Errors from key-value store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend rejected or failed the operation.
    Backend { reason: String },
    /// A stored value could not be interpreted.
    Corrupt {
        key: String,
        field: String,
        reason: String,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend { reason } => write!(f, "store backend error: {reason}"),
            Self::Corrupt { key, field, reason } => {
                write!(f, "corrupt value at {key}/{field}: {reason}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from user directory operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// Another account already uses this username.
    UsernameTaken { username: String },
    /// The referenced user does not exist.
    NotFound { user_id: UserId },
    /// The backend rejected or failed the operation.
    Backend { reason: String },
}

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UsernameTaken { username } => write!(f, "username '{username}' is taken"),
            Self::NotFound { user_id } => write!(f, "user {user_id} not found"),
            Self::Backend { reason } => write!(f, "user directory error: {reason}"),
        }
    }
}

impl std::error::Error for DirectoryError {}

/// Errors from loading plugin settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Required client registration fields are absent. OIDC login stays disabled.
    Missing { fields: Vec<&'static str> },
    /// The settings namespace could not be read or decoded.
    Unreadable { reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { fields } => {
                write!(f, "OIDC configuration missing: {}", fields.join(", "))
            }
            Self::Unreadable { reason } => write!(f, "OIDC settings unreadable: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors from resolving verified claims to a local user.
///
/// The login flow must reject the attempt on any of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// Reading the identity mapping failed.
    MappingLookup,
    /// Looking up an account by email failed.
    EmailLookup,
    /// Creating the local account failed.
    CreateUser,
    /// Writing the issuer/subject link onto the account failed.
    LinkUser { user_id: UserId },
    /// Writing the identity mapping failed.
    MappingWrite,
    /// The fingerprint was linked to a different account concurrently.
    MappingConflict {
        fingerprint: String,
        existing: UserId,
    },
    /// Neither `preferred_username` nor `email` was present.
    MissingUsername,
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MappingLookup => write!(f, "failed to read identity mapping"),
            Self::EmailLookup => write!(f, "failed to look up account by email"),
            Self::CreateUser => write!(f, "failed to create local account"),
            Self::LinkUser { user_id } => {
                write!(f, "failed to link identity onto account {user_id}")
            }
            Self::MappingWrite => write!(f, "failed to write identity mapping"),
            Self::MappingConflict {
                fingerprint,
                existing,
            } => {
                write!(
                    f,
                    "identity {fingerprint} is already linked to account {existing}"
                )
            }
            Self::MissingUsername => {
                write!(f, "claims carry neither preferred_username nor email")
            }
        }
    }
}

impl std::error::Error for ResolutionError {}

/// Errors from removing a deleted account's identity mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupError {
    /// Reading the account's link fields failed.
    ReadLink { user_id: UserId },
    /// Reading or removing the mapping entry failed.
    Mapping { user_id: UserId },
}

impl fmt::Display for CleanupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadLink { user_id } => {
                write!(f, "failed to read OIDC link of account {user_id}")
            }
            Self::Mapping { user_id } => {
                write!(f, "failed to remove identity mapping of account {user_id}")
            }
        }
    }
}

impl std::error::Error for CleanupError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_missing_lists_fields() {
        let err = ConfigError::Missing {
            fields: vec!["clientId", "clientSecret"],
        };
        assert_eq!(
            err.to_string(),
            "OIDC configuration missing: clientId, clientSecret"
        );
    }

    #[test]
    fn mapping_conflict_names_existing_account() {
        let existing = UserId::new();
        let err = ResolutionError::MappingConflict {
            fingerprint: "abc".to_string(),
            existing,
        };
        assert!(err.to_string().contains("abc"));
        assert!(err.to_string().contains(&existing.to_string()));
    }

    #[test]
    fn directory_username_taken_display() {
        let err = DirectoryError::UsernameTaken {
            username: "alice".to_string(),
        };
        assert!(err.to_string().contains("alice"));
        assert!(err.to_string().contains("taken"));
    }

    #[test]
    fn store_corrupt_display() {
        let err = StoreError::Corrupt {
            key: "oidc:uid".to_string(),
            field: "f00".to_string(),
            reason: "bad id".to_string(),
        };
        assert_eq!(err.to_string(), "corrupt value at oidc:uid/f00: bad id");
    }
}
