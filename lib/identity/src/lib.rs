//! Identity resolution for OIDC logins to a forum.
//!
//! This crate provides:
//! - Verified claims and their issuer/subject fingerprint (`VerifiedClaims`, `Fingerprint`)
//! - The persistent fingerprint to user mapping (`IdentityMappingStore`)
//! - The resolver that links or creates accounts (`IdentityResolver`)
//! - Plugin settings and their validation (`PluginSettings`, `OidcSettings`)
//! - Contracts for the host's stores (`KeyValueStore`, `UserDirectory`, `SettingsStore`)
//!   with in-memory implementations
//!
//! # Identity Model
//!
//! An end-user is identified by the `(iss, sub)` pair of their ID token,
//! never by email or username. Each pair maps to at most one local
//! account, and once mapped it keeps resolving to that account until the
//! account is deleted.
//!
//! # Example
//!
//! ```
//! use forum_oidc_identity::{Fingerprint, VerifiedClaims};
//!
//! let claims = VerifiedClaims::new("https://idp.example", "abc123")
//!     .with_email(Some("Alice@Example.com".to_string()))
//!     .with_preferred_username(Some("alice".to_string()));
//!
//! assert_eq!(claims.username(), Some("alice"));
//! assert_eq!(claims.normalized_email().as_deref(), Some("alice@example.com"));
//! assert_eq!(
//!     claims.fingerprint(),
//!     Fingerprint::compute("https://idp.example", "abc123"),
//! );
//! ```

pub mod claims;
pub mod error;
pub mod fingerprint;
pub mod mapping;
pub mod memory;
pub mod resolver;
pub mod settings;
pub mod store;
pub mod user;

// Re-export main types at crate root
pub use claims::{VerifiedClaims, normalize_email};
pub use error::{CleanupError, ConfigError, DirectoryError, ResolutionError, StoreError};
pub use fingerprint::Fingerprint;
pub use mapping::{IdentityMappingStore, LinkOutcome, MAPPING_KEY};
pub use memory::{MemoryKeyValueStore, MemoryUserDirectory};
pub use resolver::{IdentityResolver, Resolution, ResolutionOutcome};
pub use settings::{
    KvSettingsStore, OidcSettings, PluginSettings, ResolverConfig, SETTINGS_NAMESPACE,
    SettingsStore,
};
pub use store::KeyValueStore;
pub use user::{LocalUser, NewUser, OidcLink, UserDirectory};
