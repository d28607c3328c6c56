//! Core domain types shared by the forum-oidc crates.
//!
//! Holds the strongly-typed identifiers for local users and login sessions.

pub mod id;

pub use id::{ParseIdError, SessionId, UserId};
