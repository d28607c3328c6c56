//! Authentication module for the forum server.
//!
//! This module provides:
//! - OIDC login against the provider configured in the plugin settings
//! - Identity resolution of verified logins to local accounts
//! - Session management and an extractor for authenticated routes
//!
//! OIDC login may be disabled at any time (incomplete settings, failed
//! discovery). Routes consult the [`StrategyHandle`] on every request.

pub mod middleware;
pub mod oidc;
pub mod routes;
pub mod strategy;

use crate::config::SessionConfig;
use crate::session::SessionStore;
use forum_oidc_identity::{IdentityResolver, UserDirectory};
use std::sync::Arc;

pub use middleware::RequireAuth;
pub use oidc::OidcClient;
pub use routes::{callback, delete_account, login, logout, me, strategies};
pub use strategy::{OidcStrategy, StrategyDescriptor, StrategyHandle};

/// Shared application state.
pub struct AppState {
    /// The OIDC login method, when enabled.
    pub strategy: StrategyHandle,
    /// Maps verified logins to local accounts.
    pub resolver: IdentityResolver,
    pub users: Arc<dyn UserDirectory>,
    pub sessions: Arc<dyn SessionStore>,
    pub session_config: SessionConfig,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(
        strategy: StrategyHandle,
        resolver: IdentityResolver,
        users: Arc<dyn UserDirectory>,
        sessions: Arc<dyn SessionStore>,
        session_config: SessionConfig,
    ) -> Self {
        Self {
            strategy,
            resolver,
            users,
            sessions,
            session_config,
        }
    }
}
