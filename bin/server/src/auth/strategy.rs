//! The OIDC login strategy and its lifecycle.
//!
//! The strategy is built from the plugin settings at startup. When the
//! client registration is incomplete, or the provider cannot be
//! discovered, OIDC login is disabled rather than failing the server. The
//! [`StrategyHandle`] lets the settings be reloaded without a restart.

use forum_oidc_identity::{ResolverConfig, SETTINGS_NAMESPACE, SettingsStore};
use rootcause::Report;
use rootcause::prelude::ResultExt;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::oidc::OidcClient;
use crate::config::CALLBACK_PATH;

/// Path that starts the login flow.
pub const LOGIN_PATH: &str = "/auth/oidc/login";

/// How the host lists the login method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyDescriptor {
    pub name: &'static str,
    pub url: &'static str,
    #[serde(rename = "callbackURL")]
    pub callback_url: &'static str,
    pub icon: &'static str,
    pub scope: &'static str,
}

impl StrategyDescriptor {
    #[must_use]
    pub fn openid_connect() -> Self {
        Self {
            name: "openidconnect",
            url: LOGIN_PATH,
            callback_url: CALLBACK_PATH,
            icon: "fa-openid",
            scope: "openid email profile",
        }
    }
}

/// Errors from setting up the strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyError {
    /// The settings namespace could not be read.
    Settings,
    /// The provider could not be discovered.
    Discovery,
}

impl fmt::Display for StrategyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Settings => write!(f, "failed to load OIDC settings"),
            Self::Discovery => write!(f, "failed to discover OIDC provider"),
        }
    }
}

impl std::error::Error for StrategyError {}

/// A configured, discovered OIDC login method.
pub struct OidcStrategy {
    client: OidcClient,
    resolver_config: ResolverConfig,
}

impl OidcStrategy {
    /// Loads the settings and discovers the provider.
    ///
    /// Returns `Ok(None)` when the client registration is incomplete.
    ///
    /// # Errors
    ///
    /// Unreadable settings or a failed discovery.
    pub async fn initialize(
        settings: &dyn SettingsStore,
        redirect_uri: &str,
    ) -> Result<Option<Self>, Report<StrategyError>> {
        let raw = settings
            .load(SETTINGS_NAMESPACE)
            .await
            .context(StrategyError::Settings)?;

        let settings = match raw.validate() {
            Ok(settings) => settings,
            Err(report) => {
                warn!(reason = %report, "OpenID Connect configuration missing, disabling");
                return Ok(None);
            }
        };

        let client = OidcClient::discover(&settings, redirect_uri)
            .await
            .context(StrategyError::Discovery)?;

        Ok(Some(Self {
            client,
            resolver_config: settings.resolver_config(),
        }))
    }

    #[must_use]
    pub fn client(&self) -> &OidcClient {
        &self.client
    }

    /// Account-linking policy in effect for this strategy.
    #[must_use]
    pub fn resolver_config(&self) -> ResolverConfig {
        self.resolver_config
    }

    #[must_use]
    pub fn descriptor(&self) -> StrategyDescriptor {
        StrategyDescriptor::openid_connect()
    }
}

/// The currently active strategy, if any.
pub struct StrategyHandle {
    settings: Arc<dyn SettingsStore>,
    redirect_uri: String,
    current: RwLock<Option<Arc<OidcStrategy>>>,
}

impl StrategyHandle {
    /// Creates a handle with OIDC login disabled until [`reload`](Self::reload) runs.
    #[must_use]
    pub fn new(settings: Arc<dyn SettingsStore>, redirect_uri: String) -> Self {
        Self {
            settings,
            redirect_uri,
            current: RwLock::new(None),
        }
    }

    /// Rebuilds the strategy from the current settings.
    ///
    /// Failures disable OIDC login and are logged. Returns whether login is
    /// enabled afterwards.
    pub async fn reload(&self) -> bool {
        let strategy =
            match OidcStrategy::initialize(self.settings.as_ref(), &self.redirect_uri).await {
                Ok(Some(strategy)) => {
                    info!("OpenID Connect login enabled");
                    Some(Arc::new(strategy))
                }
                Ok(None) => None,
                Err(report) => {
                    error!(error = %report, "OpenID Connect setup failed, disabling");
                    None
                }
            };

        let enabled = strategy.is_some();
        *self.current.write().await = strategy;
        enabled
    }

    pub async fn current(&self) -> Option<Arc<OidcStrategy>> {
        self.current.read().await.clone()
    }

    /// Login methods to list; empty while OIDC login is disabled.
    pub async fn descriptors(&self) -> Vec<StrategyDescriptor> {
        self.current()
            .await
            .map(|s| s.descriptor())
            .into_iter()
            .collect()
    }
}
