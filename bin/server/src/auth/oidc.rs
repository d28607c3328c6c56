//! OIDC client implementation using the openidconnect crate.

use forum_oidc_identity::{OidcSettings, VerifiedClaims};
use openidconnect::core::{CoreAuthenticationFlow, CoreClient, CoreProviderMetadata};
use openidconnect::{
    AuthorizationCode, ClientId, ClientSecret, CsrfToken, IssuerUrl, Nonce, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, Scope, TokenResponse,
};
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Clock skew accepted when checking ID token timestamps.
pub const CLOCK_SKEW_TOLERANCE: Duration = Duration::from_secs(10);

/// Scopes requested in addition to `openid`.
pub const EXTRA_SCOPES: [&str; 2] = ["email", "profile"];

const WELL_KNOWN_SUFFIX: &str = "/.well-known/openid-configuration";

/// OIDC client for authenticating users against the configured provider.
pub struct OidcClient {
    provider_metadata: CoreProviderMetadata,
    client_id: ClientId,
    client_secret: ClientSecret,
    redirect_url: RedirectUrl,
    http_client: reqwest::Client,
}

/// Data needed to complete the OIDC callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthState {
    pub csrf_token: String,
    pub pkce_verifier: String,
    pub nonce: String,
}

/// Issuer URLs to try for a configured discovery URL.
///
/// Providers are configured either with their issuer URL or with the full
/// address of their discovery document. For the latter the suffix is
/// removed; since the issuer may or may not end in a slash, both forms are
/// returned, without the slash first.
pub fn issuer_candidates(discover_url: &str) -> Vec<String> {
    let url = discover_url.trim();
    match url.strip_suffix(WELL_KNOWN_SUFFIX) {
        Some(base) => vec![base.to_string(), format!("{base}/")],
        None => vec![url.to_string()],
    }
}

impl OidcClient {
    /// Creates a new OIDC client by discovering the provider metadata.
    #[instrument(skip_all, fields(discover_url = settings.discover_url()))]
    pub async fn discover(
        settings: &OidcSettings,
        redirect_uri: &str,
    ) -> Result<Self, Report<OidcError>> {
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                OidcError::Configuration(format!("failed to create HTTP client: {e}"))
            })?;

        let redirect_url = RedirectUrl::new(redirect_uri.to_string())
            .map_err(|e| OidcError::Configuration(format!("invalid redirect URI: {e}")))?;

        let mut last_error = OidcError::Configuration("empty discovery URL".to_string());
        for candidate in issuer_candidates(settings.discover_url()) {
            let issuer_url = match IssuerUrl::new(candidate.clone()) {
                Ok(url) => url,
                Err(e) => {
                    last_error = OidcError::Configuration(format!("invalid issuer URL: {e}"));
                    continue;
                }
            };

            match CoreProviderMetadata::discover_async(issuer_url, &http_client).await {
                Ok(provider_metadata) => {
                    debug!(issuer = %candidate, "discovered provider");
                    return Ok(Self {
                        provider_metadata,
                        client_id: ClientId::new(settings.client_id().to_string()),
                        client_secret: ClientSecret::new(settings.client_secret().to_string()),
                        redirect_url,
                        http_client,
                    });
                }
                Err(e) => {
                    debug!(issuer = %candidate, error = %e, "discovery attempt failed");
                    last_error =
                        OidcError::Discovery(format!("failed to discover provider: {e}"));
                }
            }
        }

        Err(last_error.into())
    }

    /// Generates the authorization URL for redirecting the user.
    pub fn authorization_url(&self) -> (String, AuthState) {
        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut auth_request = client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                CsrfToken::new_random,
                Nonce::new_random,
            )
            .set_pkce_challenge(pkce_challenge);

        for scope in EXTRA_SCOPES {
            auth_request = auth_request.add_scope(Scope::new(scope.to_string()));
        }

        let (auth_url, csrf_token, nonce) = auth_request.url();

        let state = AuthState {
            csrf_token: csrf_token.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
            nonce: nonce.secret().clone(),
        };

        (auth_url.to_string(), state)
    }

    /// Exchanges the authorization code and verifies the returned ID token.
    ///
    /// The claims are only returned once signature, audience, nonce and
    /// timestamps (within [`CLOCK_SKEW_TOLERANCE`]) have been checked.
    pub async fn exchange_code(
        &self,
        code: &str,
        state: &AuthState,
    ) -> Result<VerifiedClaims, Report<OidcError>> {
        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());

        let pkce_verifier = PkceCodeVerifier::new(state.pkce_verifier.clone());

        let token_request = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|e| OidcError::TokenExchange(format!("token endpoint error: {e}")))?;

        let token_response = token_request
            .set_pkce_verifier(pkce_verifier)
            .request_async(&self.http_client)
            .await
            .map_err(|e| OidcError::TokenExchange(format!("token exchange failed: {e}")))?;

        let id_token = token_response
            .id_token()
            .ok_or_else(|| OidcError::TokenExchange("no ID token in response".to_string()))?;

        let verifier = client
            .id_token_verifier()
            .set_allowed_clock_skew(CLOCK_SKEW_TOLERANCE);
        let nonce = Nonce::new(state.nonce.clone());
        let claims = id_token.claims(&verifier, &nonce).map_err(|e| {
            OidcError::TokenValidation(format!("ID token validation failed: {e}"))
        })?;

        Ok(
            VerifiedClaims::new(claims.issuer().to_string(), claims.subject().to_string())
                .with_email(claims.email().map(|e| e.as_str().to_string()))
                .with_preferred_username(
                    claims.preferred_username().map(|u| u.as_str().to_string()),
                ),
        )
    }
}

/// OIDC-related errors.
#[derive(Debug)]
pub enum OidcError {
    /// Configuration error (invalid URLs, etc.)
    Configuration(String),
    /// Failed to discover provider metadata.
    Discovery(String),
    /// Token exchange failed.
    TokenExchange(String),
    /// Token validation failed.
    TokenValidation(String),
}

impl std::fmt::Display for OidcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "OIDC configuration error: {msg}"),
            Self::Discovery(msg) => write!(f, "OIDC discovery error: {msg}"),
            Self::TokenExchange(msg) => write!(f, "OIDC token exchange error: {msg}"),
            Self::TokenValidation(msg) => write!(f, "OIDC token validation error: {msg}"),
        }
    }
}

impl std::error::Error for OidcError {}
