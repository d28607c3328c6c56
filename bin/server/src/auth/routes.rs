//! Authentication routes for login, callback, and logout.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Duration as ChronoDuration;
use forum_oidc_core::SessionId;
use forum_oidc_identity::{ResolverConfig, VerifiedClaims};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::Duration as TimeDuration;
use tracing::{error, info, warn};

use super::{AppState, RequireAuth, StrategyDescriptor, oidc::AuthState};
use crate::account::delete_user;
use crate::session::Session;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "session";

/// Auth state cookie name (for CSRF protection during OIDC flow).
const AUTH_STATE_COOKIE: &str = "oidc_auth_state";

/// Query parameters for the OIDC callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Initiates the OIDC login flow by redirecting to the identity provider.
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AuthError> {
    let strategy = state.strategy.current().await.ok_or(AuthError::Disabled)?;
    let (auth_url, auth_state) = strategy.client().authorization_url();

    // Keep the auth state in a cookie for validation on callback
    let auth_state_json =
        serde_json::to_string(&auth_state).map_err(|e| AuthError::Internal(e.to_string()))?;

    let cookie = Cookie::build((AUTH_STATE_COOKIE, auth_state_json))
        .path("/")
        .http_only(true)
        .secure(state.session_config.secure_cookies)
        .same_site(SameSite::Lax)
        .max_age(TimeDuration::minutes(10));

    Ok((jar.add(cookie), Redirect::to(&auth_url)))
}

/// Handles the OIDC callback after the user authenticates with the identity provider.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AuthError> {
    let strategy = state.strategy.current().await.ok_or(AuthError::Disabled)?;

    if let Some(reason) = query.error {
        return Err(AuthError::Provider(reason));
    }
    let (code, returned_state) = query
        .code
        .zip(query.state)
        .ok_or(AuthError::MissingCode)?;

    let auth_state_cookie = jar
        .get(AUTH_STATE_COOKIE)
        .ok_or(AuthError::MissingAuthState)?;
    let auth_state: AuthState =
        serde_json::from_str(auth_state_cookie.value()).map_err(|_| AuthError::InvalidAuthState)?;

    if returned_state != auth_state.csrf_token {
        return Err(AuthError::CsrfMismatch);
    }

    let claims = strategy
        .client()
        .exchange_code(&code, &auth_state)
        .await
        .map_err(|e| AuthError::TokenExchange(e.to_string()))?;

    let session = establish_session(&state, &claims, &strategy.resolver_config()).await?;

    let session_duration = state.session_config.duration_minutes;
    let session_cookie = Cookie::build((SESSION_COOKIE, session.id().to_string()))
        .path("/")
        .http_only(true)
        .secure(state.session_config.secure_cookies)
        .same_site(SameSite::Lax)
        .max_age(TimeDuration::minutes(session_duration));

    let remove_auth_state = Cookie::build((AUTH_STATE_COOKIE, ""))
        .path("/")
        .max_age(TimeDuration::ZERO);

    let jar = jar.add(session_cookie).add(remove_auth_state);

    Ok((jar, Redirect::to("/")))
}

/// Resolves verified claims to a local account and opens a session for it.
///
/// No session is created when resolution fails.
pub async fn establish_session(
    state: &AppState,
    claims: &VerifiedClaims,
    config: &ResolverConfig,
) -> Result<Session, AuthError> {
    let resolution = state
        .resolver
        .resolve(claims, config)
        .await
        .map_err(|e| AuthError::Resolution(e.to_string()))?;
    info!(
        user_id = %resolution.user_id,
        outcome = %resolution.outcome,
        "OIDC login resolved"
    );

    let session = Session::new(
        resolution.user_id,
        ChronoDuration::minutes(state.session_config.duration_minutes),
    );
    state
        .sessions
        .create(&session)
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?;
    Ok(session)
}

/// Logs out the user by deleting their session.
pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    let session_id = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| cookie.value().parse::<SessionId>().ok());

    if let Some(session_id) = session_id {
        if let Err(e) = state.sessions.delete(session_id).await {
            warn!(error = %e, "failed to delete session on logout");
        }
    }

    (jar.add(removal_cookie(SESSION_COOKIE)), Redirect::to("/"))
}

/// Login methods the host should list.
pub async fn strategies(State(state): State<Arc<AppState>>) -> Json<Vec<StrategyDescriptor>> {
    Json(state.strategy.descriptors().await)
}

/// The signed-in account.
#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
}

pub async fn me(RequireAuth { user, .. }: RequireAuth) -> Json<MeResponse> {
    Json(MeResponse {
        id: user.id().to_string(),
        username: user.username().to_string(),
        email: user.email().map(str::to_string),
    })
}

/// Deletes the signed-in account.
pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    RequireAuth { user, .. }: RequireAuth,
    jar: CookieJar,
) -> Result<impl IntoResponse, AuthError> {
    delete_user(
        &state.resolver,
        state.users.as_ref(),
        state.sessions.as_ref(),
        user.id(),
    )
    .await
    .map_err(|e| AuthError::Internal(e.to_string()))?;

    Ok((
        jar.add(removal_cookie(SESSION_COOKIE)),
        StatusCode::NO_CONTENT,
    ))
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .max_age(TimeDuration::ZERO)
        .build()
}

/// Authentication errors.
#[derive(Debug)]
pub enum AuthError {
    Disabled,
    Provider(String),
    MissingCode,
    MissingAuthState,
    InvalidAuthState,
    CsrfMismatch,
    TokenExchange(String),
    Resolution(String),
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Disabled => (
                StatusCode::SERVICE_UNAVAILABLE,
                "OpenID Connect login is not configured",
            ),
            Self::Provider(reason) => {
                warn!(%reason, "Provider returned an error");
                (StatusCode::UNAUTHORIZED, "Authentication failed")
            }
            Self::MissingCode => (StatusCode::BAD_REQUEST, "Missing authorization code"),
            Self::MissingAuthState => (StatusCode::BAD_REQUEST, "Missing auth state"),
            Self::InvalidAuthState => (StatusCode::BAD_REQUEST, "Invalid auth state"),
            Self::CsrfMismatch => (StatusCode::BAD_REQUEST, "CSRF token mismatch"),
            Self::TokenExchange(msg) => {
                error!("Token exchange failed: {}", msg);
                (StatusCode::UNAUTHORIZED, "Authentication failed")
            }
            Self::Resolution(msg) => {
                error!("Identity resolution failed: {}", msg);
                (StatusCode::UNAUTHORIZED, "Authentication failed")
            }
            Self::Internal(msg) => {
                error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        (status, message).into_response()
    }
}
