//! Authentication extractor for Axum.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use forum_oidc_core::SessionId;
use forum_oidc_identity::LocalUser;
use std::sync::Arc;
use tracing::warn;

use super::AppState;
use super::routes::SESSION_COOKIE;
use crate::session::Session;

/// Extractor for requiring an authenticated user.
pub struct RequireAuth {
    pub session: Session,
    pub user: LocalUser,
}

impl<S> FromRequestParts<S> for RequireAuth
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);
        let jar = CookieJar::from_request_parts(parts, state)
            .await
            .map_err(|_| AuthRejection::InternalError)?;

        let session_id: SessionId = jar
            .get(SESSION_COOKIE)
            .and_then(|cookie| cookie.value().parse().ok())
            .ok_or(AuthRejection::NotAuthenticated)?;

        let session = app_state
            .sessions
            .find(session_id)
            .await
            .map_err(|e| {
                warn!(error = %e, "session lookup failed");
                AuthRejection::InternalError
            })?
            .ok_or(AuthRejection::NotAuthenticated)?;

        if session.is_expired() {
            let _ = app_state.sessions.delete(session_id).await;
            return Err(AuthRejection::SessionExpired);
        }

        let user = app_state
            .users
            .get(session.user_id())
            .await
            .map_err(|e| {
                warn!(error = %e, "user lookup failed");
                AuthRejection::InternalError
            })?
            .ok_or(AuthRejection::NotAuthenticated)?;

        Ok(RequireAuth { session, user })
    }
}

/// Rejection type for the authentication extractor.
#[derive(Debug)]
pub enum AuthRejection {
    NotAuthenticated,
    SessionExpired,
    InternalError,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::NotAuthenticated => (StatusCode::UNAUTHORIZED, "Not authenticated").into_response(),
            Self::SessionExpired => (StatusCode::UNAUTHORIZED, "Session expired").into_response(),
            Self::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}
