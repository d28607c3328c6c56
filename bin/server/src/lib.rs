//! forum-oidc host server.
//!
//! Wires OIDC login into the forum: provider settings come from the
//! settings store, verified logins are resolved to local accounts by
//! `forum-oidc-identity`, and resolved logins get a session cookie.

pub mod account;
pub mod auth;
pub mod config;
pub mod db;
pub mod session;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use auth::AppState;

/// Builds the router with all authentication routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(auth::strategy::LOGIN_PATH, get(auth::login))
        .route(config::CALLBACK_PATH, get(auth::callback))
        .route("/auth/oidc/strategy", get(auth::strategies))
        .route("/auth/logout", get(auth::logout))
        .route("/auth/me", get(auth::me))
        .route("/auth/account/delete", post(auth::delete_account))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{StrategyHandle, routes::MeResponse};
    use crate::config::SessionConfig;
    use crate::session::{MemorySessionStore, Session, SessionStore};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use chrono::Duration;
    use forum_oidc_identity::{
        IdentityResolver, KvSettingsStore, MemoryKeyValueStore, MemoryUserDirectory,
        ResolverConfig, UserDirectory, VerifiedClaims,
    };
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        resolver: IdentityResolver,
        users: Arc<MemoryUserDirectory>,
        sessions: Arc<MemorySessionStore>,
    }

    /// App with OIDC login disabled (no settings stored).
    fn harness() -> Harness {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let users = Arc::new(MemoryUserDirectory::new());
        let sessions = Arc::new(MemorySessionStore::new());
        let resolver = IdentityResolver::new(kv.clone(), users.clone());
        let strategy = StrategyHandle::new(
            Arc::new(KvSettingsStore::new(kv)),
            "http://localhost:3000/auth/oidc/callback".to_string(),
        );
        let state = Arc::new(AppState::new(
            strategy,
            resolver.clone(),
            users.clone(),
            sessions.clone(),
            SessionConfig::default(),
        ));
        Harness {
            app: router(state),
            resolver,
            users,
            sessions,
        }
    }

    fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn signed_in(h: &Harness) -> (Session, VerifiedClaims) {
        let claims = VerifiedClaims::new("https://idp.example", "abc")
            .with_email(Some("Alice@Example.com".to_string()))
            .with_preferred_username(Some("alice".to_string()));
        let resolution = h
            .resolver
            .resolve(&claims, &ResolverConfig::default())
            .await
            .unwrap();
        let session = Session::new(resolution.user_id, Duration::minutes(5));
        h.sessions.create(&session).await.unwrap();
        (session, claims)
    }

    #[tokio::test]
    async fn strategy_list_is_empty_when_disabled() {
        let h = harness();
        let response = h
            .app
            .oneshot(get_request("/auth/oidc/strategy", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let list: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        assert!(list.is_empty());
    }

    #[tokio::test]
    async fn login_unavailable_when_disabled() {
        let h = harness();
        let response = h
            .app
            .oneshot(get_request("/auth/oidc/login", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn callback_unavailable_when_disabled() {
        let h = harness();
        let response = h
            .app
            .oneshot(get_request("/auth/oidc/callback?code=c&state=s", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn me_requires_session() {
        let h = harness();
        let response = h.app.oneshot(get_request("/auth/me", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn me_returns_resolved_account() {
        let h = harness();
        let (session, _) = signed_in(&h).await;
        let cookie = format!("session={}", session.id());

        let response = h
            .app
            .oneshot(get_request("/auth/me", Some(&cookie)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let me: MeResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(me.id, session.user_id().to_string());
        assert_eq!(me.username, "alice");
        assert_eq!(me.email.as_deref(), Some("alice@example.com"));
    }

    #[tokio::test]
    async fn logout_deletes_session() {
        let h = harness();
        let (session, _) = signed_in(&h).await;
        let cookie = format!("session={}", session.id());

        let response = h
            .app
            .oneshot(get_request("/auth/logout", Some(&cookie)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(h.sessions.find(session.id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn account_deletion_removes_mapping() {
        let h = harness();
        let (session, claims) = signed_in(&h).await;
        let cookie = format!("session={}", session.id());

        let request = Request::builder()
            .method("POST")
            .uri("/auth/account/delete")
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap();
        let response = h.app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(h.users.get(session.user_id()).await.unwrap().is_none());
        assert_eq!(
            h.resolver.mapping().get(&claims.fingerprint()).await.unwrap(),
            None
        );
    }
}
