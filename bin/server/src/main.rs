use forum_oidc_identity::{
    IdentityResolver, KeyValueStore, KvSettingsStore, MemoryKeyValueStore, MemoryUserDirectory,
    UserDirectory,
};
use forum_oidc_server::{
    auth::{AppState, StrategyHandle},
    config::ServerConfig,
    db::{PgKeyValueStore, PgUserDirectory, SessionRepository},
    router,
    session::{MemorySessionStore, SessionStore},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

struct Backends {
    kv: Arc<dyn KeyValueStore>,
    users: Arc<dyn UserDirectory>,
    sessions: Arc<dyn SessionStore>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    tracing::info!("Loaded configuration");

    let backends = match &config.database_url {
        Some(database_url) => {
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await
                .expect("failed to connect to database");

            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&db_pool)
                .await
                .expect("failed to run migrations");

            Backends {
                kv: Arc::new(PgKeyValueStore::new(db_pool.clone())),
                users: Arc::new(PgUserDirectory::new(db_pool.clone())),
                sessions: Arc::new(SessionRepository::new(db_pool)),
            }
        }
        None => {
            tracing::warn!("DATABASE_URL not set, keeping all state in memory");
            Backends {
                kv: Arc::new(MemoryKeyValueStore::new()),
                users: Arc::new(MemoryUserDirectory::new()),
                sessions: Arc::new(MemorySessionStore::new()),
            }
        }
    };

    // Cleanup expired sessions on startup
    match backends.sessions.delete_expired().await {
        Ok(count) if count > 0 => {
            tracing::info!(
                deleted_sessions = count,
                "Cleaned up expired sessions on startup"
            );
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(error = %e, "Failed to cleanup expired sessions on startup");
        }
    }

    // Spawn periodic session cleanup task
    let cleanup_sessions = backends.sessions.clone();
    let cleanup_interval_secs = config.session.cleanup_interval_seconds;
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(cleanup_interval_secs));
        loop {
            interval.tick().await;
            match cleanup_sessions.delete_expired().await {
                Ok(count) if count > 0 => {
                    tracing::debug!(deleted_sessions = count, "Periodic session cleanup");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to cleanup expired sessions");
                }
            }
        }
    });

    // Set up the OIDC strategy; login stays disabled until settings are complete
    let strategy = StrategyHandle::new(
        Arc::new(KvSettingsStore::new(backends.kv.clone())),
        config.redirect_uri(),
    );
    tracing::info!("Discovering OIDC provider...");
    strategy.reload().await;

    let resolver = IdentityResolver::new(backends.kv, backends.users.clone());
    let app_state = Arc::new(AppState::new(
        strategy,
        resolver,
        backends.users,
        backends.sessions,
        config.session.clone(),
    ));

    spawn_reload_on_hangup(app_state.clone());

    let app = router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.bind_addr);

    axum::serve(listener, app.into_make_service())
        .await
        .expect("server error");
}

/// Reloads the OIDC settings whenever the process receives SIGHUP.
#[cfg(unix)]
fn spawn_reload_on_hangup(state: Arc<AppState>) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            tracing::warn!(error = %e, "SIGHUP handler unavailable, settings reload disabled");
            return;
        }
    };

    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            tracing::info!("SIGHUP received, reloading OIDC settings");
            state.strategy.reload().await;
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_on_hangup(_state: Arc<AppState>) {}
