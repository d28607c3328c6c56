//! PostgreSQL backends for the key-value store, user directory and sessions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use forum_oidc_core::{SessionId, UserId};
use forum_oidc_identity::{
    DirectoryError, KeyValueStore, LocalUser, NewUser, OidcLink, StoreError, UserDirectory,
};
use rootcause::Report;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::str::FromStr;

use crate::session::{Session, SessionStore};

fn store_backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend {
        reason: e.to_string(),
    }
}

fn directory_backend(e: sqlx::Error) -> DirectoryError {
    DirectoryError::Backend {
        reason: e.to_string(),
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

/// Object-field store over the `objects` table.
#[derive(Clone)]
pub struct PgKeyValueStore {
    pool: PgPool,
}

impl PgKeyValueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyValueStore for PgKeyValueStore {
    async fn get_field(
        &self,
        key: &str,
        field: &str,
    ) -> Result<Option<String>, Report<StoreError>> {
        let value: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT value FROM objects
            WHERE key = $1 AND field = $2
            "#,
        )
        .bind(key)
        .bind(field)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_backend)?;

        Ok(value.map(|(v,)| v))
    }

    async fn set_field(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<(), Report<StoreError>> {
        sqlx::query(
            r#"
            INSERT INTO objects (key, field, value)
            VALUES ($1, $2, $3)
            ON CONFLICT (key, field) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(key)
        .bind(field)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(store_backend)?;

        Ok(())
    }

    async fn set_field_if_absent(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<String>, Report<StoreError>> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO objects (key, field, value)
            VALUES ($1, $2, $3)
            ON CONFLICT (key, field) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(field)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(store_backend)?
        .rows_affected();

        if inserted == 1 {
            return Ok(None);
        }

        let existing = self.get_field(key, field).await?;
        // A concurrent delete between the two statements leaves nothing to report.
        Ok(existing)
    }

    async fn delete_field(&self, key: &str, field: &str) -> Result<(), Report<StoreError>> {
        sqlx::query(
            r#"
            DELETE FROM objects
            WHERE key = $1 AND field = $2
            "#,
        )
        .bind(key)
        .bind(field)
        .execute(&self.pool)
        .await
        .map_err(store_backend)?;

        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<HashMap<String, String>, Report<StoreError>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT field, value FROM objects
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await
        .map_err(store_backend)?;

        Ok(rows.into_iter().collect())
    }
}

/// Row type for user queries.
#[derive(FromRow)]
struct UserRow {
    id: String,
    username: String,
    email: Option<String>,
    oidc_issuer: Option<String>,
    oidc_subject: Option<String>,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn try_into_user(self) -> Result<LocalUser, DirectoryError> {
        let id = parse_user_id(&self.id)?;
        let oidc = match (self.oidc_issuer, self.oidc_subject) {
            (Some(issuer), Some(subject)) => Some(OidcLink::new(issuer, subject)),
            _ => None,
        };
        Ok(LocalUser::with_all_fields(
            id,
            self.username,
            self.email,
            oidc,
            self.created_at,
        ))
    }
}

fn parse_user_id(raw: &str) -> Result<UserId, DirectoryError> {
    UserId::from_str(raw).map_err(|e| DirectoryError::Backend {
        reason: format!("invalid user id '{raw}': {e}"),
    })
}

/// User directory over the `users` table.
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn create(&self, user: NewUser) -> Result<UserId, Report<DirectoryError>> {
        let record = LocalUser::new(user.username, user.email);

        let result = sqlx::query(
            r#"
            INSERT INTO users (id, username, email, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(record.id().to_string())
        .bind(record.username())
        .bind(record.email())
        .bind(record.created_at())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(record.id()),
            Err(e) if is_unique_violation(&e) => Err(DirectoryError::UsernameTaken {
                username: record.username().to_string(),
            }
            .into()),
            Err(e) => Err(directory_backend(e).into()),
        }
    }

    async fn get(&self, id: UserId) -> Result<Option<LocalUser>, Report<DirectoryError>> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, username, email, oidc_issuer, oidc_subject, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(directory_backend)?;

        match row {
            Some(r) => Ok(Some(r.try_into_user()?)),
            None => Ok(None),
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserId>, Report<DirectoryError>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT id FROM users
            WHERE lower(email) = lower($1)
            ORDER BY created_at, id
            LIMIT 1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(directory_backend)?;

        match row {
            Some((id,)) => Ok(Some(parse_user_id(&id)?)),
            None => Ok(None),
        }
    }

    async fn set_oidc_link(
        &self,
        id: UserId,
        link: &OidcLink,
    ) -> Result<(), Report<DirectoryError>> {
        let updated = sqlx::query(
            r#"
            UPDATE users
            SET oidc_issuer = $2, oidc_subject = $3
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .bind(&link.issuer)
        .bind(&link.subject)
        .execute(&self.pool)
        .await
        .map_err(directory_backend)?
        .rows_affected();

        if updated == 0 {
            return Err(DirectoryError::NotFound { user_id: id }.into());
        }
        Ok(())
    }

    async fn oidc_link(&self, id: UserId) -> Result<Option<OidcLink>, Report<DirectoryError>> {
        let user = self
            .get(id)
            .await?
            .ok_or(DirectoryError::NotFound { user_id: id })?;
        Ok(user.oidc().cloned())
    }

    async fn delete(&self, id: UserId) -> Result<(), Report<DirectoryError>> {
        sqlx::query(
            r#"
            DELETE FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(directory_backend)?;

        Ok(())
    }
}

/// Row type for session queries.
#[derive(FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl SessionRow {
    fn try_into_session(self) -> Result<Session, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            key: "sessions".to_string(),
            field: self.id.clone(),
            reason,
        };
        let id = SessionId::from_str(&self.id).map_err(|e| corrupt(e.to_string()))?;
        let user_id = UserId::from_str(&self.user_id).map_err(|e| corrupt(e.to_string()))?;
        Ok(Session::with_all_fields(
            id,
            user_id,
            self.created_at,
            self.expires_at,
        ))
    }
}

/// Repository for session operations.
#[derive(Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SessionRepository {
    async fn create(&self, session: &Session) -> Result<(), Report<StoreError>> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(session.id().to_string())
        .bind(session.user_id().to_string())
        .bind(session.created_at())
        .bind(session.expires_at())
        .execute(&self.pool)
        .await
        .map_err(store_backend)?;

        Ok(())
    }

    async fn find(&self, id: SessionId) -> Result<Option<Session>, Report<StoreError>> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, created_at, expires_at
            FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_backend)?;

        match row {
            Some(r) => Ok(Some(r.try_into_session()?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: SessionId) -> Result<(), Report<StoreError>> {
        sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(store_backend)?;

        Ok(())
    }

    async fn delete_all_for_user(&self, user_id: UserId) -> Result<(), Report<StoreError>> {
        sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(store_backend)?;

        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64, Report<StoreError>> {
        let result = sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(store_backend)?;

        Ok(result.rows_affected())
    }
}
