//! Session repository
//!
//! Database operations for login sessions. The session id is the bearer
//! token handed to the client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::DynDatabasePool;
use crate::models::Session;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Create a new session
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Get session by ID (token)
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    /// Delete a session
    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete all sessions for a user
    async fn delete_by_user(&self, user_id: i64) -> Result<()>;

    /// Delete expired sessions, returning how many were removed
    async fn delete_expired(&self) -> Result<u64>;
}

/// SQLx-based session repository implementation
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    user_id: i64,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            id: row.id,
            user_id: row.user_id,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        on_backend!(
            self.pool,
            "INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)",
            |pool, sql| sqlx::query(sql)
                .bind(&session.id)
                .bind(session.user_id)
                .bind(session.expires_at)
                .bind(session.created_at)
                .execute(pool)
                .await
                .map(|_| ())
        )
        .context("Failed to create session")?;

        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        let row = on_backend!(
            self.pool,
            "SELECT id, user_id, expires_at, created_at FROM sessions WHERE id = ?",
            |pool, sql| sqlx::query_as::<_, SessionRow>(sql).bind(id).fetch_optional(pool).await
        )
        .context("Failed to get session")?;
        Ok(row.map(Session::from))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        on_backend!(self.pool, "DELETE FROM sessions WHERE id = ?", |pool, sql| {
            sqlx::query(sql).bind(id).execute(pool).await.map(|_| ())
        })
        .context("Failed to delete session")
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<()> {
        on_backend!(self.pool, "DELETE FROM sessions WHERE user_id = ?", |pool, sql| {
            sqlx::query(sql).bind(user_id).execute(pool).await.map(|_| ())
        })
        .context("Failed to delete user sessions")
    }

    async fn delete_expired(&self) -> Result<u64> {
        let now = Utc::now();
        on_backend!(self.pool, "DELETE FROM sessions WHERE expires_at < ?", |pool, sql| {
            sqlx::query(sql)
                .bind(now)
                .execute(pool)
                .await
                .map(|r| r.rows_affected())
        })
        .context("Failed to delete expired sessions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::migrated_pool;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::models::{User, UserRole};
    use chrono::Duration;

    async fn user_id(pool: &DynDatabasePool) -> i64 {
        let user = User::new(
            "ana".to_string(),
            "ana@example.com".to_string(),
            "hash".to_string(),
            UserRole::Admin,
        );
        SqlxUserRepository::new(pool.clone())
            .create(&user)
            .await
            .unwrap()
            .id
    }

    fn session(id: &str, user_id: i64, ttl: Duration) -> Session {
        let now = Utc::now();
        Session {
            id: id.to_string(),
            user_id,
            expires_at: now + ttl,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let pool = migrated_pool().await;
        let user_id = user_id(&pool).await;
        let repo = SqlxSessionRepository::new(pool);

        repo.create(&session("tok-1", user_id, Duration::days(7))).await.unwrap();
        let found = repo.get_by_id("tok-1").await.unwrap().unwrap();
        assert_eq!(found.user_id, user_id);
        assert!(!found.is_expired());

        repo.delete("tok-1").await.unwrap();
        assert!(repo.get_by_id("tok-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_expired_keeps_live_sessions() {
        let pool = migrated_pool().await;
        let user_id = user_id(&pool).await;
        let repo = SqlxSessionRepository::new(pool);

        repo.create(&session("old", user_id, Duration::hours(-1))).await.unwrap();
        repo.create(&session("live", user_id, Duration::hours(1))).await.unwrap();

        assert_eq!(repo.delete_expired().await.unwrap(), 1);
        assert!(repo.get_by_id("live").await.unwrap().is_some());

        repo.delete_by_user(user_id).await.unwrap();
        assert!(repo.get_by_id("live").await.unwrap().is_none());
    }
}
